//! 共有 cron コンテナのジョブ定義

use crate::error::Result;
use crate::materialize::write_file;
use crate::wordpress::PHP_SERVICE;
use siteflow_core::SiteRecord;
use std::fmt::Write as _;
use std::path::PathBuf;

/// 全サイトのジョブをまとめた ini ファイル
#[derive(Debug, Clone)]
pub struct CronTable {
    pub path: PathBuf,
}

impl CronTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 有効なサイトのジョブで定義ファイルを書き直す
    pub async fn write(&self, records: &[SiteRecord]) -> Result<PathBuf> {
        write_file(&self.path, &render(records)).await
    }
}

/// job-exec セクションを並べる
pub fn render(records: &[SiteRecord]) -> String {
    let mut out = String::new();
    for record in records.iter().filter(|r| r.site_enabled) {
        let container = format!("{}-{}-1", record.project_name(), PHP_SERVICE);
        for (n, job) in record.cron_jobs.iter().enumerate() {
            let _ = writeln!(out, "[job-exec \"{}-{}\"]", record.site_url, n);
            let _ = writeln!(out, "schedule = {}", job.schedule);
            let _ = writeln!(out, "container = {}", container);
            let _ = writeln!(out, "user = {}", job.user);
            let _ = writeln!(out, "command = {}", job.command);
            out.push('\n');
        }
    }
    out
}
