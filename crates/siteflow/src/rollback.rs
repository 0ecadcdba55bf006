//! 作成途中のサイトの後始末
//!
//! 到達したプロビジョニングレベルまでに作ったものだけを取り消します。
//! 個々の失敗はログに残して処理を続け、呼び出し側にエラーは返しません。

use crate::cache::ProxyCacheFiles;
use crate::hosts::HostsFile;
use crate::remote_db::DbClient;
use crate::ssl::CertIssuer;
use siteflow_container::{ContainerDriver, GlobalResources, RemovalReport};
use siteflow_core::{DbCredentials, ProvisioningLevel};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// DB 側で取り消す内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbRollback {
    /// 共有DBに作成したユーザーとスキーマ
    SharedUser { user: String, schema: String },
    /// リモートDBに作成したスキーマ（検証時と同じ認証情報で削除する）
    RemoteSchema(DbCredentials),
}

/// この実行でサイトの外に作成したもの
///
/// 既存の hosts エントリや証明書は含めず、取り消しの対象にもしません。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Footprint {
    /// hosts ファイルに追加したエントリ
    pub hosts_entry: bool,
    /// プロキシに書き出したキャッシュ設定
    pub proxy_files: Vec<PathBuf>,
    /// プロキシに配置した証明書
    pub certificate: bool,
}

/// 取り消した内容
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub resources: RemovalReport,
    pub removed_root: bool,
    pub hosts_entry: bool,
    pub proxy_files: Vec<PathBuf>,
    pub cert_files: Vec<PathBuf>,
    pub db_dropped: bool,
    pub failures: Vec<String>,
}

impl CleanupReport {
    fn failed(&mut self, what: &str, err: impl Display) {
        warn!(error = %err, "Clean-up step failed: {}", what);
        self.failures.push(format!("{}: {}", what, err));
    }
}

pub struct Cleanup {
    driver: Arc<dyn ContainerDriver>,
    globals: Arc<dyn GlobalResources>,
    db_client: Arc<dyn DbClient>,
    certs: Arc<dyn CertIssuer>,
    hosts: HostsFile,
    proxy_cache: ProxyCacheFiles,
}

impl Cleanup {
    pub fn new(
        driver: Arc<dyn ContainerDriver>,
        globals: Arc<dyn GlobalResources>,
        db_client: Arc<dyn DbClient>,
        certs: Arc<dyn CertIssuer>,
        hosts: HostsFile,
        proxy_cache: ProxyCacheFiles,
    ) -> Self {
        Self {
            driver,
            globals,
            db_client,
            certs,
            hosts,
            proxy_cache,
        }
    }

    /// レベルに応じてサイトの作成済みリソースを削除
    ///
    /// サイト外のファイルは `footprint` に記録されたものだけを削除します。
    /// 何度呼んでも安全で、レベル0では何もしません。
    #[instrument(skip(self, root, db, footprint), fields(level = %level))]
    pub async fn cleanup(
        &self,
        level: ProvisioningLevel,
        site_url: &str,
        root: &Path,
        db: Option<&DbRollback>,
        footprint: &Footprint,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();

        if level >= ProvisioningLevel::RootCreated {
            // ディレクトリをマウントしているコンテナから先に削除する
            match self.driver.remove_by_label(site_url).await {
                Ok(removed) => {
                    report.failures.extend(removed.failures.iter().cloned());
                    report.resources = removed;
                }
                Err(e) => report.failed("remove containers", e),
            }

            match tokio::fs::remove_dir_all(root).await {
                Ok(()) => report.removed_root = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(root = %root.display(), "Site root already removed");
                }
                Err(e) => report.failed("remove site root", e),
            }
        }

        if footprint.hosts_entry {
            match self.hosts.remove(site_url).await {
                Ok(removed) => report.hosts_entry = removed,
                Err(e) => report.failed("remove hosts entry", e),
            }
        }
        if !footprint.proxy_files.is_empty() {
            match self.proxy_cache.remove_files(&footprint.proxy_files).await {
                Ok(removed) => report.proxy_files = removed,
                Err(e) => report.failed("remove proxy cache", e),
            }
        }
        if footprint.certificate {
            match self.certs.remove(site_url).await {
                Ok(removed) => report.cert_files = removed,
                Err(e) => report.failed("remove certificate", e),
            }
        }
        if !report.proxy_files.is_empty() || !report.cert_files.is_empty() {
            if let Err(e) = self.globals.reload_proxy().await {
                report.failed("reload proxy", e);
            }
        }

        match db {
            Some(DbRollback::SharedUser { user, schema }) => {
                match self.globals.drop_db_user(user, schema).await {
                    Ok(()) => report.db_dropped = true,
                    Err(e) => report.failed("drop database user", e),
                }
            }
            Some(DbRollback::RemoteSchema(credentials)) => {
                match self.db_client.drop_schema(credentials).await {
                    Ok(()) => report.db_dropped = true,
                    Err(e) => report.failed("drop remote database", e),
                }
            }
            None => {}
        }

        info!(
            containers = report.resources.containers.len(),
            volumes = report.resources.volumes.len(),
            networks = report.resources.networks.len(),
            removed_root = report.removed_root,
            failures = report.failures.len(),
            "Clean-up finished"
        );
        report
    }
}
