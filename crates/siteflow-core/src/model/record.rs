//! サイトレコード

use super::cron::CronJob;
use super::site::{CacheHostMode, DatabaseMode, LOCAL_CACHE_HOST, SiteConfig, project_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 永続化されるサイト情報
///
/// 作成成功時に一度だけ書き込まれます。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub site_url: String,
    pub site_type: String,
    pub site_fs_path: PathBuf,
    #[serde(default)]
    pub alias_domains: Vec<String>,
    pub app_sub_type: String,
    pub site_title: String,
    pub php_version: String,

    pub cache_nginx_browser: bool,
    pub cache_nginx_fullpage: bool,
    pub cache_mysql_query: bool,
    pub cache_app_object: bool,
    pub cache_host: String,
    pub proxy_cache: bool,

    pub db_name: String,
    pub db_user: String,
    pub db_host: String,
    pub db_port: u16,
    pub db_password: String,
    pub db_root_password: Option<String>,
    pub db_mode: DatabaseMode,

    pub app_admin_url: String,
    pub app_admin_email: String,
    pub app_admin_username: String,
    pub app_admin_password: String,
    pub app_mail: String,

    pub site_ssl: Option<String>,
    pub site_ssl_wildcard: bool,
    pub php_version_latest: bool,
    pub site_enabled: bool,
    pub installed: bool,
    pub created_on: DateTime<Utc>,

    /// php コンテナで定期実行するジョブ
    #[serde(default)]
    pub cron_jobs: Vec<CronJob>,
    /// wp-content の取得元 VIP リポジトリ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vip_repo_url: Option<String>,
}

impl SiteRecord {
    pub fn from_config(config: &SiteConfig, installed: bool) -> Self {
        let object_cache = config.cache_enabled;
        Self {
            site_url: config.url.clone(),
            site_type: "wp".to_string(),
            site_fs_path: config.filesystem_root.clone(),
            alias_domains: config.alias_domains.iter().map(str::to_string).collect(),
            app_sub_type: config.multisite_mode.as_site_type().to_string(),
            site_title: config.admin.site_title.clone(),
            php_version: config.php_version.to_string(),
            cache_nginx_browser: false,
            cache_nginx_fullpage: object_cache,
            cache_mysql_query: object_cache,
            cache_app_object: object_cache,
            cache_host: if object_cache {
                config.cache_host.clone()
            } else {
                String::new()
            },
            proxy_cache: config.proxy_cache.is_some(),
            db_name: config.db.name.clone(),
            db_user: config.db.user.clone(),
            db_host: config.db.host.clone(),
            db_port: config.db.port,
            db_password: config.db.password.clone(),
            db_root_password: config.db.root_password.clone(),
            db_mode: config.database_mode,
            app_admin_url: format!("{}/wp-admin", config.site_url()),
            app_admin_email: config.admin.email.clone(),
            app_admin_username: config.admin.username.clone(),
            app_admin_password: config.admin.password.clone(),
            app_mail: "postfix".to_string(),
            site_ssl: config
                .ssl_mode
                .is_enabled()
                .then(|| config.ssl_mode.to_string()),
            site_ssl_wildcard: config.wildcard_cert,
            php_version_latest: config.php_version.as_str() == "latest",
            site_enabled: true,
            installed,
            created_on: Utc::now(),
            cron_jobs: vec![CronJob::wp_cron()],
            vip_repo_url: None,
        }
    }

    pub fn is_vip(&self) -> bool {
        self.vip_repo_url.is_some()
    }

    /// compose プロジェクト名
    pub fn project_name(&self) -> String {
        project_name(&self.site_url)
    }

    pub fn local_cache(&self) -> bool {
        self.cache_app_object && self.cache_host == LOCAL_CACHE_HOST
    }

    pub fn local_db(&self) -> bool {
        self.db_mode.is_local()
    }

    /// 記録されたキャッシュ配置
    pub fn cache_host_mode(&self) -> CacheHostMode {
        if self.local_cache() {
            CacheHostMode::LocalContainer
        } else {
            CacheHostMode::SharedGlobal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CreateOptions, SiteDefaults};

    fn record() -> SiteRecord {
        let config = CreateOptions::for_url("demo.test")
            .into_config(&SiteDefaults::default())
            .unwrap();
        SiteRecord::from_config(&config, true)
    }

    #[test]
    fn test_new_record_has_wp_cron_job() {
        let record = record();
        assert_eq!(record.cron_jobs.len(), 1);
        assert_eq!(record.cron_jobs[0].command, "wp cron event run --due-now");
        assert_eq!(record.project_name(), "demotest");
    }

    #[test]
    fn test_vip_meta() {
        let mut record = record();
        assert!(!record.is_vip());
        assert!(!serde_json::to_string(&record).unwrap().contains("vip_repo_url"));

        record.vip_repo_url = Some("https://github.com/example/vip-site.git".to_string());
        assert!(record.is_vip());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["vip_repo_url"], "https://github.com/example/vip-site.git");
    }

    #[test]
    fn test_older_records_load_without_cron_jobs() {
        let mut json = serde_json::to_value(record()).unwrap();
        let object = json.as_object_mut().unwrap();
        object.remove("cron_jobs");
        object.remove("vip_repo_url");

        let loaded: SiteRecord = serde_json::from_value(json).unwrap();
        assert!(loaded.cron_jobs.is_empty());
        assert!(!loaded.is_vip());
    }
}
