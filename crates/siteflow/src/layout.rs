//! サイトのファイルシステムレイアウト
//!
//! ```text
//! <root>/
//!   docker-compose.yml
//!   .env
//!   config/nginx/conf.d/main.conf
//!   config/nginx/custom/user.conf
//!   config/php/conf.d/custom.ini
//!   config/postfix/main.cf
//!   app/htdocs/            (/var/www/htdocs)
//!   logs/nginx/ logs/php/
//! ```

use crate::error::{ProvisionError, Result};
use siteflow_core::{CONTAINER_HTDOCS, LOCAL_CACHE_HOST, LOCAL_DB_HOST, SiteConfig, VolumeMount, VolumeMountSet};
use std::path::{Path, PathBuf};
use tracing::debug;

const NGINX_CONF: &str = "/usr/local/openresty/nginx/conf";

pub const DB_VOLUME: &str = "db_data";
pub const CACHE_VOLUME: &str = "cache_data";
pub const POSTFIX_SPOOL_VOLUME: &str = "postfix_spool";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    root: PathBuf,
}

impl SiteLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn for_site(config: &SiteConfig) -> Self {
        Self::new(&config.filesystem_root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn compose_file(&self) -> PathBuf {
        self.root.join("docker-compose.yml")
    }

    pub fn env_file(&self) -> PathBuf {
        self.root.join(".env")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn nginx_conf_dir(&self) -> PathBuf {
        self.config_dir().join("nginx/conf.d")
    }

    pub fn nginx_vhost(&self) -> PathBuf {
        self.nginx_conf_dir().join("main.conf")
    }

    pub fn nginx_custom_dir(&self) -> PathBuf {
        self.config_dir().join("nginx/custom")
    }

    pub fn nginx_custom(&self) -> PathBuf {
        self.nginx_custom_dir().join("user.conf")
    }

    pub fn php_conf_dir(&self) -> PathBuf {
        self.config_dir().join("php/conf.d")
    }

    pub fn php_ini(&self) -> PathBuf {
        self.php_conf_dir().join("custom.ini")
    }

    pub fn postfix_dir(&self) -> PathBuf {
        self.config_dir().join("postfix")
    }

    pub fn postfix_main(&self) -> PathBuf {
        self.postfix_dir().join("main.cf")
    }

    /// コンテナの `/var/www`
    pub fn app_dir(&self) -> PathBuf {
        self.root.join("app")
    }

    /// コンテナの `/var/www/htdocs`
    pub fn htdocs(&self) -> PathBuf {
        self.app_dir().join("htdocs")
    }

    /// WordPress のルート（公開ディレクトリを考慮）
    pub fn wp_root(&self, public_dir: Option<&str>) -> PathBuf {
        match public_dir {
            Some(dir) => self.htdocs().join(dir),
            None => self.htdocs(),
        }
    }

    pub fn wp_cli_yml(&self) -> PathBuf {
        self.htdocs().join("wp-cli.yml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// サイト作成時に用意するディレクトリ一覧
    pub fn directories(&self) -> Vec<PathBuf> {
        vec![
            self.root.clone(),
            self.nginx_conf_dir(),
            self.nginx_custom_dir(),
            self.php_conf_dir(),
            self.postfix_dir(),
            self.htdocs(),
            self.logs_dir().join("nginx"),
            self.logs_dir().join("php"),
        ]
    }

    /// サイトのルートディレクトリ構成を作成
    ///
    /// 既に存在するディレクトリはそのまま残ります。
    pub async fn create_root(&self) -> Result<()> {
        for dir in self.directories() {
            ensure_dir(&dir).await?;
        }
        debug!(root = %self.root.display(), "Site root ready");
        Ok(())
    }

    /// サービスごとのボリュームマウント
    pub fn volume_mounts(&self, config: &SiteConfig) -> VolumeMountSet {
        let mut set = VolumeMountSet::new();
        let www = CONTAINER_HTDOCS.trim_end_matches("/htdocs");

        set.insert("nginx", VolumeMount::bind(self.app_dir(), www));
        set.insert(
            "nginx",
            VolumeMount::bind(self.nginx_conf_dir(), format!("{}/conf.d", NGINX_CONF)).read_only(),
        );
        set.insert(
            "nginx",
            VolumeMount::bind(self.nginx_custom_dir(), format!("{}/custom", NGINX_CONF)).read_only(),
        );
        set.insert(
            "nginx",
            VolumeMount::bind(self.logs_dir().join("nginx"), "/var/log/nginx"),
        );

        set.insert("php", VolumeMount::bind(self.app_dir(), www));
        set.insert(
            "php",
            VolumeMount::bind(self.php_ini(), "/usr/local/etc/php/conf.d/custom.ini").read_only(),
        );
        set.insert("php", VolumeMount::bind(self.logs_dir().join("php"), "/var/log/php"));

        set.insert(
            "postfix",
            VolumeMount::bind(self.postfix_main(), "/etc/postfix/main.cf").read_only(),
        );
        set.insert(
            "postfix",
            VolumeMount::named(POSTFIX_SPOOL_VOLUME, "/var/spool/postfix"),
        );

        if config.database_mode.is_local() {
            set.insert(LOCAL_DB_HOST, VolumeMount::named(DB_VOLUME, "/var/lib/mysql"));
        }
        if config.cache_enabled {
            set.insert(LOCAL_CACHE_HOST, VolumeMount::named(CACHE_VOLUME, "/data"));
        }
        set
    }
}

pub(crate) async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ProvisionError::config_write(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteflow_core::{CreateOptions, SiteDefaults};
    use tempfile::tempdir;

    fn config(local_db: bool) -> SiteConfig {
        CreateOptions {
            local_db,
            ..CreateOptions::for_url("demo.test")
        }
        .into_config(&SiteDefaults::default())
        .unwrap()
    }

    fn snapshot(root: &Path) -> Vec<PathBuf> {
        let mut entries = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path.clone());
                }
                entries.push(path);
            }
        }
        entries.sort();
        entries
    }

    #[tokio::test]
    async fn test_create_root_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let layout = SiteLayout::new(temp_dir.path().join("demo.test"));

        layout.create_root().await.unwrap();
        let first = snapshot(layout.root());
        layout.create_root().await.unwrap();
        let second = snapshot(layout.root());

        assert_eq!(first, second);
        assert!(layout.htdocs().is_dir());
        assert!(layout.nginx_conf_dir().is_dir());
    }

    #[test]
    fn test_db_volume_only_for_local_db() {
        let layout = SiteLayout::new("/srv/sites/demo.test");

        let local = layout.volume_mounts(&config(true));
        assert_eq!(local.for_service(LOCAL_DB_HOST).len(), 1);

        let shared = layout.volume_mounts(&config(false));
        assert!(shared.for_service(LOCAL_DB_HOST).is_empty());
        assert!(shared.for_service(LOCAL_CACHE_HOST).is_empty());
    }

    #[test]
    fn test_public_dir_root() {
        let layout = SiteLayout::new("/srv/sites/demo.test");
        assert_eq!(
            layout.wp_root(Some("web/public")),
            PathBuf::from("/srv/sites/demo.test/app/htdocs/web/public")
        );
        assert_eq!(layout.wp_root(None), layout.htdocs());
    }
}
