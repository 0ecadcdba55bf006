pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use siteflow_container::{GlobalNames, WaitConfig};
use siteflow_core::{ImageSet, SiteDefaults, Topology};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 設定ファイルパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "SITEFLOW_CONFIG_PATH";

/// siteflowの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("siteflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイルのパスを決定
///
/// 1. 環境変数 SITEFLOW_CONFIG_PATH (直接パス指定)
/// 2. ~/.config/siteflow/config.yml
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(config_path));
    }
    dirs::config_dir().map(|dir| dir.join("siteflow").join("config.yml"))
}

/// イメージ設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Images {
    pub nginx: String,
    pub php: String,
    pub db: String,
    pub redis: String,
    pub postfix: String,
    /// リモートDB検証用の一時コンテナ
    pub db_client: String,
    /// ネットワーク調査用の一時コンテナ
    pub toolbox: String,
    /// 証明書の発行に使う一時コンテナ
    pub acme: String,
}

impl Default for Images {
    fn default() -> Self {
        let images = ImageSet::default();
        Self {
            nginx: images.nginx,
            php: images.php,
            db: images.db.clone(),
            redis: images.redis,
            postfix: images.postfix,
            db_client: images.db,
            toolbox: "busybox:latest".to_string(),
            acme: "neilpang/acme.sh:latest".to_string(),
        }
    }
}

/// ネットワーク名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Networks {
    pub frontend: String,
    pub backend: String,
}

impl Default for Networks {
    fn default() -> Self {
        let names = GlobalNames::default();
        Self {
            frontend: names.frontend_network,
            backend: names.backend_network,
        }
    }
}

/// グローバルサービスのコンテナ名（ネットワークエイリアス）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalContainers {
    pub db: String,
    pub redis: String,
    pub proxy: String,
    pub cron: String,
}

impl Default for GlobalContainers {
    fn default() -> Self {
        let names = GlobalNames::default();
        Self {
            db: names.db,
            redis: names.redis,
            proxy: names.proxy,
            cron: names.cron,
        }
    }
}

/// グローバル設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// サイトを配置するディレクトリ
    pub webroot: PathBuf,
    /// サイトレコードなどの保存先
    pub data_dir: PathBuf,
    /// グローバルサービスの compose プロジェクト
    pub services_dir: PathBuf,
    pub hosts_file: PathBuf,
    /// リバースプロキシの証明書ディレクトリ
    pub certs_dir: PathBuf,
    /// リバースプロキシの vhost.d
    pub vhost_dir: PathBuf,
    /// リバースプロキシの conf.d
    pub proxy_conf_dir: PathBuf,
    pub locale: String,
    pub wp_mail: Option<String>,
    /// ACME 登録用メールアドレス
    pub acme_email: Option<String>,
    pub images: Images,
    pub ssl_policy_default: String,
    pub ssl_policy: Option<String>,
    pub networks: Networks,
    pub global: GlobalContainers,
    pub db_health: WaitConfig,
    pub status_check: WaitConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        let services_dir = PathBuf::from("/opt/siteflow/services");
        Self {
            webroot: PathBuf::from("/opt/siteflow/sites"),
            data_dir: dirs::data_dir()
                .map(|dir| dir.join("siteflow"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/siteflow")),
            hosts_file: PathBuf::from("/etc/hosts"),
            certs_dir: services_dir.join("nginx-proxy/certs"),
            vhost_dir: services_dir.join("nginx-proxy/vhost.d"),
            proxy_conf_dir: services_dir.join("nginx-proxy/conf.d"),
            services_dir,
            locale: "en_US".to_string(),
            wp_mail: None,
            acme_email: None,
            images: Images::default(),
            ssl_policy_default: "Mozilla-Intermediate".to_string(),
            ssl_policy: None,
            networks: Networks::default(),
            global: GlobalContainers::default(),
            db_health: WaitConfig::fixed(180, 1000),
            status_check: WaitConfig::fixed(60, 1000),
        }
    }
}

impl GlobalConfig {
    /// 設定を読み込む（ファイルがなければデフォルト）
    pub fn load() -> Result<Self> {
        let mut config = match find_config_file() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// 指定ファイルから読み込む
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loading configuration");

        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// 環境変数による上書き
    pub fn apply_env_overrides(&mut self) {
        if let Ok(webroot) = std::env::var("SITEFLOW_WEBROOT") {
            self.webroot = PathBuf::from(webroot);
        }
        if let Ok(data_dir) = std::env::var("SITEFLOW_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(locale) = std::env::var("SITEFLOW_LOCALE") {
            self.locale = locale;
        }
        if let Ok(mail) = std::env::var("SITEFLOW_WP_MAIL") {
            self.wp_mail = Some(mail);
        }
    }

    /// サイト作成オプションのデフォルト値
    pub fn site_defaults(&self) -> SiteDefaults {
        SiteDefaults {
            webroot: self.webroot.clone(),
            locale: self.locale.clone(),
            wp_mail: self.wp_mail.clone(),
            global_db_host: self.global.db.clone(),
            global_cache_host: self.global.redis.clone(),
            ssl_policy: self.ssl_policy.clone(),
        }
    }

    /// compose トポロジーの前提
    pub fn topology(&self) -> Topology {
        Topology {
            images: ImageSet {
                nginx: self.images.nginx.clone(),
                php: self.images.php.clone(),
                db: self.images.db.clone(),
                redis: self.images.redis.clone(),
                postfix: self.images.postfix.clone(),
            },
            frontend_network: self.networks.frontend.clone(),
            backend_network: self.networks.backend.clone(),
            default_ssl_policy: self.ssl_policy_default.clone(),
        }
    }

    pub fn global_names(&self) -> GlobalNames {
        GlobalNames {
            db: self.global.db.clone(),
            redis: self.global.redis.clone(),
            proxy: self.global.proxy.clone(),
            cron: self.global.cron.clone(),
            frontend_network: self.networks.frontend.clone(),
            backend_network: self.networks.backend.clone(),
        }
    }

    /// サイトレコードの保存ファイル
    pub fn sites_file(&self) -> PathBuf {
        self.data_dir.join("sites.json")
    }

    /// cron コンテナが読むジョブ定義
    pub fn cron_file(&self) -> PathBuf {
        self.services_dir.join("cron/config.ini")
    }
}
