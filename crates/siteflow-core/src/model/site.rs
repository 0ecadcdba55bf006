//! サイト設定

use super::alias::AliasDomains;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// コンテナ内のWordPressドキュメントルート
pub const CONTAINER_HTDOCS: &str = "/var/www/htdocs";

/// ローカルDBコンテナのサービス名
pub const LOCAL_DB_HOST: &str = "db";

/// ローカルキャッシュコンテナのサービス名
pub const LOCAL_CACHE_HOST: &str = "redis";

/// マルチサイト種別
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultisiteMode {
    #[default]
    None,
    Subdomain,
    Subdirectory,
}

impl MultisiteMode {
    /// `--mu` の値からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subdom" => Some(Self::Subdomain),
            "subdir" => Some(Self::Subdirectory),
            _ => None,
        }
    }

    pub fn is_multisite(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// サイトレコードに記録する種別名
    pub fn as_site_type(&self) -> &'static str {
        match self {
            Self::None => "wp",
            Self::Subdomain => "subdom",
            Self::Subdirectory => "subdir",
        }
    }
}

/// キャッシュ（Redis）の配置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheHostMode {
    LocalContainer,
    #[default]
    SharedGlobal,
}

/// データベースの配置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseMode {
    LocalContainer,
    #[default]
    SharedGlobal,
    Remote,
}

impl DatabaseMode {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::LocalContainer)
    }
}

/// SSL種別
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslMode {
    #[default]
    None,
    ManagedCert,
    SelfSigned,
    InheritParent,
    CustomCert,
}

impl SslMode {
    /// `--ssl` の値からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "le" => Some(Self::ManagedCert),
            "self" => Some(Self::SelfSigned),
            "inherit" => Some(Self::InheritParent),
            "custom" => Some(Self::CustomCert),
            "off" | "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// ローカル解決用にhostsへ登録する必要があるか
    pub fn needs_hosts_entry(&self) -> bool {
        matches!(self, Self::None | Self::SelfSigned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "off",
            Self::ManagedCert => "le",
            Self::SelfSigned => "self",
            Self::InheritParent => "inherit",
            Self::CustomCert => "custom",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PHPバージョン
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhpVersion(String);

impl PhpVersion {
    pub const SUPPORTED: &'static [&'static str] = &["5.6", "7.0", "7.2", "7.3", "latest"];

    /// 正規化してパース
    ///
    /// 戻り値の bool は要求と異なるバージョンに読み替えたかどうか。
    pub fn parse(s: &str) -> Option<(Self, bool)> {
        let s = s.trim();
        if s == "7.4" {
            return Some((Self::latest(), false));
        }
        if Self::SUPPORTED.contains(&s) {
            return Some((Self(s.to_string()), false));
        }
        match s.split('.').next() {
            Some("5") => Some((Self("5.6".to_string()), true)),
            Some("7") => Some((Self::latest(), true)),
            _ => None,
        }
    }

    pub fn latest() -> Self {
        Self("latest".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_legacy(&self) -> bool {
        self.0 == "5.6"
    }

    /// イメージタグ
    pub fn image_tag(&self) -> &str {
        &self.0
    }
}

impl Default for PhpVersion {
    fn default() -> Self {
        Self::latest()
    }
}

impl fmt::Display for PhpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// データベース接続情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbCredentials {
    pub name: String,
    pub user: String,
    pub password: String,
    /// ローカルDBコンテナの場合のみ
    pub root_password: Option<String>,
    pub host: String,
    pub port: u16,
}

impl DbCredentials {
    /// "host:port" 形式（IPv6 は角括弧で囲む）
    pub fn host_port(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// 管理者情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminIdentity {
    pub username: String,
    pub password: String,
    pub email: String,
    pub site_title: String,
}

/// WordPressのダウンロード/設定オプション
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpOptions {
    pub locale: String,
    pub version: Option<String>,
    pub skip_content: bool,
    pub db_prefix: String,
    pub db_charset: String,
    pub db_collate: Option<String>,
    pub skip_check: bool,
}

/// プロキシキャッシュ設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCache {
    pub max_size: String,
    pub max_time: String,
}

impl Default for ProxyCache {
    fn default() -> Self {
        Self {
            max_size: "100m".to_string(),
            max_time: "1s".to_string(),
        }
    }
}

/// カスタム証明書のパス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertPaths {
    pub key: PathBuf,
    pub crt: PathBuf,
}

/// サイト設定
///
/// `CreateOptions` の検証後に一度だけ構築され、以後は変更されません。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub url: String,
    pub filesystem_root: PathBuf,
    /// サブディレクトリ（`--public-dir`）
    pub public_dir: Option<String>,

    pub multisite_mode: MultisiteMode,
    pub cache_enabled: bool,
    pub cache_host_mode: CacheHostMode,
    /// キャッシュホストのネットワークエイリアス
    pub cache_host: String,
    pub proxy_cache: Option<ProxyCache>,
    pub database_mode: DatabaseMode,
    pub php_version: PhpVersion,
    pub ssl_mode: SslMode,
    pub ssl_policy: Option<String>,
    pub custom_cert: Option<CertPaths>,
    pub wildcard_cert: bool,
    pub alias_domains: AliasDomains,

    pub db: DbCredentials,
    pub admin: AdminIdentity,
    pub wordpress: WpOptions,
    pub vip_repo: Option<String>,

    pub skip_install: bool,
    pub skip_status_check: bool,
    pub force_reset_remote_db: bool,
}

impl SiteConfig {
    /// コンテナ内のWordPressルート
    pub fn container_root(&self) -> String {
        match &self.public_dir {
            Some(dir) => format!("{}/{}", CONTAINER_HTDOCS, dir),
            None => CONTAINER_HTDOCS.to_string(),
        }
    }

    /// compose プロジェクト名
    pub fn project_name(&self) -> String {
        project_name(&self.url)
    }

    /// リダイレクト先に付けるスキーム
    pub fn scheme(&self) -> &'static str {
        if self.ssl_mode.is_enabled() {
            "https"
        } else {
            "http"
        }
    }

    pub fn site_url(&self) -> String {
        format!("{}://{}", self.scheme(), self.url)
    }
}


/// URL から compose プロジェクト名を作る（英数字のみ）
pub fn project_name(url: &str) -> String {
    url.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}
