//! サイト作成オプション
//!
//! CLIから受け取った生のオプションを検証し、不変の `SiteConfig` に変換します。
//! ここでのエラーはすべて副作用の発生前に検出されます。

use crate::error::{Result, SiteError};
use crate::model::{
    AdminIdentity, AliasDomains, CacheHostMode, CertPaths, DatabaseMode, DbCredentials,
    LOCAL_CACHE_HOST, LOCAL_DB_HOST, MultisiteMode, PhpVersion, ProxyCache, SiteConfig, SslMode,
    WpOptions,
};
use crate::password::{random_password, random_string, random_username, validate_admin_password};
use std::path::{Path, PathBuf};
use tracing::warn;

/// DBユーザー名に使うURLの最大長
const DB_USER_URL_LEN: usize = 53;
const DEFAULT_DB_PORT: u16 = 3306;

/// `create` に渡される生のオプション
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub url: String,
    pub title: Option<String>,
    pub admin_user: Option<String>,
    pub admin_pass: Option<String>,
    pub admin_email: Option<String>,
    pub mu: Option<String>,
    pub alias_domains: Option<String>,

    pub cache: bool,
    pub with_local_redis: bool,
    pub proxy_cache: Option<String>,
    pub proxy_cache_max_size: Option<String>,
    pub proxy_cache_max_time: Option<String>,

    pub local_db: bool,
    pub php: Option<String>,
    pub dbname: Option<String>,
    pub dbuser: Option<String>,
    pub dbpass: Option<String>,
    pub dbhost: Option<String>,
    pub dbprefix: Option<String>,
    pub dbcharset: Option<String>,
    pub dbcollate: Option<String>,
    pub skip_check: bool,

    pub wp_version: Option<String>,
    pub skip_content: bool,
    pub locale: Option<String>,
    pub public_dir: Option<String>,

    pub ssl: Option<String>,
    pub ssl_key: Option<PathBuf>,
    pub ssl_crt: Option<PathBuf>,
    pub wildcard: bool,

    pub vip: Option<String>,
    pub skip_install: bool,
    pub skip_status_check: bool,
    pub force: bool,
}

/// グローバル設定由来のデフォルト値
#[derive(Debug, Clone)]
pub struct SiteDefaults {
    pub webroot: PathBuf,
    pub locale: String,
    pub wp_mail: Option<String>,
    /// 共有DBのネットワークエイリアス
    pub global_db_host: String,
    /// 共有キャッシュのネットワークエイリアス
    pub global_cache_host: String,
    pub ssl_policy: Option<String>,
}

impl Default for SiteDefaults {
    fn default() -> Self {
        Self {
            webroot: PathBuf::from("/opt/siteflow/sites"),
            locale: "en_US".to_string(),
            wp_mail: None,
            global_db_host: "global-db".to_string(),
            global_cache_host: "global-redis".to_string(),
            ssl_policy: None,
        }
    }
}

impl CreateOptions {
    /// URLのみを指定したオプション
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 検証して `SiteConfig` を構築
    pub fn into_config(self, defaults: &SiteDefaults) -> Result<SiteConfig> {
        let url = normalize_url(&self.url)?;

        let multisite_mode = match self.mu.as_deref() {
            None => MultisiteMode::None,
            Some(mu) => MultisiteMode::parse(mu)
                .ok_or_else(|| SiteError::InvalidMultisite(mu.to_string()))?,
        };

        let admin_password = match self.admin_pass {
            Some(password) => {
                validate_admin_password(&password)?;
                password
            }
            None => random_password(),
        };

        let ssl_mode = match self.ssl.as_deref() {
            None => SslMode::None,
            Some(ssl) => SslMode::parse(ssl).ok_or_else(|| SiteError::InvalidSsl(ssl.to_string()))?,
        };
        let wildcard = self.wildcard || multisite_mode == MultisiteMode::Subdomain;
        if ssl_mode == SslMode::InheritParent && wildcard {
            return Err(SiteError::InheritWithWildcard);
        }
        let custom_cert = if ssl_mode == SslMode::CustomCert {
            Some(custom_cert_paths(self.ssl_key, self.ssl_crt)?)
        } else {
            None
        };

        let mut alias_domains = AliasDomains::new(url.clone());
        if multisite_mode == MultisiteMode::Subdomain {
            alias_domains.push_wildcard();
        }
        if let Some(csv) = &self.alias_domains {
            alias_domains.extend_csv(csv);
        }

        let php_version = match self.php.as_deref() {
            None => PhpVersion::default(),
            Some(requested) => {
                let (version, substituted) = PhpVersion::parse(requested)
                    .ok_or_else(|| SiteError::UnsupportedPhpVersion(requested.to_string()))?;
                if substituted {
                    warn!(
                        requested = %requested,
                        using = %version,
                        "PHP version is not available, falling back"
                    );
                }
                version
            }
        };

        let proxy_cache = parse_proxy_cache(
            self.proxy_cache.as_deref(),
            self.proxy_cache_max_size,
            self.proxy_cache_max_time,
        )?;
        let cache_enabled = self.cache || proxy_cache.is_some();
        let (cache_host_mode, cache_host) = if self.with_local_redis {
            (CacheHostMode::LocalContainer, LOCAL_CACHE_HOST.to_string())
        } else {
            (CacheHostMode::SharedGlobal, defaults.global_cache_host.clone())
        };

        let dbhost = match (self.local_db, self.dbhost.as_deref()) {
            (false, Some(raw)) => Some(parse_db_host(raw)?),
            _ => None,
        };
        let database_mode = match &dbhost {
            _ if self.local_db => DatabaseMode::LocalContainer,
            Some((host, _)) if *host != defaults.global_db_host => DatabaseMode::Remote,
            Some((host, Some(port))) if *port != DEFAULT_DB_PORT => {
                return Err(SiteError::GlobalDbPort {
                    host: host.clone(),
                    port: *port,
                });
            }
            _ => DatabaseMode::SharedGlobal,
        };
        let db = build_db_credentials(
            &url,
            database_mode,
            defaults,
            dbhost,
            self.dbname,
            self.dbuser,
            self.dbpass,
        )?;

        let public_dir = match self.public_dir.as_deref() {
            None => None,
            Some(dir) => normalize_public_dir(dir)?,
        };

        let admin = AdminIdentity {
            username: self.admin_user.unwrap_or_else(random_username),
            password: admin_password,
            email: self
                .admin_email
                .or_else(|| defaults.wp_mail.clone())
                .unwrap_or_else(|| format!("admin@{}", url)),
            site_title: self.title.unwrap_or_else(|| url.clone()),
        };

        let wordpress = WpOptions {
            locale: self.locale.unwrap_or_else(|| defaults.locale.clone()),
            version: self.wp_version,
            skip_content: self.skip_content,
            db_prefix: self.dbprefix.unwrap_or_else(|| "wp_".to_string()),
            db_charset: self.dbcharset.unwrap_or_else(|| "utf8mb4".to_string()),
            db_collate: self.dbcollate,
            skip_check: self.skip_check,
        };

        Ok(SiteConfig {
            filesystem_root: defaults.webroot.join(&url),
            url,
            public_dir,
            multisite_mode,
            cache_enabled,
            cache_host_mode,
            cache_host,
            proxy_cache,
            database_mode,
            php_version,
            ssl_mode,
            ssl_policy: defaults.ssl_policy.clone(),
            custom_cert,
            wildcard_cert: ssl_mode.is_enabled() && wildcard,
            alias_domains,
            db,
            admin,
            wordpress,
            vip_repo: self.vip,
            skip_install: self.skip_install,
            skip_status_check: self.skip_status_check,
            force_reset_remote_db: self.force,
        })
    }
}

/// URLを正規化（小文字化、スキームと末尾スラッシュの除去）
pub fn normalize_url(raw: &str) -> Result<String> {
    let url = raw.trim().to_lowercase();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url.as_str())
        .trim_end_matches('/')
        .to_string();

    let valid = !url.is_empty()
        && !url.starts_with('.')
        && !url.starts_with('-')
        && !url.contains("..")
        && url
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !valid {
        return Err(SiteError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

/// URLからDB名を導出
pub fn db_name_from_url(url: &str) -> String {
    url.replace(['.', '-'], "_")
}

/// URLからDBユーザー名を導出（ランダムな接尾辞付き）
pub fn db_user_from_url(url: &str) -> String {
    let prefix: String = url.chars().take(DB_USER_URL_LEN).collect();
    format!("{}-{}", prefix, random_string(6))
}

/// `host`、`host:port`、`[v6]:port`、`v6` を分解する
fn parse_db_host(raw: &str) -> Result<(String, Option<u16>)> {
    let raw = raw.trim();
    let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| SiteError::InvalidDbHost(raw.to_string()))?;
        match tail {
            "" => (host, None),
            _ => match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err(SiteError::InvalidDbHost(raw.to_string())),
            },
        }
    } else if raw.matches(':').count() > 1 {
        // 角括弧なしの IPv6 はポートなしとして扱う
        (raw, None)
    } else {
        match raw.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (raw, None),
        }
    };

    if host.is_empty() {
        return Err(SiteError::InvalidDbHost(raw.to_string()));
    }
    let port = port
        .map(|port| {
            port.parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| SiteError::InvalidDbPort(port.to_string()))
        })
        .transpose()?;
    Ok((host.to_string(), port))
}

fn build_db_credentials(
    url: &str,
    mode: DatabaseMode,
    defaults: &SiteDefaults,
    dbhost: Option<(String, Option<u16>)>,
    dbname: Option<String>,
    dbuser: Option<String>,
    dbpass: Option<String>,
) -> Result<DbCredentials> {
    let (host, port) = match mode {
        DatabaseMode::LocalContainer => (LOCAL_DB_HOST.to_string(), DEFAULT_DB_PORT),
        DatabaseMode::SharedGlobal => (defaults.global_db_host.clone(), DEFAULT_DB_PORT),
        DatabaseMode::Remote => match dbhost {
            Some((host, port)) => (host, port.unwrap_or(DEFAULT_DB_PORT)),
            None => return Err(SiteError::RemoteDbCredentialsRequired),
        },
    };

    let (user, password) = match mode {
        DatabaseMode::Remote => match (dbuser, dbpass) {
            (Some(user), Some(password)) => (user, password),
            _ => return Err(SiteError::RemoteDbCredentialsRequired),
        },
        _ => (
            dbuser.unwrap_or_else(|| db_user_from_url(url)),
            dbpass.unwrap_or_else(random_password),
        ),
    };

    Ok(DbCredentials {
        name: dbname.unwrap_or_else(|| db_name_from_url(url)),
        user,
        password,
        root_password: mode.is_local().then(random_password),
        host,
        port,
    })
}

fn custom_cert_paths(key: Option<PathBuf>, crt: Option<PathBuf>) -> Result<CertPaths> {
    let key = key.ok_or(SiteError::MissingCustomCert("--ssl-key"))?;
    let crt = crt.ok_or(SiteError::MissingCustomCert("--ssl-crt"))?;
    for path in [&key, &crt] {
        if !Path::new(path).is_file() {
            return Err(SiteError::CertFileNotFound(path.display().to_string()));
        }
    }
    Ok(CertPaths { key, crt })
}

fn parse_proxy_cache(
    flag: Option<&str>,
    max_size: Option<String>,
    max_time: Option<String>,
) -> Result<Option<ProxyCache>> {
    match flag {
        None | Some("off") => return Ok(None),
        Some("on") => {}
        Some(other) => return Err(SiteError::InvalidProxyCache(other.to_string())),
    }

    let defaults = ProxyCache::default();
    let max_size = max_size.unwrap_or(defaults.max_size);
    let max_time = max_time.unwrap_or(defaults.max_time);
    if !has_unit_suffix(&max_size, &['k', 'm', 'g']) {
        return Err(SiteError::InvalidProxyCache(max_size));
    }
    if !has_unit_suffix(&max_time, &['s', 'm', 'h', 'd']) {
        return Err(SiteError::InvalidProxyCache(max_time));
    }
    Ok(Some(ProxyCache { max_size, max_time }))
}

fn has_unit_suffix(value: &str, units: &[char]) -> bool {
    match value.char_indices().last() {
        Some((idx, unit)) => {
            units.contains(&unit.to_ascii_lowercase())
                && idx > 0
                && value[..idx].chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn normalize_public_dir(dir: &str) -> Result<Option<String>> {
    let trimmed = dir.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(SiteError::InvalidPublicDir(dir.to_string()));
    }
    Ok(Some(trimmed.to_string()))
}
