//! オブジェクトキャッシュ / ページキャッシュ / プロキシキャッシュ

use crate::error::{ProvisionError, Result};
use crate::materialize::write_file;
use crate::wordpress::PHP_SERVICE;
use serde_json::json;
use siteflow_container::ServiceCommand;
use siteflow_core::{SiteConfig, TemplateId, TemplateRenderer};
use std::path::PathBuf;
use tracing::debug;

const REDIS_PORT: u16 = 6379;
const REDIS_MAXTTL: u32 = 14400;

fn wp<I, S>(config: &SiteConfig, args: I) -> ServiceCommand
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut command = ServiceCommand::new(PHP_SERVICE, ["wp"])
        .user("www-data")
        .workdir(config.container_root());
    for arg in args {
        command = command.arg(arg);
    }
    command
}

fn plugin_install(config: &SiteConfig, plugin: &str) -> ServiceCommand {
    let mut command = wp(config, ["plugin", "install", plugin, "--activate"]);
    if config.multisite_mode.is_multisite() {
        command = command.arg("--network");
    }
    command
}

fn config_set(config: &SiteConfig, name: &str, value: impl Into<String>, raw: bool) -> ServiceCommand {
    let mut command = wp(config, ["config", "set", "--add", name]).arg(value);
    if raw {
        command = command.arg("--raw");
    }
    command
}

/// wp-redis によるオブジェクトキャッシュ
pub fn object_cache_commands(config: &SiteConfig) -> Vec<ServiceCommand> {
    vec![
        plugin_install(config, "wp-redis"),
        wp(
            config,
            ["config", "set", "--add", "--raw", "--type=variable", "redis_server"],
        )
        .arg(format!(
            "array( 'host' => '{}', 'port' => {} )",
            config.cache_host, REDIS_PORT
        )),
        wp(config, ["redis", "enable"]),
    ]
}

/// nginx-helper によるページキャッシュ
pub fn page_cache_commands(config: &SiteConfig) -> Vec<ServiceCommand> {
    let options = json!({
        "enable_purge": "1",
        "cache_method": "enable_redis",
        "redis_hostname": config.cache_host,
        "redis_port": REDIS_PORT.to_string(),
        "redis_prefix": format!("{}_page:", config.url),
        "purge_method": "get_request",
        "purge_homepage_on_edit": "1",
        "purge_homepage_on_del": "1",
        "purge_archive_on_edit": "1",
        "purge_archive_on_del": "1",
        "purge_page_on_mod": "1",
        "purge_page_on_new_comment": "1",
        "purge_page_on_deleted_comment": "1",
        "log_level": "INFO",
        "log_filesize": "5",
    })
    .to_string();

    let update = if config.multisite_mode.is_multisite() {
        wp(config, ["network", "meta", "update", "1", "rt_wp_nginx_helper_options"])
    } else {
        wp(config, ["option", "update", "rt_wp_nginx_helper_options"])
    };

    vec![
        plugin_install(config, "nginx-helper"),
        config_set(config, "RT_WP_NGINX_HELPER_REDIS_HOSTNAME", config.cache_host.clone(), false),
        config_set(config, "RT_WP_NGINX_HELPER_REDIS_PORT", REDIS_PORT.to_string(), true),
        config_set(
            config,
            "RT_WP_NGINX_HELPER_REDIS_PREFIX",
            format!("{}_page:", config.url),
            false,
        ),
        config_set(config, "WP_CACHE_KEY_SALT", format!("{}_", config.url), false),
        config_set(config, "WP_REDIS_MAXTTL", REDIS_MAXTTL.to_string(), true),
        update.arg(options).arg("--format=json"),
    ]
}

/// リバースプロキシに置くサイト別のキャッシュ設定
#[derive(Debug, Clone)]
pub struct ProxyCacheFiles {
    /// http コンテキストで読み込まれる conf.d
    pub conf_dir: PathBuf,
    /// サイトの location に読み込まれる vhost.d
    pub vhost_dir: PathBuf,
}

impl ProxyCacheFiles {
    pub fn new(conf_dir: impl Into<PathBuf>, vhost_dir: impl Into<PathBuf>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
            vhost_dir: vhost_dir.into(),
        }
    }

    pub fn path_file(&self, url: &str) -> PathBuf {
        self.conf_dir.join(format!("{}-proxy-cache.conf", url))
    }

    pub fn location_file(&self, url: &str) -> PathBuf {
        self.vhost_dir.join(format!("{}_location", url))
    }

    /// キャッシュ設定を書き出す（プロキシキャッシュが無効なら何もしない）
    pub async fn write(&self, config: &SiteConfig, renderer: &TemplateRenderer) -> Result<Vec<PathBuf>> {
        let Some(proxy) = &config.proxy_cache else {
            return Ok(Vec::new());
        };
        let zone = cache_zone(&config.url);

        let path_conf = renderer
            .render(
                TemplateId::ProxyCachePath,
                &json!({ "url": config.url, "zone": zone, "max_size": proxy.max_size }),
            )
            .map_err(ProvisionError::template)?;
        let location_conf = renderer
            .render(
                TemplateId::ProxyCacheLocation,
                &json!({ "url": config.url, "zone": zone, "max_time": proxy.max_time }),
            )
            .map_err(ProvisionError::template)?;

        let path_file = write_file(&self.path_file(&config.url), &path_conf).await?;
        match write_file(&self.location_file(&config.url), &location_conf).await {
            Ok(location_file) => Ok(vec![path_file, location_file]),
            Err(e) => {
                // 片方だけ残すとプロキシが読み込めない
                if let Err(cleanup) = tokio::fs::remove_file(&path_file).await {
                    debug!(error = %cleanup, "Failed to remove partial proxy cache file");
                }
                Err(e)
            }
        }
    }

    /// 書き出したファイルを削除（存在しなければ何もしない）
    pub async fn remove_files(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed proxy cache file");
                    removed.push(path.clone());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ProvisionError::config_write(path, e)),
            }
        }
        Ok(removed)
    }
}

/// nginx のキャッシュゾーン名
fn cache_zone(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
