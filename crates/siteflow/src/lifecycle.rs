//! 作成済みサイトの参照・再起動・再読み込み

use crate::error::{ProvisionError, Result};
use crate::wordpress::PHP_SERVICE;
use siteflow_container::{ContainerDriver, ServiceCommand};
use siteflow_core::{SiteError, SiteRecord};
use siteflow_store::{SiteStore, StoreError};
use tracing::{info, instrument};

/// 操作の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOp {
    Restart,
    Reload,
}

/// サイトレコードを取得（存在しなければエラー）
pub async fn find_site(store: &dyn SiteStore, url: &str) -> Result<SiteRecord> {
    store
        .find(url)
        .await?
        .ok_or_else(|| StoreError::SiteNotFound(url.to_string()).into())
}

/// `info` で表示する行（表示順）
pub fn info_rows(record: &SiteRecord) -> Vec<(&'static str, String)> {
    let scheme = if record.site_ssl.is_some() { "https" } else { "http" };
    let mut rows = vec![
        ("Site", format!("{}://{}", scheme, record.site_url)),
        ("Site Root", record.site_fs_path.display().to_string()),
        ("Site Title", record.site_title.clone()),
    ];

    if record.installed {
        rows.push(("WordPress Username", record.app_admin_username.clone()));
        rows.push(("WordPress Password", record.app_admin_password.clone()));
    }

    // 先頭は主URLなので別名のみ表示
    let aliases: Vec<&str> = record
        .alias_domains
        .iter()
        .filter(|d| **d != record.site_url)
        .map(String::as_str)
        .collect();
    rows.push((
        "Alias Domains",
        if aliases.is_empty() {
            "None".to_string()
        } else {
            aliases.join(", ")
        },
    ));

    let db_host = if record.db_host.contains(':') {
        format!("[{}]:{}", record.db_host, record.db_port)
    } else {
        format!("{}:{}", record.db_host, record.db_port)
    };
    rows.push(("DB Host", db_host));
    if record.local_db() {
        if let Some(root) = &record.db_root_password {
            rows.push(("DB Root Password", root.clone()));
        }
    }
    rows.push(("DB Name", record.db_name.clone()));
    rows.push(("DB User", record.db_user.clone()));
    rows.push(("DB Password", record.db_password.clone()));
    rows.push(("E-Mail", record.app_admin_email.clone()));

    match &record.site_ssl {
        Some(ssl) => {
            rows.push(("SSL", format!("Enabled ({})", ssl)));
            rows.push((
                "SSL Wildcard",
                if record.site_ssl_wildcard { "Yes" } else { "No" }.to_string(),
            ));
        }
        None => rows.push(("SSL", "Not Enabled".to_string())),
    }

    let enabled = |on: bool| if on { "Enabled" } else { "None" }.to_string();
    rows.push(("Cache", enabled(record.cache_app_object)));
    rows.push(("Proxy Cache", enabled(record.proxy_cache)));
    if let Some(repo) = &record.vip_repo_url {
        rows.push(("VIP Repo", repo.clone()));
    }
    rows
}

/// 操作可能なサービス
pub fn allowed_services(record: &SiteRecord, op: ServiceOp) -> Vec<&'static str> {
    let mut services = vec!["nginx", PHP_SERVICE];
    if op == ServiceOp::Restart && record.local_db() {
        services.push("db");
    }
    services
}

/// 指定されたサービスを検証（未指定なら操作可能な全サービス）
pub fn select_services(
    record: &SiteRecord,
    requested: &[String],
    op: ServiceOp,
) -> Result<Vec<&'static str>> {
    let allowed = allowed_services(record, op);
    if requested.is_empty() {
        return Ok(allowed);
    }

    requested
        .iter()
        .map(|service| {
            allowed
                .iter()
                .copied()
                .find(|a| *a == service.as_str())
                .ok_or_else(|| {
                    ProvisionError::from(SiteError::UnknownService {
                        service: service.clone(),
                        allowed: allowed.join(", "),
                    })
                })
        })
        .collect()
}

/// 設定を再読み込みするコマンド
fn reload_command(service: &str) -> ServiceCommand {
    match service {
        "nginx" => ServiceCommand::shell("nginx", "nginx -t && nginx -s reload", Vec::<String>::new()),
        _ => ServiceCommand::new(service, ["kill", "-USR2", "1"]),
    }
}

#[instrument(skip(driver, store))]
pub async fn restart(
    driver: &dyn ContainerDriver,
    store: &dyn SiteStore,
    url: &str,
    requested: &[String],
) -> Result<Vec<&'static str>> {
    let record = find_site(store, url).await?;
    let services = select_services(&record, requested, ServiceOp::Restart)?;
    info!(services = ?services, "Restarting services");
    driver
        .restart(&services, &record.site_fs_path)
        .await
        .map_err(ProvisionError::ContainerExec)?;
    Ok(services)
}

#[instrument(skip(driver, store))]
pub async fn reload(
    driver: &dyn ContainerDriver,
    store: &dyn SiteStore,
    url: &str,
    requested: &[String],
) -> Result<Vec<&'static str>> {
    let record = find_site(store, url).await?;
    let services = select_services(&record, requested, ServiceOp::Reload)?;
    for service in &services {
        info!(service, "Reloading service");
        let command = reload_command(service);
        driver
            .exec(&command, &record.site_fs_path)
            .await
            .and_then(|output| output.into_result(command.display_args()))
            .map_err(ProvisionError::ContainerExec)?;
    }
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteflow_core::{CreateOptions, SiteDefaults};

    fn record(options: CreateOptions, installed: bool) -> SiteRecord {
        let config = options.into_config(&SiteDefaults::default()).unwrap();
        SiteRecord::from_config(&config, installed)
    }

    #[test]
    fn test_info_rows_order() {
        let record = record(
            CreateOptions {
                local_db: true,
                alias_domains: Some("www.demo.test".to_string()),
                ..CreateOptions::for_url("demo.test")
            },
            true,
        );
        let labels: Vec<&str> = info_rows(&record).iter().map(|(k, _)| *k).collect();
        assert_eq!(
            labels,
            vec![
                "Site",
                "Site Root",
                "Site Title",
                "WordPress Username",
                "WordPress Password",
                "Alias Domains",
                "DB Host",
                "DB Root Password",
                "DB Name",
                "DB User",
                "DB Password",
                "E-Mail",
                "SSL",
                "Cache",
                "Proxy Cache",
            ]
        );
        let rows = info_rows(&record);
        assert_eq!(rows[5].1, "www.demo.test");
    }

    #[test]
    fn test_info_rows_show_vip_repo() {
        let mut record = record(CreateOptions::for_url("demo.test"), true);
        assert!(info_rows(&record).iter().all(|(k, _)| *k != "VIP Repo"));

        record.vip_repo_url = Some("https://github.com/example/vip-site.git".to_string());
        let rows = info_rows(&record);
        assert_eq!(
            rows.last(),
            Some(&("VIP Repo", "https://github.com/example/vip-site.git".to_string()))
        );
    }

    #[test]
    fn test_info_rows_without_install() {
        let record = record(CreateOptions::for_url("demo.test"), false);
        let rows = info_rows(&record);
        assert!(rows.iter().all(|(k, _)| *k != "WordPress Password"));
        assert!(rows.iter().all(|(k, _)| *k != "DB Root Password"));
        assert!(rows.contains(&("Alias Domains", "None".to_string())));
    }

    #[test]
    fn test_db_restart_only_for_local_db() {
        let shared = record(CreateOptions::for_url("demo.test"), true);
        let requested = vec!["db".to_string()];
        assert!(select_services(&shared, &requested, ServiceOp::Restart).is_err());

        let local = record(
            CreateOptions {
                local_db: true,
                ..CreateOptions::for_url("demo.test")
            },
            true,
        );
        assert_eq!(
            select_services(&local, &requested, ServiceOp::Restart).unwrap(),
            vec!["db"]
        );
        assert!(select_services(&local, &requested, ServiceOp::Reload).is_err());
        assert_eq!(
            select_services(&local, &[], ServiceOp::Reload).unwrap(),
            vec!["nginx", "php"]
        );
    }

    #[test]
    fn test_reload_commands() {
        assert_eq!(reload_command("php").args, vec!["kill", "-USR2", "1"]);
        assert!(reload_command("nginx").display_args().contains("nginx -s reload"));
    }
}
