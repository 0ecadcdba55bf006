mod common;

use common::{Faults, Harness};
use noop::{NoopCerts, NoopDb, NoopDriver, NoopGlobals};
use siteflow::lifecycle;
use siteflow::{CleanupReport, DbRollback, Footprint, ProvisionError};
use siteflow_core::{CreateOptions, ProvisioningLevel, SiteError, SiteRecord};
use siteflow_store::{SiteStore, StoreError};

fn local_db(url: &str) -> CreateOptions {
    CreateOptions {
        local_db: true,
        ..CreateOptions::for_url(url)
    }
}

#[tokio::test]
async fn test_create_local_db_site() {
    let harness = Harness::new();

    let record = harness.create(local_db("demo.test")).await.unwrap();

    assert!(record.installed);
    assert!(record.local_db());
    assert_eq!(record.site_url, "demo.test");

    let root = harness.site_root("demo.test");
    assert!(root.join("docker-compose.yml").is_file());
    assert!(root.join("config/nginx/conf.d/main.conf").is_file());

    let containers = harness.containers();
    for service in ["nginx", "php", "postfix"] {
        assert!(containers.contains(&format!("demo.test_{}", service)));
    }
    assert!(harness.executed("demo.test [php] wp core download"));
    assert!(harness.executed("wp config create"));
    assert!(harness.executed("demo.test [php] wp core install --url=demo.test"));
    assert!(harness.executed("postconf -e myhostname=demo.test"));
    // 秘匿値はログに残らない
    assert!(!harness.executed(&record.app_admin_password));

    assert!(harness.hosts().contains("127.0.0.1\tdemo.test"));
    assert_eq!(harness.record("demo.test").await, Some(record));

    // 保存後に cron ジョブが反映される
    assert!(harness.cron_table().contains("[job-exec \"demo.test-0\"]"));
    assert_eq!(harness.world.lock().unwrap().cron_reloads, 1);
}

#[tokio::test]
async fn test_duplicate_site_is_rejected_without_side_effects() {
    let harness = Harness::new();
    harness.create(local_db("demo.test")).await.unwrap();
    let executed = harness.world.lock().unwrap().exec_log.len();

    let err = harness.create(local_db("demo.test")).await.unwrap_err();

    assert!(err.is_validation());
    assert!(matches!(
        err,
        ProvisionError::Validation(SiteError::SiteAlreadyExists(ref url)) if url == "demo.test"
    ));
    assert_eq!(harness.world.lock().unwrap().exec_log.len(), executed);
    assert!(harness.site_root("demo.test").exists());
    assert!(harness.record("demo.test").await.is_some());
}

#[tokio::test]
async fn test_alias_in_use_is_rejected() {
    let harness = Harness::new();
    harness
        .create(CreateOptions {
            alias_domains: Some("www.demo.test".to_string()),
            ..local_db("demo.test")
        })
        .await
        .unwrap();

    let err = harness
        .create(CreateOptions {
            alias_domains: Some("www.demo.test".to_string()),
            ..local_db("other.test")
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::Validation(SiteError::AliasInUse { ref site, .. }) if site == "demo.test"
    ));
    assert!(!harness.site_root("other.test").exists());
}

#[tokio::test]
async fn test_unreachable_remote_db_rolls_back_root_only() {
    let harness = Harness::new();

    let err = harness
        .create(CreateOptions {
            dbhost: Some("badhost".to_string()),
            dbuser: Some("wp".to_string()),
            dbpass: Some("secret".to_string()),
            ..CreateOptions::for_url("demo.test")
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::DbConnection { ref host, .. } if host == "badhost:3306"));
    assert!(!harness.site_root("demo.test").exists());
    assert!(harness.containers().is_empty());
    assert!(harness.world.lock().unwrap().exec_log.is_empty());
    assert!(harness.record("demo.test").await.is_none());
}

#[tokio::test]
async fn test_remote_schema_is_dropped_on_failure() {
    let harness = Harness::with_faults(Faults {
        fail_on: Some("wp core download".to_string()),
        ..Faults::default()
    });

    let err = harness
        .create(CreateOptions {
            dbhost: Some("db.internal:3307".to_string()),
            dbuser: Some("wp".to_string()),
            dbpass: Some("secret".to_string()),
            ..CreateOptions::for_url("demo.test")
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::ContainerExec(_)));
    assert!(harness.world.lock().unwrap().remote_schemas.is_empty());
    assert!(!harness.site_root("demo.test").exists());
}

#[tokio::test]
async fn test_failure_removes_exactly_this_site() {
    let harness = Harness::with_faults(Faults {
        fail_on: Some("demo.test [php] wp core install".to_string()),
        ..Faults::default()
    });
    harness
        .create(CreateOptions::for_url("other.test"))
        .await
        .unwrap();
    let before = harness.containers();

    let err = harness
        .create(CreateOptions::for_url("demo.test"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::InstallFailure(_)));
    assert!(!err.is_validation());

    // 失敗したサイトのリソースだけが消えている
    assert_eq!(harness.containers(), before);
    assert!(!harness.site_root("demo.test").exists());
    assert!(!harness.hosts().contains("demo.test"));
    assert!(harness.record("demo.test").await.is_none());

    let world = harness.world.lock().unwrap();
    assert!(!world.db_users.contains("demo_test"));
    assert!(world.db_users.contains("other_test"));
    drop(world);

    assert!(harness.site_root("other.test").exists());
    assert!(harness.hosts().contains("other.test"));
    assert!(harness.record("other.test").await.is_some());
}

#[tokio::test]
async fn test_unreachable_site_is_rolled_back() {
    let harness = Harness::with(Faults::default(), Some(502));

    let err = harness.create(local_db("demo.test")).await.unwrap_err();

    assert!(matches!(err, ProvisionError::SiteUnreachable { attempts: 2, .. }));
    assert!(!harness.executed("wp core install"));
    assert!(harness.containers().is_empty());
    assert!(!harness.site_root("demo.test").exists());
    assert!(!harness.hosts().contains("demo.test"));
}

#[tokio::test]
async fn test_signal_interrupts_and_cleans_up() {
    let harness = Harness::with_faults(Faults {
        cancel_on: Some("wp core download".to_string()),
        ..Faults::default()
    });

    let err = harness.create(local_db("demo.test")).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Interrupted));
    assert!(harness.cancel.is_cancelled());
    assert!(harness.containers().is_empty());
    assert!(!harness.site_root("demo.test").exists());
    assert!(harness.record("demo.test").await.is_none());
}

#[tokio::test]
async fn test_panic_in_step_is_fatal_and_cleans_up() {
    let harness = Harness::with_faults(Faults {
        panic_on: Some("wp config create".to_string()),
        ..Faults::default()
    });

    let err = harness.create(local_db("demo.test")).await.unwrap_err();

    match err {
        ProvisionError::Fatal { message, .. } => assert!(message.contains("injected panic")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(harness.containers().is_empty());
    assert!(!harness.site_root("demo.test").exists());
}

#[tokio::test]
async fn test_skip_install_records_uninstalled_site() {
    let harness = Harness::new();

    let record = harness
        .create(CreateOptions {
            skip_install: true,
            ..local_db("demo.test")
        })
        .await
        .unwrap();

    assert!(!record.installed);
    assert!(harness.executed("wp core download"));
    assert!(!harness.executed("wp core install"));
    assert!(!harness.hosts().contains("demo.test"));
}

#[tokio::test]
async fn test_top_level_cleanup_removes_proxy_side_files() {
    let harness = Harness::with_faults(Faults {
        fail_on: Some("demo.test [php] chown".to_string()),
        ..Faults::default()
    });

    // chown は失敗しても続行する
    let record = harness
        .create(CreateOptions {
            ssl: Some("self".to_string()),
            proxy_cache: Some("on".to_string()),
            ..local_db("demo.test")
        })
        .await
        .unwrap();
    assert_eq!(record.site_ssl.as_deref(), Some("self"));
    assert!(record.proxy_cache);
    assert!(harness.world.lock().unwrap().certs.contains("demo.test"));
    assert!(harness.executed("wp redis enable"));

    let conf = harness.dir.path().join("proxy/conf.d/demo.test-proxy-cache.conf");
    assert!(conf.is_file());

    // 作成済みのサイトを最上位レベルで取り消す
    let cleanup = siteflow::Cleanup::new(
        std::sync::Arc::new(NoopDriver),
        std::sync::Arc::new(NoopGlobals),
        std::sync::Arc::new(NoopDb),
        std::sync::Arc::new(NoopCerts),
        siteflow::hosts::HostsFile::new(harness.dir.path().join("hosts")),
        siteflow::cache::ProxyCacheFiles::new(
            harness.dir.path().join("proxy/conf.d"),
            harness.dir.path().join("proxy/vhost.d"),
        ),
    );
    let footprint = Footprint {
        hosts_entry: true,
        proxy_files: vec![
            conf.clone(),
            harness.dir.path().join("proxy/vhost.d/demo.test_location"),
        ],
        certificate: true,
    };
    let report = cleanup
        .cleanup(
            ProvisioningLevel::StatusChecked,
            "demo.test",
            &harness.site_root("demo.test"),
            None,
            &footprint,
        )
        .await;
    assert!(report.failures.is_empty());
    assert!(report.removed_root);
    assert!(report.hosts_entry);
    assert_eq!(report.proxy_files.len(), 2);
    assert!(!conf.exists());
}

#[tokio::test]
async fn test_reload_after_create() {
    let harness = Harness::new();
    harness.create(local_db("demo.test")).await.unwrap();

    let driver = NoopDriver;
    let reloaded = lifecycle::reload(&driver, harness.store.as_ref(), "demo.test", &[])
        .await
        .unwrap();
    assert_eq!(reloaded, vec!["nginx", "php"]);

    let restarted = lifecycle::restart(
        &driver,
        harness.store.as_ref(),
        "demo.test",
        &["db".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(restarted, vec!["db"]);

    let missing = lifecycle::restart(&driver, harness.store.as_ref(), "missing.test", &[]).await;
    assert!(matches!(missing, Err(ProvisionError::Store(_))));
}

#[tokio::test]
async fn test_rollback_keeps_existing_hosts_entry() {
    let harness = Harness::with_faults(Faults {
        fail_on: Some("wp core download".to_string()),
        ..Faults::default()
    });
    let hosts = "127.0.0.1\tlocalhost\n127.0.0.1\tdemo.test\n";
    std::fs::write(harness.dir.path().join("hosts"), hosts).unwrap();

    let err = harness.create(local_db("demo.test")).await.unwrap_err();

    assert!(matches!(err, ProvisionError::ContainerExec(_)));
    assert!(!harness.site_root("demo.test").exists());
    assert_eq!(harness.hosts(), hosts);
    assert_eq!(harness.world.lock().unwrap().proxy_reloads, 0);
}

#[tokio::test]
async fn test_rollback_keeps_entry_that_was_already_there_after_install() {
    let harness = Harness::with_faults(Faults {
        fail_on: Some("demo.test [php] wp core install".to_string()),
        ..Faults::default()
    });
    let hosts = "127.0.0.1\tdemo.test\n";
    std::fs::write(harness.dir.path().join("hosts"), hosts).unwrap();

    let err = harness.create(local_db("demo.test")).await.unwrap_err();

    assert!(matches!(err, ProvisionError::InstallFailure(_)));
    assert_eq!(harness.hosts(), hosts);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let harness = Harness::with_faults(Faults {
        fail_on: Some("demo.test [php] wp core install".to_string()),
        ..Faults::default()
    });
    harness
        .create(CreateOptions::for_url("demo.test"))
        .await
        .unwrap_err();
    let reloads = harness.world.lock().unwrap().proxy_reloads;

    // 失敗時の後始末をもう一度実行しても何も起きない
    let db = DbRollback::SharedUser {
        user: "demo_test".to_string(),
        schema: "demo_test".to_string(),
    };
    let footprint = Footprint {
        hosts_entry: true,
        ..Footprint::default()
    };
    let report = harness
        .cleanup()
        .cleanup(
            ProvisioningLevel::StatusChecked,
            "demo.test",
            &harness.site_root("demo.test"),
            Some(&db),
            &footprint,
        )
        .await;
    assert!(report.failures.is_empty());
    assert!(!report.removed_root);
    assert!(!report.hosts_entry);
    assert!(report.resources.containers.is_empty());
    assert_eq!(harness.world.lock().unwrap().proxy_reloads, reloads);

    // レベル0では何もしない
    let report = harness
        .cleanup()
        .cleanup(
            ProvisioningLevel::Nothing,
            "demo.test",
            &harness.site_root("demo.test"),
            None,
            &Footprint::default(),
        )
        .await;
    assert_eq!(report, CleanupReport::default());
}

#[tokio::test]
async fn test_losing_create_race_rolls_back_and_keeps_winner() {
    let harness = Harness::with_faults(Faults {
        stale_reads: true,
        ..Faults::default()
    });

    // 先に保存された同じ URL のサイト
    let mut winner = SiteRecord::from_config(&harness.config(local_db("demo.test")), true);
    winner.site_title = "winner".to_string();
    harness.store.create(&winner).await.unwrap();
    harness.world.lock().unwrap().certs.insert("demo.test".to_string());
    std::fs::write(harness.dir.path().join("hosts"), "127.0.0.1\tdemo.test\n").unwrap();

    let err = harness
        .create(CreateOptions {
            ssl: Some("self".to_string()),
            ..local_db("demo.test")
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::Store(StoreError::SiteExists(ref url)) if url == "demo.test"
    ));
    assert!(!harness.site_root("demo.test").exists());
    assert!(harness.containers().is_empty());

    let sites = harness.store.list().await.unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].site_title, "winner");
    // この実行で作っていないものは残る
    assert!(harness.world.lock().unwrap().certs.contains("demo.test"));
    assert!(harness.hosts().contains("127.0.0.1\tdemo.test"));
    assert_eq!(harness.world.lock().unwrap().cron_reloads, 0);
}

#[tokio::test]
async fn test_materialize_failure_drops_shared_db_user() {
    let harness = Harness::new();
    // compose ファイルの位置にディレクトリがあると書き込めない
    std::fs::create_dir_all(harness.site_root("demo.test").join("docker-compose.yml")).unwrap();

    let err = harness
        .create(CreateOptions::for_url("demo.test"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::ConfigWrite { .. }));
    assert!(!harness.site_root("demo.test").exists());
    let world = harness.world.lock().unwrap();
    assert!(world.db_users.is_empty());
    assert!(world.exec_log.is_empty());
    assert!(world.containers.is_empty());
}

mod noop {
    use async_trait::async_trait;
    use siteflow::remote_db::DbClient;
    use siteflow::ssl::CertIssuer;
    use siteflow_container::{
        ContainerDriver, DbGrant, ExecOutput, GlobalResources, GlobalService, OneShot,
        RemovalReport, ServiceCommand,
    };
    use siteflow_core::{DbCredentials, SiteConfig};
    use std::path::{Path, PathBuf};

    type R<T> = siteflow_container::Result<T>;

    pub struct NoopDriver;

    #[async_trait]
    impl ContainerDriver for NoopDriver {
        async fn start(&self, _: &[&str], _: &Path) -> R<()> {
            Ok(())
        }
        async fn stop(&self, _: &[&str], _: &Path) -> R<()> {
            Ok(())
        }
        async fn restart(&self, _: &[&str], _: &Path) -> R<()> {
            Ok(())
        }
        async fn exec(&self, _: &ServiceCommand, _: &Path) -> R<ExecOutput> {
            Ok(ExecOutput::default())
        }
        async fn remove_by_label(&self, _: &str) -> R<RemovalReport> {
            Ok(RemovalReport::default())
        }
        async fn run_once(&self, _: &OneShot) -> R<ExecOutput> {
            Ok(ExecOutput::default())
        }
    }

    pub struct NoopGlobals;

    #[async_trait]
    impl GlobalResources for NoopGlobals {
        async fn ensure(&self, _: GlobalService) -> R<()> {
            Ok(())
        }
        async fn create_db_user(&self, _: &DbGrant) -> R<()> {
            Ok(())
        }
        async fn drop_db_user(&self, _: &str, _: &str) -> R<()> {
            Ok(())
        }
        async fn reload_proxy(&self) -> R<()> {
            Ok(())
        }
        async fn reload_cron(&self) -> R<()> {
            Ok(())
        }
    }

    pub struct NoopDb;

    #[async_trait]
    impl DbClient for NoopDb {
        async fn resolve_host(&self, host: &str) -> R<String> {
            Ok(host.to_string())
        }
        async fn ping(&self, _: &DbCredentials) -> R<()> {
            Ok(())
        }
        async fn schema_exists(&self, _: &DbCredentials) -> R<bool> {
            Ok(false)
        }
        async fn table_count(&self, _: &DbCredentials) -> R<u64> {
            Ok(0)
        }
        async fn create_schema(&self, _: &DbCredentials) -> R<()> {
            Ok(())
        }
        async fn drop_schema(&self, _: &DbCredentials) -> R<()> {
            Ok(())
        }
    }

    pub struct NoopCerts;

    #[async_trait]
    impl CertIssuer for NoopCerts {
        async fn issue(&self, _: &SiteConfig) -> siteflow::Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }
        async fn remove(&self, _: &str) -> siteflow::Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }
}
