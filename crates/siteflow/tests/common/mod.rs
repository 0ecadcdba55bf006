//! プロビジョニングのテスト用フェイク
//!
//! 各フェイクは共有の `World` に作成したリソースを記録します。

#![allow(dead_code)]

use async_trait::async_trait;
use siteflow::cache::ProxyCacheFiles;
use siteflow::materialize::HostUser;
use siteflow::remote_db::DbClient;
use siteflow::ssl::CertIssuer;
use siteflow::status::SiteProbe;
use siteflow::hosts::HostsFile;
use siteflow::{Cleanup, Collaborators, ProvisionSettings, Provisioner};
use siteflow_container::{
    ContainerDriver, ContainerError, DbGrant, ExecOutput, GlobalResources, GlobalService, OneShot,
    RemovalReport, ServiceCommand, WaitConfig,
};
use siteflow_core::{
    CreateOptions, DbCredentials, SiteConfig, SiteDefaults, SiteRecord, TemplateRenderer, Topology,
};
use siteflow_store::{JsonSiteStore, SiteStore};
use siteflow_store::Result as StoreResult;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// フェイクが作成したリソース
#[derive(Debug, Default)]
pub struct World {
    pub containers: BTreeSet<String>,
    pub networks: BTreeSet<String>,
    pub db_users: BTreeSet<String>,
    pub remote_schemas: BTreeSet<String>,
    pub certs: BTreeSet<String>,
    pub ensured: Vec<GlobalService>,
    pub exec_log: Vec<String>,
    pub proxy_reloads: u32,
    pub cron_reloads: u32,
}

pub type SharedWorld = Arc<Mutex<World>>;

/// コマンドに文字列が含まれたときに起こす障害
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub fail_on: Option<String>,
    pub panic_on: Option<String>,
    pub cancel_on: Option<String>,
    /// 重複チェックに既存サイトが見えない（同時実行で先を越された状態）
    pub stale_reads: bool,
}

fn site_of(workdir: &Path) -> String {
    workdir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct FakeDriver {
    world: SharedWorld,
    faults: Faults,
    cancel: CancellationToken,
}

#[async_trait]
impl ContainerDriver for FakeDriver {
    async fn start(&self, services: &[&str], workdir: &Path) -> siteflow_container::Result<()> {
        let site = site_of(workdir);
        let mut world = self.world.lock().unwrap();
        world.networks.insert(format!("{}_default", site));
        for service in services {
            world.containers.insert(format!("{}_{}", site, service));
        }
        // nginx は php に依存して起動する
        if services.contains(&"nginx") {
            world.containers.insert(format!("{}_php", site));
        }
        Ok(())
    }

    async fn stop(&self, _services: &[&str], _workdir: &Path) -> siteflow_container::Result<()> {
        Ok(())
    }

    async fn restart(&self, _services: &[&str], _workdir: &Path) -> siteflow_container::Result<()> {
        Ok(())
    }

    async fn exec(
        &self,
        command: &ServiceCommand,
        workdir: &Path,
    ) -> siteflow_container::Result<ExecOutput> {
        let line = format!("{} {}", site_of(workdir), command);
        self.world.lock().unwrap().exec_log.push(line.clone());

        if self.faults.panic_on.as_deref().is_some_and(|p| line.contains(p)) {
            panic!("injected panic");
        }
        if self.faults.cancel_on.as_deref().is_some_and(|p| line.contains(p)) {
            self.cancel.cancel();
            std::future::pending::<()>().await;
        }
        if self.faults.fail_on.as_deref().is_some_and(|p| line.contains(p)) {
            return Ok(ExecOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(ExecOutput::default())
    }

    async fn remove_by_label(&self, site_url: &str) -> siteflow_container::Result<RemovalReport> {
        let prefix = format!("{}_", site_url);
        let mut world = self.world.lock().unwrap();
        let containers: Vec<String> = world
            .containers
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .cloned()
            .collect();
        let networks: Vec<String> = world
            .networks
            .iter()
            .filter(|n| n.starts_with(&prefix))
            .cloned()
            .collect();
        world.containers.retain(|c| !c.starts_with(&prefix));
        world.networks.retain(|n| !n.starts_with(&prefix));
        Ok(RemovalReport {
            containers,
            volumes: Vec::new(),
            networks,
            failures: Vec::new(),
        })
    }

    async fn run_once(&self, _probe: &OneShot) -> siteflow_container::Result<ExecOutput> {
        Ok(ExecOutput::default())
    }
}

pub struct FakeGlobals {
    world: SharedWorld,
}

#[async_trait]
impl GlobalResources for FakeGlobals {
    async fn ensure(&self, service: GlobalService) -> siteflow_container::Result<()> {
        self.world.lock().unwrap().ensured.push(service);
        Ok(())
    }

    async fn create_db_user(&self, grant: &DbGrant) -> siteflow_container::Result<()> {
        self.world.lock().unwrap().db_users.insert(grant.schema.clone());
        Ok(())
    }

    async fn drop_db_user(&self, _user: &str, schema: &str) -> siteflow_container::Result<()> {
        self.world.lock().unwrap().db_users.remove(schema);
        Ok(())
    }

    async fn reload_proxy(&self) -> siteflow_container::Result<()> {
        self.world.lock().unwrap().proxy_reloads += 1;
        Ok(())
    }

    async fn reload_cron(&self) -> siteflow_container::Result<()> {
        self.world.lock().unwrap().cron_reloads += 1;
        Ok(())
    }
}

/// 重複チェックの読み取りだけ空を返すストア
pub struct StaleStore {
    inner: Arc<JsonSiteStore>,
}

#[async_trait]
impl SiteStore for StaleStore {
    async fn find(&self, _url: &str) -> StoreResult<Option<SiteRecord>> {
        Ok(None)
    }

    async fn create(&self, record: &SiteRecord) -> StoreResult<String> {
        self.inner.create(record).await
    }

    async fn list(&self) -> StoreResult<Vec<SiteRecord>> {
        self.inner.list().await
    }

    async fn delete(&self, url: &str) -> StoreResult<()> {
        self.inner.delete(url).await
    }

    async fn alias_owner(&self, _domain: &str, _exclude: &str) -> StoreResult<Option<String>> {
        Ok(None)
    }
}

/// `badhost` にだけ接続できないリモートDB
pub struct FakeDb {
    world: SharedWorld,
}

#[async_trait]
impl DbClient for FakeDb {
    async fn resolve_host(&self, host: &str) -> siteflow_container::Result<String> {
        Ok(host.to_string())
    }

    async fn ping(&self, db: &DbCredentials) -> siteflow_container::Result<()> {
        if db.host == "badhost" {
            return Err(ContainerError::CommandFailed {
                command: format!("mysql -h {}", db.host),
                exit_code: 1,
                stderr: "Unknown MySQL server host 'badhost'".to_string(),
            });
        }
        Ok(())
    }

    async fn schema_exists(&self, db: &DbCredentials) -> siteflow_container::Result<bool> {
        Ok(self.world.lock().unwrap().remote_schemas.contains(&db.name))
    }

    async fn table_count(&self, _db: &DbCredentials) -> siteflow_container::Result<u64> {
        Ok(0)
    }

    async fn create_schema(&self, db: &DbCredentials) -> siteflow_container::Result<()> {
        self.world.lock().unwrap().remote_schemas.insert(db.name.clone());
        Ok(())
    }

    async fn drop_schema(&self, db: &DbCredentials) -> siteflow_container::Result<()> {
        self.world.lock().unwrap().remote_schemas.remove(&db.name);
        Ok(())
    }
}

pub struct FakeProbe {
    pub status: Option<u16>,
}

#[async_trait]
impl SiteProbe for FakeProbe {
    async fn probe(&self, _url: &str) -> Option<u16> {
        self.status
    }
}

pub struct FakeCerts {
    world: SharedWorld,
}

#[async_trait]
impl CertIssuer for FakeCerts {
    async fn issue(&self, config: &SiteConfig) -> siteflow::Result<Vec<PathBuf>> {
        // 既存の証明書はそのまま使う
        if self.world.lock().unwrap().certs.insert(config.url.clone()) {
            Ok(vec![PathBuf::from(format!("{}.crt", config.url))])
        } else {
            Ok(Vec::new())
        }
    }

    async fn remove(&self, url: &str) -> siteflow::Result<Vec<PathBuf>> {
        if self.world.lock().unwrap().certs.remove(url) {
            Ok(vec![PathBuf::from(format!("{}.crt", url))])
        } else {
            Ok(Vec::new())
        }
    }
}

/// フェイク一式とプロビジョナー
pub struct Harness {
    pub dir: TempDir,
    pub world: SharedWorld,
    pub store: Arc<JsonSiteStore>,
    pub cancel: CancellationToken,
    pub provisioner: Provisioner,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Faults::default(), Some(302))
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self::with(faults, Some(302))
    }

    pub fn with(faults: Faults, probe_status: Option<u16>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let world = SharedWorld::default();
        let cancel = CancellationToken::new();
        let store = Arc::new(JsonSiteStore::new(dir.path().join("data")));
        let store_dep: Arc<dyn SiteStore> = if faults.stale_reads {
            Arc::new(StaleStore {
                inner: store.clone(),
            })
        } else {
            store.clone()
        };

        let deps = Collaborators {
            driver: Arc::new(FakeDriver {
                world: world.clone(),
                faults,
                cancel: cancel.clone(),
            }),
            globals: Arc::new(FakeGlobals {
                world: world.clone(),
            }),
            store: store_dep,
            db_client: Arc::new(FakeDb {
                world: world.clone(),
            }),
            probe: Arc::new(FakeProbe {
                status: probe_status,
            }),
            certs: Arc::new(FakeCerts {
                world: world.clone(),
            }),
        };
        let settings = ProvisionSettings {
            topology: Topology::default(),
            owner: HostUser { uid: 1000, gid: 1000 },
            hosts_file: dir.path().join("hosts"),
            proxy_cache: ProxyCacheFiles::new(
                dir.path().join("proxy/conf.d"),
                dir.path().join("proxy/vhost.d"),
            ),
            cron_file: dir.path().join("services/cron/config.ini"),
            db_health: WaitConfig::fixed(2, 1),
            status_check: WaitConfig::fixed(2, 1),
        };
        let renderer = Arc::new(TemplateRenderer::new().unwrap());
        let provisioner = Provisioner::new(deps, settings, renderer, cancel.clone());

        Self {
            dir,
            world,
            store,
            cancel,
            provisioner,
        }
    }

    /// 同じ World を共有する後始末
    pub fn cleanup(&self) -> Cleanup {
        Cleanup::new(
            Arc::new(FakeDriver {
                world: self.world.clone(),
                faults: Faults::default(),
                cancel: self.cancel.clone(),
            }),
            Arc::new(FakeGlobals {
                world: self.world.clone(),
            }),
            Arc::new(FakeDb {
                world: self.world.clone(),
            }),
            Arc::new(FakeCerts {
                world: self.world.clone(),
            }),
            HostsFile::new(self.dir.path().join("hosts")),
            ProxyCacheFiles::new(
                self.dir.path().join("proxy/conf.d"),
                self.dir.path().join("proxy/vhost.d"),
            ),
        )
    }

    pub fn cron_table(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("services/cron/config.ini")).unwrap_or_default()
    }

    pub fn defaults(&self) -> SiteDefaults {
        SiteDefaults {
            webroot: self.dir.path().join("sites"),
            ..SiteDefaults::default()
        }
    }

    pub fn config(&self, options: CreateOptions) -> SiteConfig {
        options.into_config(&self.defaults()).unwrap()
    }

    pub async fn create(&self, options: CreateOptions) -> siteflow::Result<SiteRecord> {
        let config = self.config(options);
        self.provisioner.create(&config).await
    }

    pub fn hosts(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("hosts")).unwrap_or_default()
    }

    pub async fn record(&self, url: &str) -> Option<SiteRecord> {
        self.store.find(url).await.unwrap()
    }

    pub fn site_root(&self, url: &str) -> PathBuf {
        self.dir.path().join("sites").join(url)
    }

    pub fn containers(&self) -> BTreeSet<String> {
        self.world.lock().unwrap().containers.clone()
    }

    pub fn executed(&self, fragment: &str) -> bool {
        self.world
            .lock()
            .unwrap()
            .exec_log
            .iter()
            .any(|line| line.contains(fragment))
    }
}
