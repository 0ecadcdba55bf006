use colored::Colorize;
use siteflow::cache::ProxyCacheFiles;
use siteflow::materialize::HostUser;
use siteflow::remote_db::ContainerDbClient;
use siteflow::ssl::{CertDirs, ProxyCertIssuer};
use siteflow::status::HttpProbe;
use siteflow::{Collaborators, ProvisionSettings, Provisioner};
use siteflow_config::GlobalConfig;
use siteflow_container::{ComposeDriver, ContainerDriver, DockerGlobalResources};
use siteflow_core::TemplateRenderer;
use siteflow_store::{JsonSiteStore, SiteStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// コマンド共通の実行環境
pub struct AppContext {
    pub config: GlobalConfig,
    pub store: Arc<dyn SiteStore>,
}

impl AppContext {
    pub fn load() -> anyhow::Result<Self> {
        let config = GlobalConfig::load()?;
        let store = Arc::new(JsonSiteStore::new(&config.data_dir));
        Ok(Self { config, store })
    }

    /// Docker に接続（失敗時は対処方法を表示）
    pub async fn connect_driver(&self) -> anyhow::Result<Arc<ComposeDriver>> {
        match ComposeDriver::connect().await {
            Ok(driver) => Ok(Arc::new(driver)),
            Err(e) => {
                eprintln!();
                eprintln!("{}", "✗ Docker接続エラー".red().bold());
                eprintln!();
                eprintln!("{}", "原因:".yellow());
                eprintln!("  {}", e);
                eprintln!();
                eprintln!("{}", "解決方法:".yellow());
                eprintln!("  • Dockerが起動しているか確認してください");
                eprintln!("  • docker compose プラグインがインストールされているか確認してください");
                Err(anyhow::anyhow!("Docker接続に失敗しました"))
            }
        }
    }

    pub async fn provisioner(&self, cancel: CancellationToken) -> anyhow::Result<Provisioner> {
        let compose = self.connect_driver().await?;
        let docker = compose.docker().clone();
        let driver: Arc<dyn ContainerDriver> = compose;
        let config = &self.config;

        let globals = Arc::new(DockerGlobalResources::new(
            docker,
            driver.clone(),
            &config.services_dir,
            config.global_names(),
        ));
        let db_client = Arc::new(ContainerDbClient::new(
            driver.clone(),
            &config.images.db_client,
            &config.images.toolbox,
            &config.networks.backend,
        ));
        let certs = Arc::new(ProxyCertIssuer::new(
            driver.clone(),
            CertDirs {
                certs: config.certs_dir.clone(),
                vhost: config.vhost_dir.clone(),
                acme: config.data_dir.join("acme"),
                challenge: config.data_dir.join("acme-challenge"),
            },
            &config.images.acme,
            config.acme_email.clone(),
        ));

        let deps = Collaborators {
            driver,
            globals,
            store: self.store.clone(),
            db_client,
            probe: Arc::new(HttpProbe::default()),
            certs,
        };
        let settings = ProvisionSettings {
            topology: config.topology(),
            owner: HostUser::current(),
            hosts_file: config.hosts_file.clone(),
            proxy_cache: ProxyCacheFiles::new(&config.proxy_conf_dir, &config.vhost_dir),
            cron_file: config.cron_file(),
            db_health: config.db_health,
            status_check: config.status_check,
        };
        let renderer = Arc::new(TemplateRenderer::new()?);

        Ok(Provisioner::new(deps, settings, renderer, cancel))
    }
}
