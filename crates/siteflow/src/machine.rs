//! サイト作成のステートマシン
//!
//! 各ステップは順番に実行され、到達したプロビジョニングレベルを記録します。
//! どこかで失敗した場合は、そのレベルまでに作成したものだけを取り消します。

use crate::cache::{self, ProxyCacheFiles};
use crate::cron::CronTable;
use crate::error::{ProvisionError, Result};
use crate::fatal;
use crate::hosts::HostsFile;
use crate::layout::SiteLayout;
use crate::materialize::{HostUser, Materializer};
use crate::remote_db::{DbClient, RemoteDbVerifier};
use crate::rollback::{Cleanup, DbRollback, Footprint};
use crate::ssl::{self, CertIssuer};
use crate::status::{SiteProbe, wait_until_reachable};
use crate::vip;
use crate::wordpress;
use futures_util::FutureExt;
use siteflow_container::{
    ContainerDriver, DbGrant, ExecOutput, GlobalResources, GlobalService, ServiceCommand,
    WaitConfig, WaitOutcome, wait_for_service,
};
use siteflow_core::{
    CacheHostMode, ComposeBuilder, DatabaseMode, DbCredentials, ProvisioningLevel, SiteConfig,
    SiteError, SiteRecord, SslMode, TemplateRenderer, Topology, VolumeMountSet,
};
use siteflow_store::SiteStore;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// 外部とやり取りする依存先
pub struct Collaborators {
    pub driver: Arc<dyn ContainerDriver>,
    pub globals: Arc<dyn GlobalResources>,
    pub store: Arc<dyn SiteStore>,
    pub db_client: Arc<dyn DbClient>,
    pub probe: Arc<dyn SiteProbe>,
    pub certs: Arc<dyn CertIssuer>,
}

/// プロビジョニングの設定値
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub topology: Topology,
    pub owner: HostUser,
    pub hosts_file: PathBuf,
    pub proxy_cache: ProxyCacheFiles,
    /// 共有 cron コンテナのジョブ定義
    pub cron_file: PathBuf,
    /// ローカルDBの起動待ち
    pub db_health: WaitConfig,
    /// サイトの到達確認
    pub status_check: WaitConfig,
}

/// 作成途中の進捗（失敗時のロールバック範囲）
#[derive(Debug, Default)]
struct Progress {
    level: ProvisioningLevel,
    db: Option<DbRollback>,
    /// サイトの外に書き込んだもの
    footprint: Footprint,
}

pub struct Provisioner {
    driver: Arc<dyn ContainerDriver>,
    globals: Arc<dyn GlobalResources>,
    store: Arc<dyn SiteStore>,
    verifier: RemoteDbVerifier,
    probe: Arc<dyn SiteProbe>,
    certs: Arc<dyn CertIssuer>,
    renderer: Arc<TemplateRenderer>,
    builder: ComposeBuilder,
    materializer: Materializer,
    hosts: HostsFile,
    proxy_cache: ProxyCacheFiles,
    cron: CronTable,
    cleanup: Cleanup,
    db_health: WaitConfig,
    status_check: WaitConfig,
    cancel: CancellationToken,
}

impl Provisioner {
    pub fn new(
        deps: Collaborators,
        settings: ProvisionSettings,
        renderer: Arc<TemplateRenderer>,
        cancel: CancellationToken,
    ) -> Self {
        let cleanup = Cleanup::new(
            deps.driver.clone(),
            deps.globals.clone(),
            deps.db_client.clone(),
            deps.certs.clone(),
            HostsFile::new(&settings.hosts_file),
            settings.proxy_cache.clone(),
        );
        Self {
            verifier: RemoteDbVerifier::new(deps.db_client),
            driver: deps.driver,
            globals: deps.globals,
            store: deps.store,
            probe: deps.probe,
            certs: deps.certs,
            materializer: Materializer::new(renderer.clone(), settings.owner),
            renderer,
            builder: ComposeBuilder::new(settings.topology),
            hosts: HostsFile::new(&settings.hosts_file),
            proxy_cache: settings.proxy_cache,
            cron: CronTable::new(settings.cron_file),
            cleanup,
            db_health: settings.db_health,
            status_check: settings.status_check,
            cancel,
        }
    }

    /// サイトを作成し、作成したレコードを返す
    ///
    /// 失敗時は到達レベルに応じたクリーンアップを行ってからエラーを返します。
    #[instrument(skip_all, fields(url = %config.url))]
    pub async fn create(&self, config: &SiteConfig) -> Result<SiteRecord> {
        info!("Creating site");
        let vip_repo = self.guard(self.preflight(config)).await?;

        let mut progress = Progress::default();
        match self.provision(config, vip_repo.as_deref(), &mut progress).await {
            Ok(record) => {
                info!("Site created");
                self.sync_cron().await;
                Ok(record)
            }
            Err(err) => {
                error!(error = %err, level = %progress.level, "Site creation failed");
                if progress.level > ProvisioningLevel::Nothing || progress.db.is_some() {
                    warn!("Initiating clean-up");
                    self.cleanup
                        .cleanup(
                            progress.level,
                            &config.url,
                            &config.filesystem_root,
                            progress.db.as_ref(),
                            &progress.footprint,
                        )
                        .await;
                }
                Err(err)
            }
        }
    }

    /// ステップをキャンセルとパニックから保護して実行
    ///
    /// キャンセルが要求されるとステップは中断され `Interrupted` になります。
    async fn guard<T, E, F>(&self, step: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        ProvisionError: From<E>,
    {
        let step = AssertUnwindSafe(step).catch_unwind();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProvisionError::Interrupted),
            outcome = step => match outcome {
                Ok(result) => result.map_err(ProvisionError::from),
                Err(panic) => Err(fatal::from_panic(panic)),
            },
        }
    }

    /// 副作用の前に行う重複チェック
    ///
    /// VIP リポジトリが指定されていれば、アクセス可能なURLを返します。
    async fn preflight(&self, config: &SiteConfig) -> Result<Option<String>> {
        if self.store.find(&config.url).await?.is_some() {
            return Err(SiteError::SiteAlreadyExists(config.url.clone()).into());
        }

        for domain in config.alias_domains.iter() {
            if let Some(site) = self.store.alias_owner(domain, &config.url).await? {
                return Err(SiteError::AliasInUse {
                    domain: domain.to_string(),
                    site,
                }
                .into());
            }
        }

        if config.ssl_mode == SslMode::InheritParent {
            let parent = ssl::parent_domain(&config.url)
                .ok_or_else(|| SiteError::ParentCertMissing(config.url.clone()))?;
            match self.store.find(parent).await? {
                Some(record) if record.site_ssl.is_some() && record.site_ssl_wildcard => {}
                _ => return Err(SiteError::ParentCertMissing(parent.to_string()).into()),
            }
        }

        match &config.vip_repo {
            Some(repo) => Ok(Some(vip::check_repo_access(repo).await?)),
            None => Ok(None),
        }
    }

    async fn provision(
        &self,
        config: &SiteConfig,
        vip_repo: Option<&str>,
        progress: &mut Progress,
    ) -> Result<SiteRecord> {
        let layout = SiteLayout::for_site(config);

        self.guard(layout.create_root()).await?;
        progress.level.advance(ProvisioningLevel::RootCreated);
        info!(root = %layout.root().display(), "Site root created");

        let config = &self.guard(self.prepare_database(config, progress)).await?;
        progress.level.advance(ProvisioningLevel::DbVerified);

        let volumes = layout.volume_mounts(config);
        let spec = self.builder.build_with(config, &volumes, true);
        self.guard(self.materializer.materialize(config, &layout, &spec))
            .await?;
        progress.level.advance(ProvisioningLevel::ConfigMaterialized);

        self.guard(self.start_services(config, &layout)).await?;
        self.guard(self.download_and_configure(config, &layout))
            .await?;

        let installed = !config.skip_install;
        if installed {
            if config.ssl_mode.needs_hosts_entry() {
                progress.footprint.hosts_entry = self.guard(self.hosts.add(&config.url)).await?;
            }
            if !config.skip_status_check {
                progress.level.advance(ProvisioningLevel::StatusChecked);
                self.guard(self.check_status(config)).await?;
            }
            self.guard(self.install(config, &layout)).await?;
            if let Some(repo) = vip_repo {
                let wp_root = layout.wp_root(config.public_dir.as_deref());
                self.guard(vip::setup(&wp_root, repo)).await?;
            }
        }

        if config.ssl_mode.is_enabled() {
            info!(ssl = config.ssl_mode.as_str(), "Configuring SSL");
            let issued = self.guard(self.certs.issue(config)).await?;
            progress.footprint.certificate = !issued.is_empty();
            self.guard(self.enable_https(config, &layout, &volumes))
                .await?;
        }

        if config.cache_enabled {
            self.guard(self.enable_cache(config, &layout, installed))
                .await?;
        }
        if config.proxy_cache.is_some() {
            progress.footprint.proxy_files = self
                .guard(self.proxy_cache.write(config, &self.renderer))
                .await?;
            if !progress.footprint.proxy_files.is_empty() {
                info!(files = progress.footprint.proxy_files.len(), "Proxy cache configured");
                if let Err(e) = self.globals.reload_proxy().await {
                    warn!(error = %e, "Proxy reload failed");
                }
            }
        }

        if installed {
            let content = format!("{}/wp-content", config.container_root());
            self.best_effort(&wordpress::normalize_ownership(&content), &layout)
                .await;
        }

        let mut record = SiteRecord::from_config(config, installed);
        // リポジトリを展開したサイトだけ VIP として記録する
        record.vip_repo_url = vip_repo.filter(|_| installed).map(str::to_string);
        self.guard(self.store.create(&record)).await?;
        Ok(record)
    }

    /// サイトのDBを用意し、実際に使うDBホストを反映した設定を返す
    async fn prepare_database(
        &self,
        config: &SiteConfig,
        progress: &mut Progress,
    ) -> Result<SiteConfig> {
        let mut effective = config.clone();

        match config.database_mode {
            DatabaseMode::Remote => {
                let report = self.verifier.verify_and_prepare(config).await?;
                effective.db = DbCredentials {
                    host: report.host,
                    ..config.db.clone()
                };
                if report.outcome.created_schema() {
                    progress.db = Some(DbRollback::RemoteSchema(effective.db.clone()));
                }
            }
            DatabaseMode::SharedGlobal => {
                self.globals.ensure(GlobalService::Db).await?;
                // 削除は冪等なので作成前に記録しておく
                progress.db = Some(DbRollback::SharedUser {
                    user: config.db.user.clone(),
                    schema: config.db.name.clone(),
                });
                let grant = DbGrant {
                    user: config.db.user.clone(),
                    password: config.db.password.clone(),
                    schema: config.db.name.clone(),
                };
                self.globals
                    .create_db_user(&grant)
                    .await
                    .map_err(|e| ProvisionError::DbCreate {
                        name: grant.schema.clone(),
                        message: e.to_string(),
                    })?;
                info!(schema = %grant.schema, "Database user created on shared DB");
            }
            DatabaseMode::LocalContainer => {
                debug!("Database runs inside the site");
            }
        }

        if config.cache_enabled && config.cache_host_mode == CacheHostMode::SharedGlobal {
            self.globals.ensure(GlobalService::Redis).await?;
        }
        self.globals.ensure(GlobalService::Proxy).await?;

        Ok(effective)
    }

    async fn start_services(&self, config: &SiteConfig, layout: &SiteLayout) -> Result<()> {
        let mut services = vec!["nginx", "postfix"];
        if config.cache_enabled && config.cache_host_mode == CacheHostMode::LocalContainer {
            services.push("redis");
        }
        info!(services = ?services, "Starting site containers");
        self.driver
            .start(&services, layout.root())
            .await
            .map_err(ProvisionError::ContainerExec)?;

        if config.database_mode.is_local() {
            let ping = ServiceCommand::shell(
                "db",
                r#"mysqladmin ping -uroot -p"$MYSQL_ROOT_PASSWORD" --silent"#,
                Vec::<String>::new(),
            );
            if let WaitOutcome::Ready { attempts } =
                wait_for_service(self.driver.as_ref(), &ping, layout.root(), &self.db_health).await
            {
                debug!(attempts, "Local database is ready");
            }
        }

        let hostname = ServiceCommand::new("postfix", ["postconf", "-e"])
            .arg(format!("myhostname={}", config.url));
        self.best_effort(&hostname, layout).await;
        self.best_effort(&wordpress::normalize_ownership("/var/www/htdocs"), layout)
            .await;
        Ok(())
    }

    async fn download_and_configure(&self, config: &SiteConfig, layout: &SiteLayout) -> Result<()> {
        if config.public_dir.is_some() {
            self.exec(&wordpress::make_public_dir(config), layout).await?;
        }
        info!("Downloading WordPress");
        self.exec(&wordpress::core_download(config), layout).await?;
        info!("Configuring WordPress");
        self.exec(&wordpress::config_create(config), layout).await?;
        self.exec(&wordpress::move_wp_config(config), layout).await?;
        Ok(())
    }

    async fn check_status(&self, config: &SiteConfig) -> Result<()> {
        match wait_until_reachable(self.probe.as_ref(), &config.url, &self.status_check).await {
            WaitOutcome::Ready { .. } => Ok(()),
            WaitOutcome::TimedOut { attempts } => Err(ProvisionError::SiteUnreachable {
                url: config.url.clone(),
                attempts,
            }),
        }
    }

    async fn install(&self, config: &SiteConfig, layout: &SiteLayout) -> Result<()> {
        info!(site_type = config.multisite_mode.as_site_type(), "Installing WordPress");
        self.driver
            .exec(&wordpress::core_install(config), layout.root())
            .await
            .and_then(|output| output.into_result("wp core install"))
            .map_err(ProvisionError::InstallFailure)?;
        self.best_effort(&wordpress::rewrite_structure(config), layout)
            .await;
        Ok(())
    }

    /// HTTPS リダイレクトを有効にして nginx を作り直す
    async fn enable_https(
        &self,
        config: &SiteConfig,
        layout: &SiteLayout,
        volumes: &VolumeMountSet,
    ) -> Result<()> {
        let spec = self.builder.build(config, volumes);
        self.materializer.write_compose(layout, &spec).await?;
        self.driver
            .start(&["nginx"], layout.root())
            .await
            .map_err(ProvisionError::ContainerExec)?;
        self.globals.reload_proxy().await?;
        Ok(())
    }

    /// キャッシュプラグインの設定（失敗は警告のみ）
    async fn enable_cache(&self, config: &SiteConfig, layout: &SiteLayout, installed: bool) -> Result<()> {
        if !installed {
            warn!("WordPress is not installed, skipping cache plugins");
            return Ok(());
        }
        info!(host = %config.cache_host, "Configuring object and page cache");
        let commands = cache::object_cache_commands(config)
            .into_iter()
            .chain(cache::page_cache_commands(config));
        for command in commands {
            self.best_effort(&command, layout).await;
        }
        Ok(())
    }

    /// 全サイトの cron ジョブを書き出して cron コンテナに反映
    ///
    /// サイトはすでに保存済みなので、失敗しても警告のみです。
    async fn sync_cron(&self) {
        let result = async {
            let records = self.store.list().await?;
            self.cron.write(&records).await?;
            self.globals.reload_cron().await?;
            Ok::<_, ProvisionError>(records.len())
        }
        .await;
        match result {
            Ok(sites) => debug!(sites, "Cron jobs updated"),
            Err(e) => warn!(error = %e, "Failed to update cron jobs"),
        }
    }

    /// 失敗を致命的エラーとして扱うコマンド
    async fn exec(&self, command: &ServiceCommand, layout: &SiteLayout) -> Result<ExecOutput> {
        self.driver
            .exec(command, layout.root())
            .await
            .and_then(|output| output.into_result(command.display_args()))
            .map_err(ProvisionError::ContainerExec)
    }

    /// 失敗しても警告のみで続行するコマンド
    async fn best_effort(&self, command: &ServiceCommand, layout: &SiteLayout) {
        let result = self
            .driver
            .exec(command, layout.root())
            .await
            .and_then(|output| output.into_result(command.display_args()));
        if let Err(e) = result {
            warn!(
                service = %command.service,
                command = %command.display_args(),
                error = %e,
                "Command failed, continuing"
            );
        }
    }
}
