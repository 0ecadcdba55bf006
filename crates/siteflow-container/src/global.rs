//! 共有グローバルリソース（共有DB、共有キャッシュ、リバースプロキシ、cron）

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::command::ServiceCommand;
use crate::error::{ContainerError, Result};
use crate::runtime::ContainerDriver;
use async_trait::async_trait;
use bollard::Docker;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// グローバルサービスの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalService {
    Db,
    Redis,
    Proxy,
    Cron,
}

impl fmt::Display for GlobalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Db => "db",
            Self::Redis => "redis",
            Self::Proxy => "proxy",
            Self::Cron => "cron",
        };
        f.write_str(name)
    }
}

/// 共有DB上に作成するサイト用ユーザー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbGrant {
    pub user: String,
    pub password: String,
    pub schema: String,
}

/// グローバルリソースの初期化と操作
#[async_trait]
pub trait GlobalResources: Send + Sync {
    /// サービスとそのネットワークが起動していることを保証
    async fn ensure(&self, service: GlobalService) -> Result<()>;

    /// 共有DBにサイト用のユーザーとスキーマを作成
    async fn create_db_user(&self, grant: &DbGrant) -> Result<()>;

    /// 共有DBからサイト用のユーザーとスキーマを削除
    async fn drop_db_user(&self, user: &str, schema: &str) -> Result<()>;

    /// リバースプロキシの設定を再読み込み
    async fn reload_proxy(&self) -> Result<()>;

    /// cron コンテナにジョブ定義を読み直させる
    async fn reload_cron(&self) -> Result<()>;
}

/// グローバルサービスの compose サービス名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalNames {
    pub db: String,
    pub redis: String,
    pub proxy: String,
    pub cron: String,
    pub frontend_network: String,
    pub backend_network: String,
}

impl GlobalNames {
    fn service(&self, service: GlobalService) -> &str {
        match service {
            GlobalService::Db => &self.db,
            GlobalService::Redis => &self.redis,
            GlobalService::Proxy => &self.proxy,
            GlobalService::Cron => &self.cron,
        }
    }
}

impl Default for GlobalNames {
    fn default() -> Self {
        Self {
            db: "global-db".to_string(),
            redis: "global-redis".to_string(),
            proxy: "global-nginx-proxy".to_string(),
            cron: "global-cron".to_string(),
            frontend_network: "global-frontend-network".to_string(),
            backend_network: "global-backend-network".to_string(),
        }
    }
}

/// Docker 上のグローバルサービス
///
/// `services_dir` にある compose プロジェクトとして管理されます。
pub struct DockerGlobalResources {
    docker: Docker,
    driver: Arc<dyn ContainerDriver>,
    services_dir: PathBuf,
    names: GlobalNames,
}

impl DockerGlobalResources {
    pub fn new(
        docker: Docker,
        driver: Arc<dyn ContainerDriver>,
        services_dir: impl Into<PathBuf>,
        names: GlobalNames,
    ) -> Self {
        Self {
            docker,
            driver,
            services_dir: services_dir.into(),
            names,
        }
    }

    async fn ensure_network(&self, name: &str) -> Result<()> {
        let network_config = bollard::models::NetworkCreateRequest {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            ..Default::default()
        };

        match self.docker.create_network(network_config).await {
            Ok(_) => {
                info!(network = %name, "Created network");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 409, ..
            }) => {
                debug!(network = %name, "Network already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn mysql_root(&self, sql: String, secret: &str) -> Result<()> {
        let command = ServiceCommand::shell(
            &self.names.db,
            r#"mysql -uroot -p"$MYSQL_ROOT_PASSWORD" -e "$1""#,
            [sql],
        )
        .redact(secret);
        self.driver
            .exec(&command, &self.services_dir)
            .await?
            .into_result(&command)
            .map(|_| ())
    }
}

#[async_trait]
impl GlobalResources for DockerGlobalResources {
    async fn ensure(&self, service: GlobalService) -> Result<()> {
        let compose_file = self.services_dir.join("docker-compose.yml");
        if !compose_file.exists() {
            return Err(ContainerError::GlobalServicesMissing(
                compose_file.display().to_string(),
            ));
        }

        self.ensure_network(&self.names.frontend_network).await?;
        self.ensure_network(&self.names.backend_network).await?;

        let name = self.names.service(service);
        self.driver.start(&[name], &self.services_dir).await?;
        info!(service = %service, container = %name, "Global service is running");
        Ok(())
    }

    async fn create_db_user(&self, grant: &DbGrant) -> Result<()> {
        let sql = format!(
            "CREATE USER IF NOT EXISTS '{user}'@'%' IDENTIFIED BY '{password}'; \
             CREATE DATABASE IF NOT EXISTS `{schema}`; \
             GRANT ALL PRIVILEGES ON `{schema}`.* TO '{user}'@'%'; FLUSH PRIVILEGES;",
            user = sql_literal(&grant.user),
            password = sql_literal(&grant.password),
            schema = sql_identifier(&grant.schema),
        );
        self.mysql_root(sql, &grant.password).await
    }

    async fn drop_db_user(&self, user: &str, schema: &str) -> Result<()> {
        let sql = format!(
            "DROP USER IF EXISTS '{}'@'%'; DROP DATABASE IF EXISTS `{}`;",
            sql_literal(user),
            sql_identifier(schema),
        );
        self.mysql_root(sql, "").await
    }

    async fn reload_proxy(&self) -> Result<()> {
        let command = ServiceCommand::shell(&self.names.proxy, "nginx -t && nginx -s reload", Vec::<String>::new());
        self.driver
            .exec(&command, &self.services_dir)
            .await?
            .into_result(&command)
            .map(|_| ())
    }

    async fn reload_cron(&self) -> Result<()> {
        self.ensure(GlobalService::Cron).await?;
        // ofelia は起動時にしか設定を読まない
        self.driver.restart(&[self.names.cron.as_str()], &self.services_dir).await?;
        info!(container = %self.names.cron, "Reloaded cron jobs");
        Ok(())
    }
}

/// SQL の文字列リテラル用エスケープ
pub fn sql_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

/// SQL の識別子（バッククォート内）用エスケープ
pub fn sql_identifier(value: &str) -> String {
    value.replace('`', "``")
}
