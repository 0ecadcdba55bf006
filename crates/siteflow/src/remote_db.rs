//! リモートDBの検証と準備
//!
//! DB モードが remote のときのみ動作します。ローカルコンテナと共有DBは
//! コンテナ起動とグローバルリソース初期化の側で扱います。

use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use siteflow_container::{ContainerDriver, ContainerError, OneShot, sql_identifier, sql_literal};
use siteflow_core::{DatabaseMode, DbCredentials, SiteConfig};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// DB への操作
#[async_trait]
pub trait DbClient: Send + Sync {
    /// コンテナネットワークから到達できるアドレスに解決
    async fn resolve_host(&self, host: &str) -> siteflow_container::Result<String>;

    /// 認証情報で接続できるか確認
    async fn ping(&self, db: &DbCredentials) -> siteflow_container::Result<()>;

    async fn schema_exists(&self, db: &DbCredentials) -> siteflow_container::Result<bool>;

    async fn table_count(&self, db: &DbCredentials) -> siteflow_container::Result<u64>;

    async fn create_schema(&self, db: &DbCredentials) -> siteflow_container::Result<()>;

    async fn drop_schema(&self, db: &DbCredentials) -> siteflow_container::Result<()>;
}

/// 検証の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// リモートDBではないため何もしていない
    Skipped,
    /// スキーマを新規作成した
    Created,
    /// 空のスキーマが既に存在した
    Existing,
    /// 既存のスキーマを削除して作り直した
    Reset,
}

impl VerifyOutcome {
    /// このサイト作成でスキーマを作ったか（ロールバック対象か）
    pub fn created_schema(&self) -> bool {
        matches!(self, Self::Created | Self::Reset)
    }
}

/// 検証結果と、コンテナから使うDBホスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub outcome: VerifyOutcome,
    pub host: String,
}

pub struct RemoteDbVerifier {
    client: Arc<dyn DbClient>,
}

impl RemoteDbVerifier {
    pub fn new(client: Arc<dyn DbClient>) -> Self {
        Self { client }
    }

    /// リモートDBに接続し、サイト用スキーマを用意する
    ///
    /// テーブルを含む既存スキーマは `force_reset_remote_db` がない限り変更しません。
    #[instrument(skip_all, fields(url = %config.url, host = %config.db.host))]
    pub async fn verify_and_prepare(&self, config: &SiteConfig) -> Result<VerifyReport> {
        if config.database_mode != DatabaseMode::Remote {
            return Ok(VerifyReport {
                outcome: VerifyOutcome::Skipped,
                host: config.db.host.clone(),
            });
        }

        let host = self
            .client
            .resolve_host(&config.db.host)
            .await
            .map_err(|e| ProvisionError::NetworkResolution {
                host: config.db.host.clone(),
                message: e.to_string(),
            })?;
        let db = DbCredentials {
            host: host.clone(),
            ..config.db.clone()
        };

        self.client
            .ping(&db)
            .await
            .map_err(|e| ProvisionError::DbConnection {
                host: db.host_port(),
                message: e.to_string(),
            })?;
        info!(host = %db.host_port(), "Remote database is reachable");

        let exists = self
            .client
            .schema_exists(&db)
            .await
            .map_err(|e| ProvisionError::DbConnection {
                host: db.host_port(),
                message: e.to_string(),
            })?;

        let outcome = if !exists {
            self.create(&db).await?;
            VerifyOutcome::Created
        } else {
            let tables = self
                .client
                .table_count(&db)
                .await
                .map_err(|e| ProvisionError::DbConnection {
                    host: db.host_port(),
                    message: e.to_string(),
                })?;

            if tables == 0 {
                VerifyOutcome::Existing
            } else if config.force_reset_remote_db {
                warn!(schema = %db.name, tables, "Dropping existing database");
                self.client
                    .drop_schema(&db)
                    .await
                    .map_err(|e| ProvisionError::DbCreate {
                        name: db.name.clone(),
                        message: e.to_string(),
                    })?;
                self.create(&db).await?;
                VerifyOutcome::Reset
            } else {
                return Err(ProvisionError::NonEmptyDatabase {
                    name: db.name.clone(),
                });
            }
        };

        Ok(VerifyReport { outcome, host })
    }

    async fn create(&self, db: &DbCredentials) -> Result<()> {
        self.client
            .create_schema(db)
            .await
            .map_err(|e| ProvisionError::DbCreate {
                name: db.name.clone(),
                message: e.to_string(),
            })
    }
}

/// 一時コンテナで mysql クライアントを実行する `DbClient`
pub struct ContainerDbClient {
    driver: Arc<dyn ContainerDriver>,
    client_image: String,
    toolbox_image: String,
    network: String,
}

impl ContainerDbClient {
    pub fn new(
        driver: Arc<dyn ContainerDriver>,
        client_image: impl Into<String>,
        toolbox_image: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            client_image: client_image.into(),
            toolbox_image: toolbox_image.into(),
            network: network.into(),
        }
    }

    /// SQL を実行して標準出力を返す（接続エラーを含む失敗は Err）
    async fn query(&self, db: &DbCredentials, sql: &str) -> siteflow_container::Result<String> {
        let password = format!("--password={}", db.password);
        let probe = OneShot::new(
            &self.client_image,
            [
                "mysql".to_string(),
                format!("--host={}", db.host),
                format!("--port={}", db.port),
                format!("--user={}", db.user),
                password.clone(),
                "--batch".to_string(),
                "--skip-column-names".to_string(),
                "--execute".to_string(),
                sql.to_string(),
            ],
        )
        .network(&self.network)
        .redact(password);

        let output = self.driver.run_once(&probe).await?.into_result(&probe)?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl DbClient for ContainerDbClient {
    async fn resolve_host(&self, host: &str) -> siteflow_container::Result<String> {
        if !LOOPBACK_HOSTS.contains(&host) {
            return Ok(host.to_string());
        }

        let probe = OneShot::new(&self.toolbox_image, ["ip", "route"]).network(&self.network);
        let output = self.driver.run_once(&probe).await?.into_result(&probe)?;
        let gateway = parse_default_gateway(&output.stdout).ok_or_else(|| {
            ContainerError::CommandFailed {
                command: probe.to_string(),
                exit_code: 0,
                stderr: "default route not found".to_string(),
            }
        })?;
        info!(host, gateway = %gateway, "Resolved loopback database host");
        Ok(gateway)
    }

    async fn ping(&self, db: &DbCredentials) -> siteflow_container::Result<()> {
        self.query(db, "SELECT 1").await.map(|_| ())
    }

    async fn schema_exists(&self, db: &DbCredentials) -> siteflow_container::Result<bool> {
        let sql = format!(
            "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = '{}'",
            sql_literal(&db.name)
        );
        Ok(!self.query(db, &sql).await?.trim().is_empty())
    }

    async fn table_count(&self, db: &DbCredentials) -> siteflow_container::Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM information_schema.TABLES WHERE TABLE_SCHEMA = '{}'",
            sql_literal(&db.name)
        );
        let stdout = self.query(db, &sql).await?;
        parse_count(&stdout).ok_or_else(|| ContainerError::UnexpectedOutput {
            command: sql,
            output: stdout.trim().to_string(),
        })
    }

    async fn create_schema(&self, db: &DbCredentials) -> siteflow_container::Result<()> {
        let sql = format!("CREATE DATABASE `{}`", sql_identifier(&db.name));
        self.query(db, &sql).await.map(|_| ())
    }

    async fn drop_schema(&self, db: &DbCredentials) -> siteflow_container::Result<()> {
        let sql = format!("DROP DATABASE IF EXISTS `{}`", sql_identifier(&db.name));
        self.query(db, &sql).await.map(|_| ())
    }
}

/// `COUNT(*)` の結果（数値1つ）を読む
fn parse_count(stdout: &str) -> Option<u64> {
    stdout.trim().parse().ok()
}

/// `ip route` の出力からデフォルトゲートウェイを取り出す
fn parse_default_gateway(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("default"), Some("via"), Some(gateway)) => Some(gateway.to_string()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteflow_container::{ExecOutput, RemovalReport, ServiceCommand};
    use siteflow_core::{CreateOptions, SiteDefaults};
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDb {
        exists: bool,
        tables: u64,
        unreachable: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeDb {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl DbClient for FakeDb {
        async fn resolve_host(&self, host: &str) -> siteflow_container::Result<String> {
            Ok(if host == "localhost" { "172.17.0.1".to_string() } else { host.to_string() })
        }

        async fn ping(&self, db: &DbCredentials) -> siteflow_container::Result<()> {
            self.record(&format!("ping {}", db.host));
            if self.unreachable {
                return Err(ContainerError::CommandFailed {
                    command: "mysql".to_string(),
                    exit_code: 1,
                    stderr: "Unknown MySQL server host".to_string(),
                });
            }
            Ok(())
        }

        async fn schema_exists(&self, _db: &DbCredentials) -> siteflow_container::Result<bool> {
            Ok(self.exists)
        }

        async fn table_count(&self, _db: &DbCredentials) -> siteflow_container::Result<u64> {
            Ok(self.tables)
        }

        async fn create_schema(&self, _db: &DbCredentials) -> siteflow_container::Result<()> {
            self.record("create");
            Ok(())
        }

        async fn drop_schema(&self, _db: &DbCredentials) -> siteflow_container::Result<()> {
            self.record("drop");
            Ok(())
        }
    }

    fn remote_config(host: &str, force: bool) -> SiteConfig {
        CreateOptions {
            dbhost: Some(host.to_string()),
            dbuser: Some("wp".to_string()),
            dbpass: Some("secret".to_string()),
            force,
            ..CreateOptions::for_url("demo.test")
        }
        .into_config(&SiteDefaults::default())
        .unwrap()
    }

    #[tokio::test]
    async fn test_skipped_for_shared_db() {
        let db = Arc::new(FakeDb::default());
        let verifier = RemoteDbVerifier::new(db.clone());
        let config = CreateOptions::for_url("demo.test")
            .into_config(&SiteDefaults::default())
            .unwrap();

        let report = verifier.verify_and_prepare(&config).await.unwrap();
        assert_eq!(report.outcome, VerifyOutcome::Skipped);
        assert!(db.calls().is_empty());
    }

    #[tokio::test]
    async fn test_creates_missing_schema_via_resolved_host() {
        let db = Arc::new(FakeDb::default());
        let verifier = RemoteDbVerifier::new(db.clone());

        let report = verifier
            .verify_and_prepare(&remote_config("localhost:3307", false))
            .await
            .unwrap();

        assert_eq!(report.outcome, VerifyOutcome::Created);
        assert_eq!(report.host, "172.17.0.1");
        assert_eq!(db.calls(), vec!["ping 172.17.0.1", "create"]);
    }

    #[tokio::test]
    async fn test_non_empty_schema_is_left_untouched() {
        let db = Arc::new(FakeDb {
            exists: true,
            tables: 12,
            ..Default::default()
        });
        let verifier = RemoteDbVerifier::new(db.clone());

        let err = verifier
            .verify_and_prepare(&remote_config("db.example.net", false))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::NonEmptyDatabase { .. }));
        assert_eq!(db.calls(), vec!["ping db.example.net"]);
    }

    #[tokio::test]
    async fn test_force_resets_non_empty_schema() {
        let db = Arc::new(FakeDb {
            exists: true,
            tables: 12,
            ..Default::default()
        });
        let verifier = RemoteDbVerifier::new(db.clone());

        let report = verifier
            .verify_and_prepare(&remote_config("db.example.net", true))
            .await
            .unwrap();

        assert_eq!(report.outcome, VerifyOutcome::Reset);
        assert_eq!(db.calls(), vec!["ping db.example.net", "drop", "create"]);
    }

    #[tokio::test]
    async fn test_empty_existing_schema_is_reused() {
        let db = Arc::new(FakeDb {
            exists: true,
            ..Default::default()
        });
        let verifier = RemoteDbVerifier::new(db.clone());

        let report = verifier
            .verify_and_prepare(&remote_config("db.example.net", false))
            .await
            .unwrap();
        assert_eq!(report.outcome, VerifyOutcome::Existing);
        assert!(!report.outcome.created_schema());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let db = Arc::new(FakeDb {
            unreachable: true,
            ..Default::default()
        });
        let verifier = RemoteDbVerifier::new(db);

        let err = verifier
            .verify_and_prepare(&remote_config("badhost", false))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::DbConnection { .. }));
    }

    /// どの mysql クエリにも同じ出力を返すドライバー
    struct CannedDriver {
        stdout: &'static str,
    }

    #[async_trait]
    impl ContainerDriver for CannedDriver {
        async fn start(&self, _: &[&str], _: &Path) -> siteflow_container::Result<()> {
            Ok(())
        }
        async fn stop(&self, _: &[&str], _: &Path) -> siteflow_container::Result<()> {
            Ok(())
        }
        async fn restart(&self, _: &[&str], _: &Path) -> siteflow_container::Result<()> {
            Ok(())
        }
        async fn exec(&self, _: &ServiceCommand, _: &Path) -> siteflow_container::Result<ExecOutput> {
            Ok(ExecOutput::default())
        }
        async fn remove_by_label(&self, _: &str) -> siteflow_container::Result<RemovalReport> {
            Ok(RemovalReport::default())
        }
        async fn run_once(&self, _: &OneShot) -> siteflow_container::Result<ExecOutput> {
            Ok(ExecOutput {
                exit_code: 0,
                stdout: self.stdout.to_string(),
                stderr: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_unreadable_table_count_keeps_non_empty_guard() {
        let driver = Arc::new(CannedDriver {
            stdout: "mysql: [Warning] Using a password on the command line\n",
        });
        let client = ContainerDbClient::new(driver, "mysql:8", "busybox", "backend");
        let verifier = RemoteDbVerifier::new(Arc::new(client));

        let err = verifier
            .verify_and_prepare(&remote_config("db.example.net", false))
            .await
            .unwrap_err();

        match err {
            ProvisionError::DbConnection { host, message } => {
                assert_eq!(host, "db.example.net:3306");
                assert!(message.contains("Using a password"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("12\n"), Some(12));
        assert_eq!(parse_count("0"), Some(0));
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("ERROR 1045"), None);
    }

    #[test]
    fn test_parse_default_gateway() {
        let output = "default via 172.18.0.1 dev eth0\n172.18.0.0/16 dev eth0 scope link  src 172.18.0.5\n";
        assert_eq!(parse_default_gateway(output), Some("172.18.0.1".to_string()));
        assert_eq!(parse_default_gateway("172.18.0.0/16 dev eth0"), None);
    }
}
