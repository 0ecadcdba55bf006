use crate::command::{ExecOutput, OneShot, ServiceCommand};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// コンテナランタイムのトレイト
///
/// サイトの compose プロジェクト（`workdir`）に対する最小限の操作。
/// プロビジョニングとクリーンアップはこのトレイトだけに依存します。
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    /// サービスを起動（既に起動済みなら何もしない）
    async fn start(&self, services: &[&str], workdir: &Path) -> Result<()>;

    /// サービスを停止
    async fn stop(&self, services: &[&str], workdir: &Path) -> Result<()>;

    /// サービスを再起動
    async fn restart(&self, services: &[&str], workdir: &Path) -> Result<()>;

    /// サービスコンテナ内でコマンドを実行
    ///
    /// 終了コードが0以外でも `Ok` を返します。
    async fn exec(&self, command: &ServiceCommand, workdir: &Path) -> Result<ExecOutput>;

    /// サイトのラベルが付いたコンテナ/ボリューム/ネットワークを削除
    async fn remove_by_label(&self, site_url: &str) -> Result<RemovalReport>;

    /// 一時コンテナでコマンドを実行し、終了後に破棄
    async fn run_once(&self, probe: &OneShot) -> Result<ExecOutput>;
}

/// ラベル指定削除の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub containers: Vec<String>,
    pub volumes: Vec<String>,
    pub networks: Vec<String>,
    /// 削除できなかったもの
    pub failures: Vec<String>,
}
