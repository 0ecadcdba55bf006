use siteflow_container::ContainerError;
use siteflow_core::SiteError;
use siteflow_store::StoreError;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Validation(#[from] SiteError),

    #[error("DBホスト '{host}' をコンテナネットワークから到達可能なアドレスに解決できません: {message}")]
    NetworkResolution { host: String, message: String },

    #[error("DB {host} に接続できません: {message}")]
    DbConnection { host: String, message: String },

    #[error(
        "データベース '{name}' を作成できません: {message}\nヒント: 指定したDBユーザーに CREATE 権限があるか確認してください"
    )]
    DbCreate { name: String, message: String },

    #[error(
        "データベース '{name}' には既にテーブルが存在します\nヒント: 既存データを削除して作り直す場合は --force を指定してください"
    )]
    NonEmptyDatabase { name: String },

    #[error("設定ファイルを書き込めません: {path}\n理由: {message}")]
    ConfigWrite { path: String, message: String },

    #[error("テンプレート '{template}' を展開できません: {message}")]
    Template { template: String, message: String },

    #[error("コンテナ内のコマンドが失敗しました: {0}")]
    ContainerExec(#[source] ContainerError),

    #[error("WordPress のインストールに失敗しました: {0}")]
    InstallFailure(#[source] ContainerError),

    #[error("サイト {url} に到達できません（{attempts} 回試行）")]
    SiteUnreachable { url: String, attempts: u32 },

    #[error("証明書を発行できません: {0}")]
    Certificate(String),

    #[error("シグナルにより中断されました")]
    Interrupted,

    #[error("予期しないエラー: {message}（{location}）")]
    Fatal { message: String, location: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl ProvisionError {
    /// 副作用の発生前に検出されたエラーか
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// テンプレート展開エラーはバリデーションではなく実行時エラーとして扱う
    pub fn template(err: SiteError) -> Self {
        match err {
            SiteError::TemplateError { template, message } => Self::Template { template, message },
            other => Self::Template {
                template: String::new(),
                message: other.to_string(),
            },
        }
    }

    pub fn config_write(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::ConfigWrite {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
