use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error("設定ファイルを読み込めません: {path}\n理由: {message}")]
    ReadFailed { path: PathBuf, message: String },

    #[error(
        "設定ファイルの形式が不正です: {path}\n理由: {message}\n\nヒント:\n  • YAML の構文とキー名を確認してください"
    )]
    ParseFailed { path: PathBuf, message: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
