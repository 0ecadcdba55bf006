use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "Dockerに接続できません: {0}\n\nヒント:\n  • Dockerが起動しているか確認してください\n  • docker ps コマンドが正常に動作するか確認してください"
    )]
    DockerConnectionFailed(String),

    #[error("Docker APIエラー: {0}")]
    DockerApiError(String),

    #[error("コマンド '{program}' を実行できません: {message}")]
    CommandSpawn { program: String, message: String },

    #[error("コマンドが失敗しました (exit {exit_code}): {command}\n{stderr}")]
    CommandFailed {
        command: String,
        exit_code: i64,
        stderr: String,
    },

    #[error("コマンドの出力を解釈できません: {command}\n出力: {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error(
        "グローバルサービスの compose ファイルが見つかりません: {0}\n\nヒント:\n  • siteflow の設定で services_dir を確認してください"
    )]
    GlobalServicesMissing(String),
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError { .. } => {
                // 404/409 などは呼び出し側で個別に処理する
                ContainerError::DockerApiError(err.to_string())
            }
            _ => {
                // 接続エラーの可能性をチェック
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    ContainerError::DockerConnectionFailed(err_str)
                } else {
                    ContainerError::DockerApiError(err_str)
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
