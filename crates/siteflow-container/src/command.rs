//! 構造化されたコマンド実行
//!
//! コマンドは常に引数ベクタとして組み立て、シェル文字列の連結は行いません。
//! 認証情報などの秘匿値は登録しておくとログ表示時に伏せ字になります。

use crate::error::{ContainerError, Result};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

const REDACTED: &str = "***";

/// サービスコンテナ内で実行するコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommand {
    pub service: String,
    pub user: Option<String>,
    pub workdir: Option<String>,
    pub args: Vec<String>,
    secrets: Vec<String>,
}

impl ServiceCommand {
    pub fn new<I, S>(service: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            service: service.into(),
            user: None,
            workdir: None,
            args: args.into_iter().map(Into::into).collect(),
            secrets: Vec::new(),
        }
    }

    /// `sh -c <script> sh <params...>` 形式のコマンド
    ///
    /// パラメータは `$1`, `$2` ... としてスクリプトから参照します。
    pub fn shell<I, S>(service: impl Into<String>, script: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = vec!["sh".to_string(), "-c".to_string(), script.to_string(), "sh".to_string()];
        args.extend(params.into_iter().map(Into::into));
        Self::new(service, args)
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// 秘匿値を引数として追加
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        let arg = arg.into();
        self.secrets.push(arg.clone());
        self.args.push(arg);
        self
    }

    /// 引数中に現れる秘匿値を登録
    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    pub fn secrets(&self) -> &[String] {
        &self.secrets
    }

    /// ログ表示用の文字列（秘匿値は伏せ字）
    pub fn display_args(&self) -> String {
        redact_all(&self.args.join(" "), &self.secrets)
    }
}

impl fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.service, self.display_args())
    }
}

/// コマンドの実行結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// 失敗していればエラーに変換
    pub fn into_result(self, command: impl fmt::Display) -> Result<ExecOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(ContainerError::CommandFailed {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// 一時コンテナの定義（`docker run --rm`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShot {
    pub image: String,
    pub network: Option<String>,
    /// `host:target` 形式のバインドマウント
    pub volumes: Vec<String>,
    pub args: Vec<String>,
    secrets: Vec<String>,
}

impl OneShot {
    pub fn new<I, S>(image: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            image: image.into(),
            network: None,
            volumes: Vec::new(),
            args: args.into_iter().map(Into::into).collect(),
            secrets: Vec::new(),
        }
    }

    pub fn volume(mut self, host: &Path, target: &str) -> Self {
        self.volumes.push(format!("{}:{}", host.display(), target));
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    pub fn secrets(&self) -> &[String] {
        &self.secrets
    }
}

impl fmt::Display for OneShot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.image,
            redact_all(&self.args.join(" "), &self.secrets)
        )
    }
}

fn redact_all(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
}

/// 外部コマンドを実行して出力を取得
///
/// 終了コードが0以外でもエラーにはせず、判断は呼び出し側に任せます。
/// Future が破棄された場合（キャンセル時）は子プロセスも終了させます。
pub async fn run_command(
    program: &str,
    args: &[String],
    workdir: Option<&Path>,
    shown: &str,
) -> Result<ExecOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    tracing::debug!("Running: {} {}", program, shown);

    let output = cmd
        .output()
        .await
        .map_err(|e| ContainerError::CommandSpawn {
            program: program.to_string(),
            message: e.to_string(),
        })?;

    Ok(ExecOutput {
        exit_code: output.status.code().map(i64::from).unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
