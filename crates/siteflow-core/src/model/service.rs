//! サービス定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// composeサービス定義
///
/// 1サービス分の宣言的な記述。`ComposeSpec` の構成要素で、
/// 実行とは独立した純粋なデータです。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    /// イメージ参照（"repo:tag"）
    pub image: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub restart: RestartPolicy,
    /// マウント定義（"source:target[:ro]" 形式）
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub environment: Vec<EnvVar>,
    #[serde(default)]
    pub networks: Vec<NetworkAttachment>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub hostname: Option<String>,
    pub command: Option<Vec<String>>,
}

impl ServiceSpec {
    /// 環境変数の値を取得
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.value.as_deref())
    }

    /// 指定ネットワークに参加しているか
    pub fn joins(&self, network: &str) -> bool {
        self.networks.iter().any(|n| n.name == network)
    }
}

/// 環境変数
///
/// `value` が `None` の場合は `.env` から値を引き継ぎます。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: Option<String>,
}

impl EnvVar {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// `.env` から値を引き継ぐ変数
    pub fn inherit(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

/// ネットワーク参加設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl NetworkAttachment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// 再起動ポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// 再起動しない
    No,
    /// 常に再起動（デフォルト）
    #[default]
    Always,
    /// 異常終了時のみ再起動
    OnFailure,
    /// 明示的に停止しない限り再起動
    UnlessStopped,
}

impl RestartPolicy {
    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "no" => Some(Self::No),
            "always" => Some(Self::Always),
            "on-failure" | "on_failure" => Some(Self::OnFailure),
            "unless-stopped" | "unless_stopped" => Some(Self::UnlessStopped),
            _ => None,
        }
    }

    /// compose ファイルで使用する文字列に変換
    pub fn as_compose_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Always => "always",
            Self::OnFailure => "on-failure",
            Self::UnlessStopped => "unless-stopped",
        }
    }
}
