//! composeトポロジー定義

use super::service::ServiceSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 名前付きボリューム宣言
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// ネットワーク宣言
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    /// 外部で作成済みのネットワークか
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// サイトのサービストポロジー
///
/// `SiteConfig` とマウント一覧から毎回再計算される純粋なデータ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeSpec {
    /// compose プロジェクト名
    pub project: String,
    pub services: Vec<ServiceSpec>,
    pub volumes: Vec<VolumeSpec>,
    pub networks: Vec<NetworkSpec>,
    /// ローカルDBボリュームを作成するか
    pub local_db: bool,
    /// リバースプロキシのHTTPSリダイレクトを無効化しているか
    pub https_bypass: bool,
}

impl ComposeSpec {
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.service(name).is_some()
    }
}
