//! ボリューム定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// マウント元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountSource {
    /// ホストパスのバインドマウント
    Bind(PathBuf),
    /// composeプロジェクトの名前付きボリューム
    Named(String),
}

/// ボリュームマウント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub source: MountSource,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

impl VolumeMount {
    pub fn bind(host: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: MountSource::Bind(host.into()),
            target: target.into(),
            read_only: false,
        }
    }

    pub fn named(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: MountSource::Named(name.into()),
            target: target.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// compose の短縮記法 ("source:target[:ro]")
    pub fn to_compose_entry(&self) -> String {
        let source = match &self.source {
            MountSource::Bind(path) => path.display().to_string(),
            MountSource::Named(name) => name.clone(),
        };
        if self.read_only {
            format!("{}:{}:ro", source, self.target)
        } else {
            format!("{}:{}", source, self.target)
        }
    }

    /// バインドマウントのホストパス
    pub fn host_path(&self) -> Option<&PathBuf> {
        match &self.source {
            MountSource::Bind(path) => Some(path),
            MountSource::Named(_) => None,
        }
    }
}

/// サービスごとのマウント一覧
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMountSet {
    mounts: BTreeMap<String, Vec<VolumeMount>>,
}

impl VolumeMountSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, service: impl Into<String>, mount: VolumeMount) {
        self.mounts.entry(service.into()).or_default().push(mount);
    }

    pub fn for_service(&self, service: &str) -> &[VolumeMount] {
        self.mounts.get(service).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 全バインドマウントのホストパス（重複なし）
    pub fn bind_paths(&self) -> Vec<&PathBuf> {
        let mut paths: Vec<&PathBuf> = self
            .mounts
            .values()
            .flatten()
            .filter_map(VolumeMount::host_path)
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}
