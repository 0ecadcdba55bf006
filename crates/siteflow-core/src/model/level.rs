//! プロビジョニングレベル

use serde::Serialize;
use std::fmt;

/// サイト作成の進捗チェックポイント
///
/// ロールバック範囲を決めるためだけに使われ、永続化はされません。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisioningLevel {
    #[default]
    Nothing = 0,
    RootCreated = 1,
    DbVerified = 2,
    ConfigMaterialized = 3,
    StatusChecked = 4,
}

impl ProvisioningLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 次のレベルへ進める（後退はしない）
    pub fn advance(&mut self, next: ProvisioningLevel) {
        debug_assert!(next >= *self, "provisioning level must not go backwards");
        if next > *self {
            *self = next;
        }
    }
}

impl fmt::Display for ProvisioningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nothing => "nothing",
            Self::RootCreated => "root-dir-created",
            Self::DbVerified => "db-verified",
            Self::ConfigMaterialized => "config-materialized",
            Self::StatusChecked => "status-checked",
        };
        write!(f, "{} ({})", self.as_u8(), name)
    }
}
