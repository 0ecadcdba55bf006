//! サイトの定期実行ジョブ

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const WP_CRON_COMMAND: &str = "wp cron event run --due-now";
const WP_CRON_USER: &str = "www-data";

/// php コンテナ内で定期実行するコマンド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJob {
    pub user: String,
    pub command: String,
    /// cron 形式のスケジュール
    pub schedule: String,
}

impl CronJob {
    /// WordPress の予約イベントを10分ごとに実行
    ///
    /// サイト同士で実行が重ならないよう、開始分をランダムにずらします。
    pub fn wp_cron() -> Self {
        Self::wp_cron_at(rand::thread_rng().gen_range(0..10))
    }

    pub fn wp_cron_at(offset: u8) -> Self {
        Self {
            user: WP_CRON_USER.to_string(),
            command: WP_CRON_COMMAND.to_string(),
            schedule: format!("{}/10 * * * *", offset % 10),
        }
    }
}
