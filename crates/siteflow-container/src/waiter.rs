//! サービス準備完了の待機
//!
//! 上限付きのポーリングで、上限に達しても処理は止めません。
//! 待機がタイムアウトした場合は後続のコマンドが通常どおり失敗して報告されます。

use crate::command::ServiceCommand;
use crate::runtime::ContainerDriver;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// 待機設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    1.0
}

impl WaitConfig {
    /// 一定間隔のポーリング
    pub fn fixed(max_retries: u32, interval_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms: interval_ms,
            max_delay_ms: interval_ms,
            multiplier: 1.0,
        }
    }

    /// 試行回数に応じた待機時間（ミリ秒）
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        (delay as u64).min(self.max_delay_ms)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        // 1秒間隔で最大180回
        Self::fixed(180, 1000)
    }
}

/// 待機結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// 条件が満たされるまで上限付きでポーリング
pub async fn wait_until<F, Fut>(config: &WaitConfig, mut probe: F) -> WaitOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 0..config.max_retries {
        if probe(attempt).await {
            return WaitOutcome::Ready {
                attempts: attempt + 1,
            };
        }

        // 最後の試行でなければ待機
        if attempt + 1 < config.max_retries {
            sleep(Duration::from_millis(config.delay_for_attempt(attempt))).await;
        }
    }

    WaitOutcome::TimedOut {
        attempts: config.max_retries,
    }
}

/// サービス内のヘルスチェックコマンドが成功するまで待機
pub async fn wait_for_service(
    driver: &dyn ContainerDriver,
    check: &ServiceCommand,
    workdir: &Path,
    config: &WaitConfig,
) -> WaitOutcome {
    let outcome = wait_until(config, |attempt| async move {
        match driver.exec(check, workdir).await {
            Ok(output) => output.success(),
            Err(e) => {
                debug!(attempt, error = %e, "Health check failed");
                false
            }
        }
    })
    .await;

    if let WaitOutcome::TimedOut { attempts } = outcome {
        warn!(
            service = %check.service,
            attempts,
            "Service did not become ready, continuing anyway"
        );
    }
    outcome
}
