//! サイトの到達確認

use async_trait::async_trait;
use siteflow_container::{WaitConfig, WaitOutcome, wait_until};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// サイトへの HTTP 到達確認
#[async_trait]
pub trait SiteProbe: Send + Sync {
    /// サイトが応答すれば HTTP ステータスを返す
    async fn probe(&self, url: &str) -> Option<u16>;
}

/// ローカルのリバースプロキシに直接問い合わせる `SiteProbe`
pub struct HttpProbe {
    proxy_addr: SocketAddr,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(proxy_addr: SocketAddr) -> Self {
        Self {
            proxy_addr,
            timeout: Duration::from_secs(5),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 80)))
    }
}

#[async_trait]
impl SiteProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Option<u16> {
        let client = reqwest::Client::builder()
            .resolve(url, self.proxy_addr)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(self.timeout)
            .build()
            .ok()?;

        match client.get(format!("http://{}/", url)).send().await {
            Ok(response) => Some(response.status().as_u16()),
            Err(e) => {
                debug!(url, error = %e, "Site probe failed");
                None
            }
        }
    }
}

/// インストール前のサイトが返すステータス（インストール画面へのリダイレクトを含む）
fn is_reachable(status: u16) -> bool {
    matches!(status, 200 | 301 | 302)
}

/// サイトが応答するまで上限付きで待機
pub async fn wait_until_reachable(probe: &dyn SiteProbe, url: &str, config: &WaitConfig) -> WaitOutcome {
    info!(url, "Checking site status");
    let outcome = wait_until(config, |_| async move {
        probe.probe(url).await.is_some_and(is_reachable)
    })
    .await;
    if !outcome.is_ready() {
        warn!(url, "Site did not respond");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProbe {
        calls: AtomicU32,
        ready_after: u32,
        status: u16,
    }

    #[async_trait]
    impl SiteProbe for FlakyProbe {
        async fn probe(&self, _url: &str) -> Option<u16> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            (call >= self.ready_after).then_some(self.status)
        }
    }

    #[tokio::test]
    async fn test_waits_for_redirect_to_installer() {
        let probe = FlakyProbe {
            calls: AtomicU32::new(0),
            ready_after: 2,
            status: 302,
        };
        let outcome = wait_until_reachable(&probe, "demo.test", &WaitConfig::fixed(5, 1)).await;
        assert_eq!(outcome, WaitOutcome::Ready { attempts: 3 });
    }

    #[tokio::test]
    async fn test_server_error_is_not_reachable() {
        let probe = FlakyProbe {
            calls: AtomicU32::new(0),
            ready_after: 0,
            status: 502,
        };
        let outcome = wait_until_reachable(&probe, "demo.test", &WaitConfig::fixed(3, 1)).await;
        assert_eq!(outcome, WaitOutcome::TimedOut { attempts: 3 });
    }
}
