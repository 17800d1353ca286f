use std::cmp;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use zrpc_common::protocol::X_ZRPC_SERVER;
use zrpc_common::{Result, RpcError};

use crate::registry::DEFAULT_TIMEOUT;

/// Default heartbeat period for a registry expiring after `timeout`: one
/// minute of slack before expiry, but never shorter than half the timeout
/// (with a one second floor) so small timeouts still get a sane cadence.
pub fn default_period(timeout: Duration) -> Duration {
    let slack = timeout.saturating_sub(Duration::from_secs(60));
    let floor = cmp::max(timeout / 2, Duration::from_secs(1));
    cmp::max(slack, floor)
}

/// Keeps `addr` registered at `registry` by POSTing a heartbeat every
/// `period` (zero selects [`default_period`] of the default registry
/// timeout). The first beat is sent immediately; the task exits on the
/// first failed beat.
pub fn start(
    registry: impl Into<String>,
    addr: impl Into<String>,
    period: Duration,
) -> JoinHandle<()> {
    let registry = registry.into();
    let addr = addr.into();
    let period = if period.is_zero() { default_period(DEFAULT_TIMEOUT) } else { period };

    tokio::spawn(async move {
        let http = reqwest::Client::new();
        if let Err(e) = send_heartbeat(&http, &registry, &addr).await {
            warn!("rpc server: heart beat err: {e}");
            return;
        }

        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // the first tick fires immediately
        loop {
            ticker.tick().await;
            if let Err(e) = send_heartbeat(&http, &registry, &addr).await {
                warn!("rpc server: heart beat err: {e}");
                return;
            }
        }
    })
}

async fn send_heartbeat(http: &reqwest::Client, registry: &str, addr: &str) -> Result<()> {
    debug!("{addr} send heart beat to registry {registry}");
    http.post(registry)
        .header(X_ZRPC_SERVER, addr)
        .send()
        .await
        .map_err(|e| RpcError::Connection(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_period_leaves_a_minute_of_slack() {
        assert_eq!(default_period(Duration::from_secs(300)), Duration::from_secs(240));
        assert_eq!(default_period(Duration::from_secs(600)), Duration::from_secs(540));
    }

    #[test]
    fn test_small_timeouts_clamp_to_half() {
        assert_eq!(default_period(Duration::from_secs(60)), Duration::from_secs(30));
        assert_eq!(default_period(Duration::from_secs(90)), Duration::from_secs(45));
        assert_eq!(default_period(Duration::from_millis(400)), Duration::from_secs(1));
    }
}
