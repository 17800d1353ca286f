use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use zrpc_common::protocol::X_ZRPC_SERVERS;
use zrpc_common::{Result, RpcError};

use crate::discovery::{Discovery, MultiServersDiscovery, SelectMode};

/// How long a fetched server list stays fresh before the next `get` triggers
/// another registry round trip.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Discovery backed by a registry endpoint.
///
/// The address list is lazily refreshed: `get` and `get_all` first call
/// [`refresh`], which is a no-op while the last fetch is younger than the
/// refresh interval. The refresh lock is held across the HTTP round trip, so
/// concurrent callers inside one interval cause at most one fetch.
///
/// [`refresh`]: Discovery::refresh
pub struct RegistryDiscovery {
    inner: MultiServersDiscovery,
    registry: String,
    refresh_interval: Duration,
    last_update: Mutex<Option<Instant>>,
    http: reqwest::Client,
}

impl RegistryDiscovery {
    /// `registry` is the full URL of the registry endpoint. A zero
    /// `refresh_interval` selects the default.
    pub fn new(registry: impl Into<String>, refresh_interval: Duration) -> Self {
        let refresh_interval = if refresh_interval.is_zero() {
            DEFAULT_REFRESH_INTERVAL
        } else {
            refresh_interval
        };
        RegistryDiscovery {
            inner: MultiServersDiscovery::new(Vec::new()),
            registry: registry.into(),
            refresh_interval,
            last_update: Mutex::new(None),
            http: reqwest::Client::new(),
        }
    }

    async fn fetch_servers(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(&self.registry)
            .send()
            .await
            .map_err(|e| RpcError::Connection(format!("registry refresh: {e}")))?;

        let joined = response
            .headers()
            .get(X_ZRPC_SERVERS)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        Ok(joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect())
    }
}

#[async_trait]
impl Discovery for RegistryDiscovery {
    async fn refresh(&self) -> Result<()> {
        let mut last_update = self.last_update.lock().await;
        if let Some(at) = *last_update {
            if at + self.refresh_interval > Instant::now() {
                return Ok(());
            }
        }

        debug!("rpc registry: refresh servers from registry {}", self.registry);
        let servers = match self.fetch_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                warn!("rpc registry refresh err: {e}");
                return Err(e);
            }
        };
        self.inner.set_servers(servers);
        *last_update = Some(Instant::now());
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        let mut last_update = self.last_update.lock().await;
        self.inner.set_servers(servers);
        *last_update = Some(Instant::now());
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.refresh().await?;
        self.inner.get(mode).await
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        self.refresh().await?;
        self.inner.get_all().await
    }
}
