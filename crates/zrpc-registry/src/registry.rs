use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info};

use zrpc_common::protocol::{DEFAULT_REGISTRY_PATH, X_ZRPC_SERVER, X_ZRPC_SERVERS};
use zrpc_common::{Result, RpcError};

/// Default lifetime of a heartbeat; a server missing its beats for this long
/// is dropped from the listing.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Tracks alive server addresses by their last heartbeat.
pub struct Registry {
    timeout: Duration,
    servers: Mutex<HashMap<String, Instant>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Registry {
    /// A zero timeout means entries never expire.
    pub fn new(timeout: Duration) -> Self {
        Registry { timeout, servers: Mutex::new(HashMap::new()) }
    }

    /// Inserts a server or refreshes its heartbeat timestamp.
    pub fn put_server(&self, addr: &str) {
        debug!("rpc registry: heartbeat from {addr}");
        self.servers
            .lock()
            .unwrap()
            .insert(addr.to_string(), Instant::now());
    }

    /// Returns the alive addresses sorted ascending, evicting expired
    /// entries in the same pass.
    pub fn alive_servers(&self) -> Vec<String> {
        let now = Instant::now();
        let mut servers = self.servers.lock().unwrap();
        let mut alive: Vec<String> = Vec::with_capacity(servers.len());

        servers.retain(|addr, last_seen| {
            let keep = self.timeout.is_zero() || *last_seen + self.timeout > now;
            if keep {
                alive.push(addr.clone());
            }
            keep
        });

        alive.sort();
        alive
    }
}

/// Builds the registry's HTTP surface at the given path. GET lists alive
/// servers in the `x-zrpc-servers` header; POST records the heartbeat from
/// the `x-zrpc-server` header; anything else is 405.
pub fn router(registry: Arc<Registry>, path: &str) -> Router {
    Router::new()
        .route(path, get(list_servers).post(record_heartbeat))
        .with_state(registry)
}

/// Serves the registry on the default path until the listener fails.
pub async fn serve(registry: Arc<Registry>, listener: TcpListener) -> Result<()> {
    serve_at(registry, listener, DEFAULT_REGISTRY_PATH).await
}

/// Serves the registry at a custom path.
pub async fn serve_at(registry: Arc<Registry>, listener: TcpListener, path: &str) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| RpcError::Connection(format!("registry local addr: {e}")))?;
    info!("rpc registry listening on {addr}{path}");

    axum::serve(listener, router(registry, path))
        .await
        .map_err(|e| RpcError::Connection(format!("registry server: {e}")))
}

async fn list_servers(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let joined = registry.alive_servers().join(",");
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&joined) {
        headers.insert(X_ZRPC_SERVERS, value);
    }
    headers
}

async fn record_heartbeat(
    State(registry): State<Arc<Registry>>,
    headers: HeaderMap,
) -> StatusCode {
    match headers
        .get(X_ZRPC_SERVER)
        .and_then(|v| v.to_str().ok())
        .filter(|addr| !addr.is_empty())
    {
        Some(addr) => {
            registry.put_server(addr);
            StatusCode::OK
        }
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_list() {
        let registry = Registry::new(Duration::from_secs(60));
        registry.put_server("b:2");
        registry.put_server("a:1");

        assert_eq!(registry.alive_servers(), vec!["a:1".to_string(), "b:2".to_string()]);
    }

    #[test]
    fn test_repeat_heartbeat_refreshes_not_duplicates() {
        let registry = Registry::new(Duration::from_secs(60));
        registry.put_server("a:1");
        registry.put_server("a:1");

        assert_eq!(registry.alive_servers().len(), 1);
    }

    #[test]
    fn test_expired_entries_evicted_during_listing() {
        let registry = Registry::new(Duration::from_millis(20));
        registry.put_server("a:1");
        std::thread::sleep(Duration::from_millis(40));

        assert!(registry.alive_servers().is_empty());
        assert!(registry.servers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_zero_timeout_never_expires() {
        let registry = Registry::new(Duration::ZERO);
        registry.put_server("a:1");
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(registry.alive_servers(), vec!["a:1".to_string()]);
    }
}
