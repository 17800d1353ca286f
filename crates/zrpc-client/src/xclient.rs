use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::debug;

use zrpc_common::{Options, Result, RpcError};

use crate::client::Client;
use crate::dial::x_dial;
use crate::discovery::{Discovery, SelectMode};

/// Lazy per-address client cache shared with broadcast tasks.
struct ClientCache {
    opt: Options,
    clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl ClientCache {
    /// Returns the cached client for `addr`, evicting and replacing one that
    /// has become unavailable since it was cached.
    async fn get(&self, addr: &str) -> Result<Arc<Client>> {
        let mut clients = self.clients.lock().await;

        if let Some(client) = clients.get(addr) {
            if client.is_available() {
                return Ok(client.clone());
            }
            debug!("rpc xclient: evicting unavailable client for {addr}");
            if let Some(stale) = clients.remove(addr) {
                let _ = stale.close().await;
            }
        }

        let client = Arc::new(x_dial(addr, Some(self.opt.clone())).await?);
        clients.insert(addr.to_string(), client.clone());
        Ok(client)
    }

    async fn close_all(&self) {
        let mut clients = self.clients.lock().await;
        for (_, client) in clients.drain() {
            let _ = client.close().await;
        }
    }
}

/// Load-balancing front client.
///
/// Resolves an address through its [`Discovery`], lazily opens and caches
/// one [`Client`] per address, and fans calls out one-shot ([`call`]) or to
/// every backend at once ([`broadcast`]).
///
/// [`call`]: XClient::call
/// [`broadcast`]: XClient::broadcast
pub struct XClient<D: Discovery> {
    discovery: D,
    mode: SelectMode,
    cache: Arc<ClientCache>,
}

impl<D: Discovery> XClient<D> {
    pub fn new(discovery: D, mode: SelectMode, opt: Options) -> Self {
        XClient {
            discovery,
            mode,
            cache: Arc::new(ClientCache { opt, clients: Mutex::new(HashMap::new()) }),
        }
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Calls the named method on one backend picked by the selection mode.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let addr = self.discovery.get(self.mode).await?;
        let client = self.cache.get(&addr).await?;
        client.call(service_method, args).await
    }

    /// [`call`](XClient::call) with a per-call deadline.
    pub async fn call_timeout<A, R>(
        &self,
        service_method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let addr = self.discovery.get(self.mode).await?;
        let client = self.cache.get(&addr).await?;
        client.call_timeout(service_method, args, timeout).await
    }

    /// Calls every known backend in parallel. Succeeds only if every call
    /// succeeds, returning the first reply (`None` when the backend list is
    /// empty); the first failure wins and cancels the outstanding siblings.
    pub async fn broadcast<A, R>(&self, service_method: &str, args: &A) -> Result<Option<R>>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let servers = self.discovery.get_all().await?;
        let args = serde_json::to_value(args)?;
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut calls = JoinSet::new();
        for addr in servers {
            let cache = self.cache.clone();
            let mut cancel = cancel_rx.clone();
            let service_method = service_method.to_string();
            let args = args.clone();
            calls.spawn(async move {
                tokio::select! {
                    result = async {
                        let client = cache.get(&addr).await?;
                        client.call::<Value, R>(&service_method, &args).await
                    } => result,
                    _ = cancel.changed() => {
                        Err(RpcError::CallFailed("broadcast canceled".into()))
                    }
                }
            });
        }

        let mut first_error: Option<RpcError> = None;
        let mut first_reply: Option<R> = None;
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok(Ok(reply)) => {
                    if first_reply.is_none() {
                        first_reply = Some(reply);
                    }
                }
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                        let _ = cancel_tx.send(true);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error =
                            Some(RpcError::Connection(format!("broadcast task failed: {join_err}")));
                        let _ = cancel_tx.send(true);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(first_reply),
        }
    }

    /// Closes and drops every cached client.
    pub async fn close(&self) {
        self.cache.close_all().await;
    }
}
