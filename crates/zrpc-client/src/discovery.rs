use std::sync::Mutex;

use async_trait::async_trait;
use rand::Rng;

use zrpc_common::{Result, RpcError};

/// Backend selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// Uniform sample from the current list.
    Random,
    /// Stable rotation through the current list.
    RoundRobin,
}

/// Enumerates backend addresses and picks one under a selection policy.
///
/// Every call observes a consistent snapshot of the address list.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Re-fetches the address list from whatever backs it, if anything does.
    async fn refresh(&self) -> Result<()>;

    /// Replaces the address list.
    async fn update(&self, servers: Vec<String>) -> Result<()>;

    /// Picks one address under the given mode.
    async fn get(&self, mode: SelectMode) -> Result<String>;

    /// Returns all addresses.
    async fn get_all(&self) -> Result<Vec<String>>;
}

struct Servers {
    list: Vec<String>,
    index: usize,
}

/// Discovery over a manually maintained address list.
pub struct MultiServersDiscovery {
    servers: Mutex<Servers>,
}

impl MultiServersDiscovery {
    pub fn new(servers: Vec<String>) -> Self {
        // Start rotation at a random point so a fleet of clients does not
        // hammer the same backend in lockstep.
        let index = rand::thread_rng().gen_range(0..usize::MAX / 2);
        MultiServersDiscovery { servers: Mutex::new(Servers { list: servers, index }) }
    }

    pub(crate) fn set_servers(&self, servers: Vec<String>) {
        self.servers.lock().unwrap().list = servers;
    }

    fn pick(&self, mode: SelectMode) -> Result<String> {
        let mut servers = self.servers.lock().unwrap();
        let n = servers.list.len();
        if n == 0 {
            return Err(RpcError::NoAvailableServers);
        }
        match mode {
            SelectMode::Random => {
                let i = rand::thread_rng().gen_range(0..n);
                Ok(servers.list[i].clone())
            }
            SelectMode::RoundRobin => {
                let picked = servers.list[servers.index % n].clone();
                servers.index = (servers.index + 1) % n;
                Ok(picked)
            }
        }
    }

    fn snapshot(&self) -> Vec<String> {
        self.servers.lock().unwrap().list.clone()
    }
}

#[async_trait]
impl Discovery for MultiServersDiscovery {
    async fn refresh(&self) -> Result<()> {
        // Nothing backs a manual list.
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        self.set_servers(servers);
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.pick(mode)
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        Ok(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn addrs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("server-{i}")).collect()
    }

    #[tokio::test]
    async fn test_empty_list_errors() {
        let d = MultiServersDiscovery::new(vec![]);
        let err = d.get(SelectMode::RoundRobin).await.unwrap_err();
        assert_eq!(err.to_string(), "rpc discovery: no available servers");
    }

    #[tokio::test]
    async fn test_round_robin_fairness() {
        let n = 3;
        let k = 5;
        let d = MultiServersDiscovery::new(addrs(n));

        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut picks = Vec::new();
        for _ in 0..k * n {
            let addr = d.get(SelectMode::RoundRobin).await.unwrap();
            *counts.entry(addr.clone()).or_insert(0) += 1;
            picks.push(addr);
        }

        for addr in addrs(n) {
            assert_eq!(counts[&addr], k, "uneven rotation for {addr}");
        }
        // Stable rotation order: each lap repeats the first.
        for (i, addr) in picks.iter().enumerate() {
            assert_eq!(addr, &picks[i % n]);
        }
    }

    #[tokio::test]
    async fn test_random_picks_members() {
        let d = MultiServersDiscovery::new(addrs(4));
        let all = d.get_all().await.unwrap();
        for _ in 0..50 {
            let addr = d.get(SelectMode::Random).await.unwrap();
            assert!(all.contains(&addr));
        }
    }

    #[tokio::test]
    async fn test_update_replaces_list() {
        let d = MultiServersDiscovery::new(addrs(2));
        d.update(vec!["only".to_string()]).await.unwrap();
        assert_eq!(d.get_all().await.unwrap(), vec!["only".to_string()]);
        assert_eq!(d.get(SelectMode::RoundRobin).await.unwrap(), "only");
    }
}
