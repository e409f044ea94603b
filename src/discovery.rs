//! Endpoint discovery: resolving a logical service down to a concrete
//! endpoint string that [`crate::addr::parse`] can dial.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;

use quick_error::quick_error;
quick_error! {
    #[derive(Debug)]
    pub enum Error {
        NoServersAvailable {
            display("no servers available")
        }
        Registry(err: crate::httpclient::Error) {
            from()
            display("registry discovery error: {}", err)
        }
    }
}

/// Picks one endpoint out of several known-good ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    Random,
    RoundRobin,
}

/// Resolves logical endpoints to dialable addresses, and tracks a rolling
/// view of which ones are currently up. Implementations must be safe to
/// share across many concurrent callers.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Forces an immediate resync with the source of truth. A no-op for
    /// discovery backed by a static list.
    async fn refresh(&self) -> Result<(), Error>;

    /// Replaces the known server list outright, bypassing whatever normally
    /// triggers a refresh.
    async fn update(&self, servers: Vec<String>);

    /// Picks one endpoint according to `mode`.
    async fn get(&self, mode: SelectMode) -> Result<String, Error>;

    /// Returns every endpoint currently known, for broadcast.
    async fn get_all(&self) -> Vec<String>;
}

struct ServerList {
    servers: Vec<String>,
    cursor: usize,
}

impl ServerList {
    fn pick(&mut self, mode: SelectMode) -> Result<String, Error> {
        let n = self.servers.len();
        if n == 0 {
            return Err(Error::NoServersAvailable);
        }
        match mode {
            SelectMode::Random => {
                let i = rand::thread_rng().gen_range(0..n);
                Ok(self.servers[i].clone())
            }
            SelectMode::RoundRobin => {
                let server = self.servers[self.cursor % n].clone();
                self.cursor = (self.cursor + 1) % n;
                Ok(server)
            }
        }
    }
}

/// Discovery over a fixed, caller-supplied list of endpoints. `update` is
/// the only way its view ever changes.
pub struct StaticDiscovery {
    list: Mutex<ServerList>,
}

impl StaticDiscovery {
    pub fn new(servers: Vec<String>) -> Self {
        let cursor = if servers.is_empty() {
            0
        } else {
            rand::thread_rng().gen_range(0..servers.len())
        };
        StaticDiscovery {
            list: Mutex::new(ServerList { servers, cursor }),
        }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn refresh(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) {
        self.list.lock().unwrap().servers = servers;
    }

    async fn get(&self, mode: SelectMode) -> Result<String, Error> {
        self.list.lock().unwrap().pick(mode)
    }

    async fn get_all(&self) -> Vec<String> {
        self.list.lock().unwrap().servers.clone()
    }
}

/// Discovery backed by a registry endpoint. The registry is polled over
/// plain HTTP for an `X-rpc-servers` header; results are cached for `ttl`
/// so a hot `get`/`get_all` path doesn't hit the registry on every call.
pub struct RegistryDiscovery {
    registry_url: String,
    ttl: Duration,
    list: Mutex<ServerList>,
    last_refresh: Mutex<Option<Instant>>,
}

impl RegistryDiscovery {
    pub fn new(registry_url: impl Into<String>, ttl: Duration) -> Self {
        RegistryDiscovery {
            registry_url: registry_url.into(),
            ttl,
            list: Mutex::new(ServerList {
                servers: Vec::new(),
                cursor: 0,
            }),
            last_refresh: Mutex::new(None),
        }
    }

    fn stale(&self) -> bool {
        match *self.last_refresh.lock().unwrap() {
            Some(t) => t.elapsed() >= self.ttl,
            None => true,
        }
    }
}

#[async_trait]
impl Discovery for RegistryDiscovery {
    async fn refresh(&self) -> Result<(), Error> {
        if !self.stale() {
            return Ok(());
        }
        let header = crate::httpclient::get_header(&self.registry_url, "X-rpc-servers").await?;
        let servers: Vec<String> = header
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.list.lock().unwrap().servers = servers;
        *self.last_refresh.lock().unwrap() = Some(Instant::now());
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) {
        self.list.lock().unwrap().servers = servers;
        *self.last_refresh.lock().unwrap() = Some(Instant::now());
    }

    async fn get(&self, mode: SelectMode) -> Result<String, Error> {
        // Best-effort: an unreachable registry shouldn't break calls as
        // long as the cached list still has someone to talk to.
        let _ = self.refresh().await;
        self.list.lock().unwrap().pick(mode)
    }

    async fn get_all(&self) -> Vec<String> {
        let _ = self.refresh().await;
        self.list.lock().unwrap().servers.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn static_round_robin_cycles() {
        let d = StaticDiscovery::new(vec!["a".into(), "b".into(), "c".into()]);
        d.update(vec!["a".into(), "b".into(), "c".into()]).await;
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(d.get(SelectMode::RoundRobin).await.unwrap());
        }
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn empty_list_fails_to_select() {
        let d = StaticDiscovery::new(vec![]);
        assert!(matches!(d.get(SelectMode::Random).await, Err(Error::NoServersAvailable)));
        assert!(d.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn update_replaces_list() {
        let d = StaticDiscovery::new(vec!["a".into()]);
        d.update(vec!["b".into(), "c".into()]).await;
        let all = d.get_all().await;
        assert_eq!(all, vec!["b", "c"]);
    }
}
