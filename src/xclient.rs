//! A facade over discovery: resolves a logical service to a concrete
//! endpoint (or all of them), dials lazily, and keeps dialed clients
//! around in a small pool keyed by endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;

use crate::client::{self, Client, Config as ClientConfig};
use crate::discovery::{Discovery, SelectMode};
use crate::error::Error;

/// Load-balances calls across whatever [`Discovery`] resolves to, and can
/// fan a call out to every known endpoint at once.
pub struct XClient<D: Discovery + 'static> {
    discovery: Arc<D>,
    mode: SelectMode,
    config: Arc<ClientConfig>,
    pool: Mutex<HashMap<String, Arc<Client>>>,
}

impl<D: Discovery + 'static> XClient<D> {
    pub fn new(discovery: Arc<D>, mode: SelectMode, config: Arc<ClientConfig>) -> Self {
        XClient {
            discovery,
            mode,
            config,
            pool: Mutex::new(HashMap::new()),
        }
    }

    async fn dial(&self, endpoint: &str) -> Result<Arc<Client>, Error> {
        let mut pool = self.pool.lock().await;
        if let Some(client) = pool.get(endpoint) {
            if client.is_available().await {
                return Ok(client.clone());
            }
            pool.remove(endpoint);
        }
        let client = Arc::new(client::xdial(endpoint, &self.config).await.map_err(Error::Client)?);
        pool.insert(endpoint.to_string(), client.clone());
        Ok(client)
    }

    /// Resolves one endpoint via discovery and calls it.
    pub async fn call<Req: Serialize, Res: DeserializeOwned>(
        &self,
        service_method: &str,
        args: &Req,
        deadline: Option<Duration>,
    ) -> Result<Res, Error> {
        let endpoint = self.discovery.get(self.mode).await.map_err(Error::Discovery)?;
        let client = self.dial(&endpoint).await?;
        client.call(service_method, args, deadline).await.map_err(Error::Client)
    }

    /// Calls every endpoint discovery currently knows about. Returns the
    /// first error seen across all of them, or the last successfully
    /// decoded reply if none failed. Once any endpoint fails, the others
    /// are no longer waited on past their own deadline: their eventual
    /// replies are simply dropped.
    pub async fn broadcast<Req, Res>(
        &self,
        service_method: &str,
        args: &Req,
        deadline: Option<Duration>,
    ) -> Result<Res, Error>
    where
        Req: Serialize,
        Res: DeserializeOwned + Send + 'static,
    {
        let endpoints = self.discovery.get_all().await;
        if endpoints.is_empty() {
            return Err(Error::Discovery(crate::discovery::Error::NoServersAvailable));
        }
        let args_bytes = bincode::serialize(args).map_err(Error::Encode)?;

        let first_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
        let last_reply: Arc<Mutex<Option<Res>>> = Arc::new(Mutex::new(None));
        let cancel = Arc::new(Notify::new());

        let mut tasks: JoinSet<()> = JoinSet::new();
        for endpoint in endpoints {
            let client = match self.dial(&endpoint).await {
                Ok(client) => client,
                Err(err) => {
                    let mut first_error = first_error.lock().await;
                    if first_error.is_none() {
                        *first_error = Some(err);
                    }
                    cancel.notify_waiters();
                    continue;
                }
            };
            let service_method = service_method.to_string();
            let args_bytes = args_bytes.clone();
            let first_error = first_error.clone();
            let last_reply = last_reply.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                tokio::select! {
                    result = client.call_raw(&service_method, args_bytes, deadline) => {
                        match result {
                            Ok(bytes) => match bincode::deserialize::<Res>(&bytes) {
                                Ok(reply) => {
                                    *last_reply.lock().await = Some(reply);
                                }
                                Err(err) => {
                                    let mut first_error = first_error.lock().await;
                                    if first_error.is_none() {
                                        *first_error = Some(Error::Decode(err));
                                    }
                                    cancel.notify_waiters();
                                }
                            },
                            Err(err) => {
                                let mut first_error = first_error.lock().await;
                                if first_error.is_none() {
                                    *first_error = Some(Error::Client(err));
                                }
                                cancel.notify_waiters();
                            }
                        }
                    }
                    _ = cancel.notified() => {
                        // A sibling endpoint already failed; abandon waiting on
                        // this one rather than hold the caller past a deadline
                        // it has effectively already missed.
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}

        if let Some(err) = first_error.lock().await.take() {
            return Err(err);
        }
        let reply = last_reply
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Discovery(crate::discovery::Error::NoServersAvailable));
        reply
    }

    /// Closes and forgets every pooled client.
    pub async fn close(&self) {
        let mut pool = self.pool.lock().await;
        for (_, client) in pool.drain() {
            let _ = client.close().await;
        }
    }
}
