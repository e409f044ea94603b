use std::sync::Arc;
use std::time::Duration;

use crate::option::SessionOption;

pub(crate) const DEFAULT_RPC_PATH: &str = "/_mesh_rpc_";

/// Everything a dial needs beyond the bare endpoint string: the session
/// option to announce, and the path to CONNECT through for `http@`
/// endpoints.
#[derive(Debug, Clone)]
pub struct Config {
    pub option: SessionOption,
    pub rpc_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            option: SessionOption::default(),
            rpc_path: DEFAULT_RPC_PATH.to_string(),
        }
    }
}

impl Config {
    /// Create a config with defaults: `Config::new().connection_timeout(..).done()`.
    pub fn new() -> Config {
        Config::default()
    }

    pub fn connection_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.option.connection_timeout = timeout;
        self
    }

    /// Only meaningful when the server on the other end honors it; the
    /// client merely announces it in the session option.
    pub fn handle_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.option.handle_timeout = timeout;
        self
    }

    pub fn rpc_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.rpc_path = path.into();
        self
    }

    /// Create an `Arc`'d config clone to pass to the constructor.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }
}
