use std::sync::Arc;

pub(crate) const DEFAULT_RPC_PATH: &str = "/_mesh_rpc_";

/// Server-side knobs. The per-call handle timeout is *not* configured
/// here: it travels in with each connection's session option, announced
/// by the client and enforced by the server.
#[derive(Debug, Clone)]
pub struct Config {
    /// The path a client must `CONNECT` to before the server will treat
    /// the socket as a raw RPC connection.
    pub rpc_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rpc_path: DEFAULT_RPC_PATH.to_string(),
        }
    }
}

impl Config {
    /// Create a config with defaults.
    pub fn new() -> Config {
        Config::default()
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
