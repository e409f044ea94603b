use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use meshrpc::server::Server;
use meshrpc::ServiceBuilder;

#[derive(Debug, Serialize, Deserialize)]
pub struct SumArgs {
    pub num1: i64,
    pub num2: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SleepArgs {
    pub seconds: f64,
}

/// An `Arith` service with `Sum` (instant) and `Sleep` (returns after the
/// requested delay) methods, used by every integration test.
pub fn arith_service() -> meshrpc::ServiceBinding {
    ServiceBuilder::new("Arith")
        .method("Sum", |args: SumArgs| async move { Ok::<i64, String>(args.num1 + args.num2) })
        .method("Sleep", |args: SleepArgs| async move {
            tokio::time::sleep(Duration::from_secs_f64(args.seconds)).await;
            Ok::<f64, String>(args.seconds)
        })
        .build()
}

/// Starts a server with the `Arith` service bound to an ephemeral port and
/// returns its address. The server keeps running for the life of the test
/// process (tests run in their own process per binary).
pub async fn spawn_arith_server() -> String {
    spawn_arith_server_with_config(Arc::new(Default::default())).await
}

pub async fn spawn_arith_server_with_config(config: Arc<meshrpc::server::Config>) -> String {
    let server = Arc::new(Server::with_config(config));
    server.register(arith_service()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(server.serve_tcp(listener));
    addr
}
