//! A small demo server exposing an `Arith` service, for exercising the
//! framework end to end: `meshrpc-server-demo --addr 127.0.0.1:9999`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use meshrpc::server::Server;
use meshrpc::ServiceBuilder;

#[derive(Debug, Parser)]
#[command(about = "meshrpc demo server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:9999")]
    addr: String,

    /// Registry to heartbeat into, e.g. http://localhost:8000/_registry_.
    #[arg(long)]
    registry: Option<String>,

    #[arg(long, default_value = "10")]
    heartbeat_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SumArgs {
    num1: i64,
    num2: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SleepArgs {
    seconds: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let server = Arc::new(Server::new());
    server.register(
        ServiceBuilder::new("Arith")
            .method("Sum", |args: SumArgs| async move { Ok::<i64, String>(args.num1 + args.num2) })
            .method("Sleep", |args: SleepArgs| async move {
                tokio::time::sleep(Duration::from_secs(args.seconds)).await;
                Ok::<u64, String>(args.seconds)
            })
            .build(),
    )?;

    let listener = TcpListener::bind(&args.addr).await?;
    log::info!("listening on {}", args.addr);

    if let Some(registry) = args.registry {
        tokio::spawn(meshrpc::server::heartbeat(
            registry,
            args.addr.clone(),
            Duration::from_secs(args.heartbeat_secs),
        ));
    }

    server.serve_tcp(listener).await?;
    Ok(())
}
