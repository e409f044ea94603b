//! A small demo client for the `Arith` service exposed by
//! `meshrpc-server-demo`: `meshrpc-client-demo --addr 127.0.0.1:9999 sum 2 3`.

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use meshrpc::client::{self, Config};

#[derive(Debug, Parser)]
#[command(about = "meshrpc demo client")]
struct Args {
    /// Endpoint to dial, e.g. tcp@127.0.0.1:9999 or http@127.0.0.1:9999.
    #[arg(long, default_value = "127.0.0.1:9999")]
    addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Sum { num1: i64, num2: i64 },
    Sleep { seconds: u64 },
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

    let config = Config::new().connection_timeout(Duration::from_secs(5)).done();
    let client = client::xdial(&args.addr, &config).await?;

    match args.command {
        Command::Sum { num1, num2 } => {
            let reply: i64 = client
                .call("Arith.Sum", &SumArgs { num1, num2 }, Some(Duration::from_secs(5)))
                .await?;
            println!("{}", reply);
        }
        Command::Sleep { seconds } => {
            let reply: u64 = client
                .call(
                    "Arith.Sleep",
                    &SleepArgs { seconds },
                    Some(Duration::from_secs(seconds + 5)),
                )
                .await?;
            println!("slept {}", reply);
        }
    }

    client.close().await?;
    Ok(())
}
