mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use meshrpc::client::Config;
use meshrpc::discovery::StaticDiscovery;
use meshrpc::SelectMode;
use meshrpc::XClient;

#[tokio::test]
async fn broadcast_does_not_wait_full_deadline_once_an_endpoint_succeeds() {
    let fast_addr = common::spawn_arith_server().await;
    let slow_addr = common::spawn_arith_server().await;

    let discovery = Arc::new(StaticDiscovery::new(vec![fast_addr, slow_addr]));
    let config = Config::new().done();
    let xclient = XClient::new(discovery, SelectMode::Random, config);

    let started = Instant::now();
    let reply: f64 = xclient
        .broadcast(
            "Arith.Sleep",
            &common::SleepArgs { seconds: 0.05 },
            Some(Duration::from_secs(3)),
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(reply, 0.05);
    assert!(elapsed < Duration::from_secs(1), "broadcast took {:?}", elapsed);
}

#[tokio::test]
async fn broadcast_deadline_fires_while_facade_stays_usable() {
    let fast_addr = common::spawn_arith_server().await;
    let slow_addr = common::spawn_arith_server().await;

    let discovery = Arc::new(StaticDiscovery::new(vec![fast_addr, slow_addr.clone()]));
    let config = Config::new().done();
    let xclient = XClient::new(discovery, SelectMode::Random, config.clone());

    // One endpoint would need 10s to answer; the shared deadline is 1s, so
    // broadcast must come back quickly with an error rather than wait.
    let started = Instant::now();
    let result: Result<f64, _> = xclient
        .broadcast(
            "Arith.Sleep",
            &common::SleepArgs { seconds: 10.0 },
            Some(Duration::from_secs(1)),
        )
        .await;
    let elapsed = started.elapsed();

    assert!(result.is_err());
    assert!(elapsed < Duration::from_secs(2), "broadcast took {:?}", elapsed);

    // The facade itself, and a fresh call through it, must still work.
    let discovery2 = Arc::new(StaticDiscovery::new(vec![slow_addr]));
    let xclient2 = XClient::new(discovery2, SelectMode::Random, config);
    let reply: i64 = xclient2
        .call("Arith.Sum", &common::SumArgs { num1: 5, num2: 5 }, Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(reply, 10);
}

#[tokio::test]
async fn broadcast_surfaces_the_first_error_seen() {
    let good_addr = common::spawn_arith_server().await;
    // An address nothing is listening on: dialing it fails immediately.
    let unreachable = "127.0.0.1:1".to_string();

    let discovery = Arc::new(StaticDiscovery::new(vec![good_addr, unreachable]));
    let config = Config::new().done();
    let xclient = XClient::new(discovery, SelectMode::Random, config);

    let result: Result<i64, _> = xclient
        .broadcast("Arith.Sum", &common::SumArgs { num1: 1, num2: 1 }, Some(Duration::from_secs(2)))
        .await;

    assert!(result.is_err(), "expected broadcast to surface the dial failure");
}
