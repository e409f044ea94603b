mod common;

use std::time::Duration;

use meshrpc::client;
use meshrpc::client::Config;

#[tokio::test]
async fn client_deadline_fires_independently_of_server_handle_timeout() {
    let addr = common::spawn_arith_server().await;
    // No handle_timeout announced: the server will run the handler to
    // completion regardless. The client still must not wait past its own
    // deadline.
    let config = Config::new().done();
    let client = client::xdial(&addr, &config).await.unwrap();

    let result: Result<f64, _> = client
        .call("Arith.Sleep", &common::SleepArgs { seconds: 1.0 }, Some(Duration::from_millis(100)))
        .await;

    assert!(matches!(result, Err(client::Error::CallTimeout)));

    // The connection must still be usable for later calls once the
    // abandoned reply eventually shows up and is silently discarded.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let reply: i64 = client
        .call("Arith.Sum", &common::SumArgs { num1: 2, num2: 2 }, Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(reply, 4);
}
