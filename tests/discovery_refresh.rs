use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use meshrpc::discovery::{Discovery, RegistryDiscovery, StaticDiscovery};
use meshrpc::SelectMode;

/// A registry stub that answers `X-rpc-servers: tcp@a:1` on its first hit
/// and `X-rpc-servers: tcp@b:2,tcp@c:3` on every hit after that, so tests
/// can observe a TTL boundary.
async fn spawn_registry_stub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let hits = hits.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let n = hits.fetch_add(1, Ordering::SeqCst);
                let servers = if n == 0 { "tcp@a:1" } else { "tcp@b:2,tcp@c:3" };
                let response = format!(
                    "HTTP/1.0 200 OK\r\nX-rpc-servers: {}\r\nContent-Length: 0\r\n\r\n",
                    servers
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("http://{}/_registry_", addr)
}

#[tokio::test]
async fn get_all_reflects_an_explicit_update() {
    let discovery = StaticDiscovery::new(vec!["tcp@a:1".into()]);
    assert_eq!(discovery.get_all().await, vec!["tcp@a:1"]);

    discovery.update(vec!["tcp@b:2".into(), "tcp@c:3".into()]).await;
    assert_eq!(discovery.get_all().await, vec!["tcp@b:2", "tcp@c:3"]);
}

#[tokio::test]
async fn round_robin_visits_every_endpoint_before_repeating() {
    let discovery = StaticDiscovery::new(vec!["a".into(), "b".into()]);
    let first = discovery.get(SelectMode::RoundRobin).await.unwrap();
    let second = discovery.get(SelectMode::RoundRobin).await.unwrap();
    let third = discovery.get(SelectMode::RoundRobin).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(first, third);
}

#[tokio::test]
async fn refresh_is_a_no_op_for_static_discovery() {
    let discovery = StaticDiscovery::new(vec!["a".into()]);
    discovery.refresh().await.unwrap();
    assert_eq!(discovery.get_all().await, vec!["a"]);
}

#[tokio::test]
async fn registry_discovery_does_not_panic_when_unreachable() {
    let discovery = RegistryDiscovery::new("http://127.0.0.1:1/_registry_", Duration::from_secs(30));
    let all = discovery.get_all().await;
    assert!(all.is_empty());
}

#[tokio::test]
async fn registry_discovery_refreshes_once_the_ttl_elapses() {
    let registry_url = spawn_registry_stub().await;
    let discovery = RegistryDiscovery::new(registry_url, Duration::from_millis(100));

    assert_eq!(discovery.get_all().await, vec!["tcp@a:1"]);
    // Still within the TTL: the cached list is returned without another hit.
    assert_eq!(discovery.get_all().await, vec!["tcp@a:1"]);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(discovery.get_all().await, vec!["tcp@b:2", "tcp@c:3"]);
}
