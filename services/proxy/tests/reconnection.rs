//! Supervised reconnection: a dropped upstream is replaced by a fresh
//! connection in the same pool, and the data path keeps working.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use nostr_proto::test_support::{event_frame, signed_event};
use nostr_proxy::Proxy;
use nostr_proxy::config::{PoolKind, ProxyConfig, RelayEndpoint};
use np_test_utils::{MockRelay, MockWsClient};
use tokio::time::{sleep, timeout};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[tokio::test]
async fn dropped_upstream_reconnects_into_the_same_pool() {
    let relay = MockRelay::start().await.expect("start mock relay");

    let mut config = ProxyConfig::new(LOCALHOST, 0);
    config.public_servers =
        vec![RelayEndpoint::parse(&relay.url(), PoolKind::Public).expect("mock relay URL parses")];
    // Shortened recovery knobs keep the test fast; the state machine is
    // the same one production runs with [1s, 5s].
    config.connect_retry = Duration::from_millis(200);
    config.recover_backoff_min = Duration::from_millis(100);
    config.recover_backoff_max = Duration::from_millis(300);

    let proxy = Proxy::bind(config).await.expect("bind proxy");
    let addr = proxy.local_addr().expect("local addr");
    let engine = proxy.engine();
    tokio::spawn(proxy.run());

    timeout(Duration::from_secs(5), async {
        while relay.accepted_count() < 1 {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("timeout waiting for initial connection");

    relay.disconnect_all().await;

    // The supervisor must come back with a fresh connection after backoff.
    timeout(Duration::from_secs(5), async {
        while relay.accepted_count() < 2 {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("timeout waiting for reconnection");

    timeout(Duration::from_secs(5), async {
        while engine.upstream_count(PoolKind::Public) != 1 || relay.peer_count().await != 1 {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("timeout waiting for re-registration");
    assert_eq!(engine.upstream_count(PoolKind::Private), 0);

    // The replacement connection carries traffic end to end.
    let mut client = MockWsClient::connect(&format!("ws://{}", addr))
        .await
        .expect("client connect");
    timeout(Duration::from_secs(5), async {
        while engine.client_count() != 1 {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("timeout waiting for client registration");

    let frame = event_frame("sub", &signed_event("back online"));
    relay.push(&frame).await;
    let received = timeout(Duration::from_secs(5), client.recv_text())
        .await
        .expect("frame delivery timed out")
        .expect("recv");
    assert_eq!(received, frame);
}

#[tokio::test]
async fn unreachable_upstream_keeps_retrying_without_registering() {
    // Grab a port that nothing is listening on.
    let throwaway = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind throwaway");
    let dead_addr = throwaway.local_addr().expect("local addr");
    drop(throwaway);

    let mut config = ProxyConfig::new(LOCALHOST, 0);
    config.public_servers = vec![
        RelayEndpoint::parse(&format!("ws://{}", dead_addr), PoolKind::Public)
            .expect("URL parses"),
    ];
    config.connect_retry = Duration::from_millis(100);

    let proxy = Proxy::bind(config).await.expect("bind proxy");
    let engine = proxy.engine();
    tokio::spawn(proxy.run());

    // Give the supervisor several connect attempts; the pool must stay empty.
    sleep(Duration::from_millis(500)).await;
    assert_eq!(engine.upstream_count(PoolKind::Public), 0);
}
