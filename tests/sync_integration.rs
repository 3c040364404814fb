//! End-to-end scenarios over the scripted mock hub.
//!
//! These tests drive a real `HubConnection` against `MockTransport`:
//! the test plays the hub, feeding frames and dropping sessions to force
//! reconnects.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use fxhub::book::model::ViewerIdentity;
use fxhub::cache::{DarkPoolCache, InMemoryDarkPoolCache};
use fxhub::feed::messages::{HubMethod, OutboundFrame};
use fxhub::hub::connection::{ConnectionState, HubConfig, HubConnection};
use fxhub::hub::mock::{MockRemote, MockTransport};
use fxhub::keys::BookKey;

/// Generous upper bound for any single wait.
const STEP: Duration = Duration::from_millis(500);

/// Window after which we declare "no further frames".
const QUIET: Duration = Duration::from_millis(100);

fn hub_config() -> HubConfig {
    HubConfig {
        keep_alive_interval: Duration::from_secs(5),
        server_timeout: Duration::from_secs(15),
        reconnect_delay: Duration::from_millis(10),
        pair_buffer_ttl: Duration::from_secs(30),
    }
}

fn viewer() -> ViewerIdentity {
    ViewerIdentity {
        originator_id: "trader7".to_string(),
        firm: Some("BANKA".to_string()),
        is_broker: false,
    }
}

type Harness = (
    Arc<HubConnection>,
    Arc<MockTransport>,
    mpsc::UnboundedReceiver<MockRemote>,
    Arc<InMemoryDarkPoolCache>,
);

fn harness() -> Harness {
    let (transport, remotes) = MockTransport::new();
    let cache = Arc::new(InMemoryDarkPoolCache::new());
    let hub = HubConnection::new(
        hub_config(),
        viewer(),
        transport.clone(),
        cache.clone(),
    );
    (hub, transport, remotes, cache)
}

async fn wait_for_state(hub: &HubConnection, want: ConnectionState) {
    let mut rx = hub.state_watch();
    timeout(STEP, async {
        while *rx.borrow_and_update() != want {
            rx.changed().await.expect("state sender dropped");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {want:?}"));
}

async fn next_remote(remotes: &mut mpsc::UnboundedReceiver<MockRemote>) -> MockRemote {
    timeout(STEP, remotes.recv())
        .await
        .expect("timed out waiting for a session")
        .expect("transport dropped")
}

/// Next invocation the client sends, skipping keep-alive pings.
async fn recv_invoke(remote: &mut MockRemote) -> Option<(HubMethod, Vec<String>)> {
    loop {
        match timeout(QUIET, remote.from_client.recv()).await {
            Ok(Some(frame)) => match serde_json::from_str::<OutboundFrame>(&frame).unwrap() {
                OutboundFrame::Invoke { method, args, .. } => return Some((method, args)),
                OutboundFrame::Ping => continue,
            },
            _ => return None,
        }
    }
}

/// Drain every invocation currently queued, skipping pings.
async fn drain_invokes(remote: &mut MockRemote) -> Vec<(HubMethod, Vec<String>)> {
    let mut invokes = Vec::new();
    while let Some(invoke) = recv_invoke(remote).await {
        invokes.push(invoke);
    }
    invokes
}

fn entry(
    side: &str,
    price: Option<&str>,
    size: Option<&str>,
    originator: &str,
) -> serde_json::Value {
    let mut value = json!({
        "originator": originator,
        "firm": "BANKB",
        "timestamp": 1709284200000i64,
        "side": side
    });
    if let Some(price) = price {
        value["price"] = json!(price);
    }
    if let Some(size) = size {
        value["size"] = json!(size);
    }
    value
}

fn market_data(key: &BookKey, entries: Vec<serde_json::Value>) -> String {
    let mut frame = json!({
        "type": "marketData",
        "instrument": key.instrument,
        "strategy": key.strategy,
        "tenor": key.tenor,
        "entries": entries,
    });
    if key.channel == fxhub::keys::Channel::DarkPool {
        frame["channel"] = json!("dark");
    }
    frame.to_string()
}

#[tokio::test]
async fn command_recorded_while_disconnected_runs_exactly_once_after_connect() {
    let (hub, _transport, mut remotes, _cache) = harness();

    // Subscribe before any connection exists.
    hub.subscribe_market_data("EURUSD", "Butterfly", "1W");
    assert!(!hub.is_connected());

    hub.clone().connect();
    let mut remote = next_remote(&mut remotes).await;
    wait_for_state(&hub, ConnectionState::Connected).await;

    let invokes = drain_invokes(&mut remote).await;
    assert_eq!(
        invokes,
        vec![(
            HubMethod::SubscribeMarketData,
            vec!["EURUSD".to_string(), "Butterfly".to_string(), "1W".to_string()],
        )]
    );

    hub.shutdown();
}

#[tokio::test]
async fn every_reconnect_replays_exactly_the_recorded_commands() {
    let (hub, _transport, mut remotes, _cache) = harness();

    hub.subscribe_market_data("EURUSD", "ATMF", "1M");
    hub.subscribe_dark_pool_price("EURUSD", "ATMF", "1M");
    hub.clone().connect();

    for _cycle in 0..3 {
        let mut remote = next_remote(&mut remotes).await;
        wait_for_state(&hub, ConnectionState::Connected).await;

        let methods: Vec<HubMethod> = drain_invokes(&mut remote)
            .await
            .into_iter()
            .map(|(method, _)| method)
            .collect();
        assert_eq!(
            methods,
            vec![
                HubMethod::SubscribeMarketData,
                HubMethod::SubscribeDarkPoolPrice,
            ]
        );

        // Hub closes the connection; the client reconnects on its own,
        // which the next iteration observes as a fresh session.
        drop(remote);
    }

    hub.shutdown();
}

#[tokio::test]
async fn unsubscribed_key_is_never_replayed() {
    let (hub, _transport, mut remotes, _cache) = harness();

    let _keep = hub.subscribe_market_data("EURUSD", "ATMF", "1M");
    let gone = hub.subscribe_market_data("EURUSD", "ATMF", "2M");

    hub.clone().connect();
    let mut remote = next_remote(&mut remotes).await;
    wait_for_state(&hub, ConnectionState::Connected).await;
    let initial = drain_invokes(&mut remote).await;
    assert_eq!(initial.len(), 2);

    // Unsubscribe while connected: the unsubscribe call goes out now...
    hub.unsubscribe(gone);
    let invokes = drain_invokes(&mut remote).await;
    assert_eq!(
        invokes,
        vec![(
            HubMethod::UnsubscribeMarketData,
            vec!["EURUSD".to_string(), "ATMF".to_string(), "2M".to_string()],
        )]
    );

    // ...and the key is absent from every later replay.
    drop(remote);
    let mut remote = next_remote(&mut remotes).await;
    wait_for_state(&hub, ConnectionState::Connected).await;

    let replayed = drain_invokes(&mut remote).await;
    assert_eq!(
        replayed,
        vec![(
            HubMethod::SubscribeMarketData,
            vec!["EURUSD".to_string(), "ATMF".to_string(), "1M".to_string()],
        )]
    );

    hub.shutdown();
}

#[tokio::test]
async fn partial_halves_merge_into_one_depth_update() {
    let (hub, _transport, mut remotes, _cache) = harness();
    let key = BookKey::lit("EURUSD", "ATMF", "1M");
    let mut depth_rx = hub.depth_updates(&key);

    hub.clone().connect();
    let remote = next_remote(&mut remotes).await;
    wait_for_state(&hub, ConnectionState::Connected).await;

    // Top half: 2 size-less entries. No update may be published yet.
    remote
        .to_client
        .send(market_data(
            &key,
            vec![
                entry("bid", Some("1.0710"), None, "mm1"),
                entry("ofr", Some("1.0740"), None, "mm2"),
            ],
        ))
        .await
        .unwrap();
    assert!(timeout(QUIET, depth_rx.recv()).await.is_err());

    // Depth half: 4 sized entries completes the pair.
    remote
        .to_client
        .send(market_data(
            &key,
            vec![
                entry("bid", Some("1.0712"), Some("5"), "mm1"),
                entry("bid", Some("1.0708"), Some("3"), "mm3"),
                entry("ofr", Some("1.0739"), Some("4"), "mm2"),
                entry("ofr", Some("1.0744"), Some("6"), "mm4"),
            ],
        ))
        .await
        .unwrap();

    let update = timeout(STEP, depth_rx.recv()).await.unwrap().unwrap();
    assert_eq!(update.key, key);
    assert_eq!(update.row.bid.price, Some(dec!(1.0712)));

    // The merged message carries all 6 entries: 4 live plus 2 informational.
    let orders = hub.projected_orders(&key).unwrap();
    assert_eq!(orders.len(), 6);
    assert_eq!(orders.iter().filter(|o| o.status.is_active()).count(), 4);

    hub.shutdown();
}

#[tokio::test]
async fn dark_pool_tagged_update_is_delivered_immediately() {
    let (hub, _transport, mut remotes, _cache) = harness();
    let key = BookKey::dark_pool("EURUSD", "ATMF", "1M");
    let mut depth_rx = hub.depth_updates(&key);

    hub.clone().connect();
    let remote = next_remote(&mut remotes).await;
    wait_for_state(&hub, ConnectionState::Connected).await;

    remote
        .to_client
        .send(market_data(
            &key,
            vec![entry("bid", Some("1.0709"), Some("2"), "anon")],
        ))
        .await
        .unwrap();

    // No counterpart required.
    let update = timeout(STEP, depth_rx.recv()).await.unwrap().unwrap();
    assert_eq!(update.key, key);
    assert_eq!(update.row.bid.price, Some(dec!(1.0709)));

    hub.shutdown();
}

#[tokio::test]
async fn dark_pool_price_updates_cache_and_channel() {
    let (hub, _transport, mut remotes, cache) = harness();
    let key = BookKey::dark_pool("EURUSD", "ATMF", "1M");
    let mut dark_rx = hub.dark_pool_ticks(&key);

    hub.clone().connect();
    let remote = next_remote(&mut remotes).await;
    wait_for_state(&hub, ConnectionState::Connected).await;

    remote
        .to_client
        .send(
            json!({
                "type": "darkPoolPrice",
                "instrument": "EURUSD",
                "strategy": "ATMF",
                "tenor": "1M",
                "price": "1.0711"
            })
            .to_string(),
        )
        .await
        .unwrap();

    let tick = timeout(STEP, dark_rx.recv()).await.unwrap().unwrap();
    assert_eq!(tick.price, Some(dec!(1.0711)));
    assert_eq!(cache.get(&key), Some(dec!(1.0711)));

    hub.shutdown();
}

#[tokio::test]
async fn cached_dark_pool_price_pre_populates_before_first_live_update() {
    let (hub, _transport, _remotes, cache) = harness();
    let key = BookKey::dark_pool("EURUSD", "ATMF", "1M");
    cache.set(&key, Some(dec!(1.0699)));

    // Channel subscription first, then the command; no connection at all.
    let mut dark_rx = hub.dark_pool_ticks(&key);
    hub.subscribe_dark_pool_price("EURUSD", "ATMF", "1M");

    let tick = timeout(STEP, dark_rx.recv()).await.unwrap().unwrap();
    assert_eq!(tick.price, Some(dec!(1.0699)));
}

#[tokio::test]
async fn malformed_frame_does_not_affect_later_frames() {
    let (hub, _transport, mut remotes, _cache) = harness();
    let key = BookKey::lit("EURUSD", "ATMF", "1M");
    let mut depth_rx = hub.depth_updates(&key);

    hub.clone().connect();
    let remote = next_remote(&mut remotes).await;
    wait_for_state(&hub, ConnectionState::Connected).await;

    remote
        .to_client
        .send("{not json at all".to_string())
        .await
        .unwrap();
    remote
        .to_client
        .send(market_data(&key, vec![entry("bid", Some("1.0710"), None, "mm1")]))
        .await
        .unwrap();
    remote
        .to_client
        .send(market_data(
            &key,
            vec![entry("bid", Some("1.0712"), Some("5"), "mm1")],
        ))
        .await
        .unwrap();

    let update = timeout(STEP, depth_rx.recv()).await.unwrap().unwrap();
    assert_eq!(update.row.bid.price, Some(dec!(1.0712)));
    assert!(hub.is_connected());

    hub.shutdown();
}

#[tokio::test]
async fn pairing_violation_is_contained_to_that_pair() {
    let (hub, _transport, mut remotes, _cache) = harness();
    let key = BookKey::lit("EURUSD", "ATMF", "1M");
    let mut depth_rx = hub.depth_updates(&key);

    hub.clone().connect();
    let remote = next_remote(&mut remotes).await;
    wait_for_state(&hub, ConnectionState::Connected).await;

    // Two depth halves in a row: a protocol violation, both dropped.
    for _ in 0..2 {
        remote
            .to_client
            .send(market_data(
                &key,
                vec![entry("bid", Some("1.0712"), Some("5"), "mm1")],
            ))
            .await
            .unwrap();
    }
    assert!(timeout(QUIET, depth_rx.recv()).await.is_err());

    // A fresh, well-formed pair still merges.
    remote
        .to_client
        .send(market_data(&key, vec![entry("bid", Some("1.0710"), None, "mm1")]))
        .await
        .unwrap();
    remote
        .to_client
        .send(market_data(
            &key,
            vec![entry("bid", Some("1.0713"), Some("2"), "mm2")],
        ))
        .await
        .unwrap();

    let update = timeout(STEP, depth_rx.recv()).await.unwrap().unwrap();
    assert_eq!(update.row.bid.price, Some(dec!(1.0713)));
    assert!(hub.is_connected());

    hub.shutdown();
}

#[tokio::test]
async fn offline_stops_the_session_and_online_reconnects_immediately() {
    let (hub, transport, mut remotes, _cache) = harness();

    hub.clone().connect();
    let remote = next_remote(&mut remotes).await;
    wait_for_state(&hub, ConnectionState::Connected).await;

    hub.notify_offline();
    wait_for_state(&hub, ConnectionState::Disconnected).await;
    drop(remote);

    // While offline, no reconnect attempts are made.
    let attempts_while_offline = transport.connect_count();
    assert!(timeout(QUIET, remotes.recv()).await.is_err());
    assert_eq!(transport.connect_count(), attempts_while_offline);

    hub.notify_online();
    let _remote = next_remote(&mut remotes).await;
    wait_for_state(&hub, ConnectionState::Connected).await;

    hub.shutdown();
}

#[tokio::test]
async fn failed_connects_are_retried_until_the_hub_answers() {
    let (hub, transport, mut remotes, _cache) = harness();
    transport.fail_next_connects(3);

    hub.subscribe_market_data("EURUSD", "ATMF", "1M");
    hub.clone().connect();

    // Retries burn through the scripted failures, then connect.
    let mut remote = next_remote(&mut remotes).await;
    wait_for_state(&hub, ConnectionState::Connected).await;
    assert!(transport.connect_count() >= 4);

    let invokes = drain_invokes(&mut remote).await;
    assert_eq!(invokes.len(), 1);

    hub.shutdown();
}
