//! Hub connection lifecycle: connect, health-check, reconnect, replay,
//! and inbound frame dispatch.
//!
//! The connection is an explicit handle owned by the application context
//! and injected into consumers. Transport failures are never surfaced to
//! callers; they are retried internally and observable only through the
//! state watch and the connected/disconnected callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::book::depth::{DepthRow, DepthTableBuilder};
use crate::book::model::{BookStore, Order, ViewerIdentity};
use crate::book::pending::{project, PendingAction, PendingActions};
use crate::cache::DarkPoolCache;
use crate::feed::channels::{BookChannels, DarkPoolTick, DepthUpdate};
use crate::feed::messages::{
    DarkPoolPriceFrame, InboundFrame, MarketDataFrame, MergedMessage, OutboundFrame,
};
use crate::feed::reassembler::MessageReassembler;
use crate::hub::registry::{Command, CommandHandle, SubscriptionRegistry};
use crate::hub::transport::{HubTransport, TransportSession};
use crate::keys::{BookKey, Side};
use crate::metrics;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Attempting to connect.
    Connecting,
    /// Connected; subscriptions replayed.
    Connected,
}

/// Timing parameters of one connection.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Keep-alive ping interval.
    pub keep_alive_interval: Duration,
    /// Hard server-side timeout: no inbound frame within this window
    /// tears the session down.
    pub server_timeout: Duration,
    /// Fixed delay between reconnect attempts. Retries indefinitely; no
    /// backoff growth, no attempt cap.
    pub reconnect_delay: Duration,
    /// Eviction TTL for a buffered half whose counterpart never arrives.
    pub pair_buffer_ttl: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(15),
            server_timeout: Duration::from_secs(45),
            reconnect_delay: Duration::from_secs(5),
            pair_buffer_ttl: Duration::from_secs(30),
        }
    }
}

/// Point-in-time connection status for observability surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Whether a reconnect is scheduled.
    pub reconnect_pending: bool,
    /// Last known OS-level online state.
    pub online: bool,
    /// Number of recorded subscription commands.
    pub recorded_commands: usize,
    /// Number of buffered unpaired halves.
    pub buffered_halves: usize,
}

type Callback = Box<dyn Fn() + Send + Sync>;

/// One hub connection and the synchronization state it drives.
pub struct HubConnection {
    cfg: HubConfig,
    viewer: ViewerIdentity,
    transport: Arc<dyn HubTransport>,
    cache: Arc<dyn DarkPoolCache>,

    registry: SubscriptionRegistry,
    reassembler: MessageReassembler,
    books: BookStore,
    pending: PendingActions,
    depth: DepthTableBuilder,
    channels: BookChannels,

    state_tx: watch::Sender<ConnectionState>,
    online_tx: watch::Sender<bool>,
    shutdown_tx: watch::Sender<bool>,
    reconnect_pending: AtomicBool,
    running: AtomicBool,

    connected_callbacks: Mutex<Vec<Callback>>,
    disconnected_callbacks: Mutex<Vec<Callback>>,
}

impl HubConnection {
    /// Create a connection handle. Nothing happens until [`connect`].
    ///
    /// [`connect`]: HubConnection::connect
    pub fn new(
        cfg: HubConfig,
        viewer: ViewerIdentity,
        transport: Arc<dyn HubTransport>,
        cache: Arc<dyn DarkPoolCache>,
    ) -> Arc<Self> {
        let reassembler = MessageReassembler::new(cfg.pair_buffer_ttl);
        Arc::new(Self {
            cfg,
            viewer,
            transport,
            cache,
            registry: SubscriptionRegistry::new(),
            reassembler,
            books: BookStore::new(),
            pending: PendingActions::new(),
            depth: DepthTableBuilder::new(),
            channels: BookChannels::new(),
            state_tx: watch::channel(ConnectionState::Disconnected).0,
            online_tx: watch::channel(true).0,
            shutdown_tx: watch::channel(false).0,
            reconnect_pending: AtomicBool::new(false),
            running: AtomicBool::new(false),
            connected_callbacks: Mutex::new(Vec::new()),
            disconnected_callbacks: Mutex::new(Vec::new()),
        })
    }

    // === Lifecycle ===

    /// Start the connection supervisor. Idempotent: a no-op while a
    /// supervisor is already running.
    pub fn connect(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("connect() ignored; supervisor already running");
            return;
        }
        self.shutdown_tx.send_replace(false);

        tokio::spawn(async move { self.supervise().await });
    }

    /// Tear the connection down. The supervisor exits after the current
    /// session (if any) is dropped; [`connect`] may be called again.
    ///
    /// [`connect`]: HubConnection::connect
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// OS-level offline signal: force-stop the live session.
    pub fn notify_offline(&self) {
        self.online_tx.send_replace(false);
    }

    /// OS-level online signal: trigger an immediate reconnect attempt.
    pub fn notify_online(&self) {
        self.online_tx.send_replace(true);
    }

    /// Watch the lifecycle state.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Whether the connection is up.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Point-in-time status snapshot.
    pub fn status(&self) -> HubStatus {
        HubStatus {
            state: self.state(),
            reconnect_pending: self.reconnect_pending.load(Ordering::SeqCst),
            online: *self.online_tx.borrow(),
            recorded_commands: self.registry.len(),
            buffered_halves: self.reassembler.buffered_len(),
        }
    }

    /// Register a callback fired on every transition into Connected.
    pub fn on_connected(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.connected_callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(callback));
    }

    /// Register a callback fired on every transition out of Connected.
    pub fn on_disconnected(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.disconnected_callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(callback));
    }

    // === Subscriptions ===

    /// Subscribe to lit market data for one line. The intent is recorded
    /// first (it survives reconnects) and sent now if connected.
    pub fn subscribe_market_data(
        &self,
        instrument: &str,
        strategy: &str,
        tenor: &str,
    ) -> CommandHandle {
        self.registry
            .record_and_run(Command::subscribe_market_data(instrument, strategy, tenor))
    }

    /// Subscribe to the dark-pool price of one line. Pre-populates the
    /// dark-pool channel from the durable cache, so subscribe to
    /// [`dark_pool_ticks`] before calling this.
    ///
    /// [`dark_pool_ticks`]: HubConnection::dark_pool_ticks
    pub fn subscribe_dark_pool_price(
        &self,
        instrument: &str,
        strategy: &str,
        tenor: &str,
    ) -> CommandHandle {
        let key = BookKey::dark_pool(instrument, strategy, tenor);
        if let Some(price) = self.cache.get(&key) {
            self.channels.publish_dark_pool(DarkPoolTick {
                key,
                price: Some(price),
                at: OffsetDateTime::now_utc(),
            });
        }
        self.registry.record_and_run(Command::subscribe_dark_pool_price(
            instrument, strategy, tenor,
        ))
    }

    /// Subscribe to the message blotter for a user filter.
    pub fn subscribe_message_blotter(&self, user_filter: &str) -> CommandHandle {
        self.registry
            .record_and_run(Command::subscribe_message_blotter(user_filter))
    }

    /// Unsubscribe a previously recorded intent. The local record is
    /// erased immediately — even with a call in flight, a late response
    /// cannot trigger resubscription — and the matching unsubscribe call
    /// is sent if connected.
    pub fn unsubscribe(&self, handle: CommandHandle) {
        if let Some(command) = self.registry.erase(handle) {
            if let Some(unsubscribe) = command.unsubscribe_counterpart() {
                self.registry.run(&unsubscribe);
            }
        }
    }

    /// The subscription registry (observability and tests).
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    // === Consumer surface ===

    /// Depth-row notifications for one key.
    pub fn depth_updates(&self, key: &BookKey) -> broadcast::Receiver<DepthUpdate> {
        self.channels.subscribe_depth(key)
    }

    /// Dark-pool price notifications for one key.
    pub fn dark_pool_ticks(&self, key: &BookKey) -> broadcast::Receiver<DarkPoolTick> {
        self.channels.subscribe_dark_pool(key)
    }

    /// Current lit depth row for one key.
    pub fn depth_row(&self, key: &BookKey) -> Option<DepthRow> {
        self.depth.row(key)
    }

    /// Confirmed orders for one key with in-flight transient facets
    /// projected on.
    pub fn projected_orders(&self, key: &BookKey) -> Option<Vec<Order>> {
        self.books.get(key).map(|orders| project(&orders, &self.pending))
    }

    /// Mark a local create/cancel action in flight for one side.
    pub fn mark_pending(&self, key: &BookKey, side: Side, action: PendingAction) {
        self.pending.mark(key, side, action);
    }

    /// Clear a pending mark once the action is confirmed.
    pub fn clear_pending(&self, key: &BookKey, side: Side) {
        self.pending.clear(key, side);
    }

    // === Supervisor ===

    async fn supervise(self: Arc<Self>) {
        let mut online_rx = self.online_tx.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // Wait out an offline period before attempting anything.
            while !*online_rx.borrow_and_update() {
                tokio::select! {
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            self.finish();
                            return;
                        }
                    }
                    _ = shutdown_rx.changed() => {}
                }
                if *shutdown_rx.borrow() {
                    self.finish();
                    return;
                }
            }

            self.state_tx.send_replace(ConnectionState::Connecting);

            match self.transport.connect().await {
                Ok(session) => {
                    self.reconnect_pending.store(false, Ordering::SeqCst);
                    self.registry.attach(session.outbound.clone());
                    self.registry.replay_all();
                    self.state_tx.send_replace(ConnectionState::Connected);
                    self.fire(&self.connected_callbacks);
                    info!("Hub connected");

                    self.run_session(session, &mut online_rx, &mut shutdown_rx)
                        .await;

                    self.registry.detach();
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                    self.fire(&self.disconnected_callbacks);
                    info!("Hub disconnected");
                }
                Err(e) => {
                    warn!(error = %e, "Hub connection attempt failed");
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                }
            }

            if *shutdown_rx.borrow() {
                break;
            }

            // Fixed-delay reconnect; an online transition wakes it early.
            self.reconnect_pending.store(true, Ordering::SeqCst);
            metrics::inc_reconnects();
            debug!(
                delay_ms = self.cfg.reconnect_delay.as_millis() as u64,
                "Reconnecting after delay"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.cfg.reconnect_delay) => {}
                _ = online_rx.changed() => {}
                _ = shutdown_rx.changed() => {}
            }
        }

        self.finish();
    }

    fn finish(&self) {
        self.state_tx.send_replace(ConnectionState::Disconnected);
        self.running.store(false, Ordering::SeqCst);
    }

    async fn run_session(
        &self,
        mut session: TransportSession,
        online_rx: &mut watch::Receiver<bool>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let mut keepalive = tokio::time::interval(self.cfg.keep_alive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                frame = session.inbound.recv() => match frame {
                    Some(text) => {
                        last_inbound = Instant::now();
                        self.handle_frame(&text);
                    }
                    None => {
                        warn!("Hub session closed");
                        break;
                    }
                },
                _ = keepalive.tick() => {
                    if last_inbound.elapsed() > self.cfg.server_timeout {
                        warn!(
                            timeout_s = self.cfg.server_timeout.as_secs(),
                            "Server timeout exceeded; dropping session"
                        );
                        break;
                    }
                    let Ok(ping) = serde_json::to_string(&OutboundFrame::Ping) else {
                        continue;
                    };
                    if session.outbound.try_send(ping).is_err() {
                        warn!("Failed to queue keep-alive ping; dropping session");
                        break;
                    }
                }
                _ = online_rx.changed() => {
                    if !*online_rx.borrow() {
                        info!("Offline signal; force-stopping session");
                        break;
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    fn fire(&self, callbacks: &Mutex<Vec<Callback>>) {
        let callbacks = callbacks.lock().unwrap_or_else(|e| e.into_inner());
        for callback in callbacks.iter() {
            callback();
        }
    }

    // === Frame dispatch ===

    fn handle_frame(&self, text: &str) {
        let start = Instant::now();
        metrics::inc_frames_received();

        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                // One bad frame never affects the session or other keys.
                metrics::inc_decode_failures();
                warn!(error = %e, "Dropping undecodable frame");
                return;
            }
        };

        match frame {
            InboundFrame::Pong => {}
            InboundFrame::InvokeResult { id, status } => self.registry.complete(id, &status),
            InboundFrame::DarkPoolPrice(frame) => self.apply_dark_pool_price(frame),
            InboundFrame::MarketData(frame) => self.apply_market_data(frame),
        }

        metrics::record_frame_latency(start);
    }

    fn apply_market_data(&self, frame: MarketDataFrame) {
        let update = match frame.decode() {
            Ok(update) => update,
            Err(e) => {
                metrics::inc_decode_failures();
                warn!(error = %e, "Dropping undecodable market-data frame");
                return;
            }
        };

        match self.reassembler.ingest(update) {
            Ok(None) => {}
            Ok(Some(merged)) => self.apply_merged(merged),
            Err(e) => {
                metrics::inc_pairing_violations();
                error!(error = %e, "Protocol violation in paired update");
            }
        }
    }

    fn apply_merged(&self, merged: MergedMessage) {
        metrics::inc_merges();
        let orders = self
            .books
            .replace(&merged.key, &merged.entries, &self.viewer);
        let row = self.depth.upsert(&merged.key, &orders);
        self.channels.publish_depth(DepthUpdate {
            key: merged.key,
            row,
        });
        metrics::inc_depth_rows_published();
    }

    fn apply_dark_pool_price(&self, frame: DarkPoolPriceFrame) {
        let key = frame.key();
        let price = match frame.decode_price() {
            Ok(price) => price,
            Err(e) => {
                metrics::inc_decode_failures();
                warn!(error = %e, key = %key, "Dropping undecodable dark-pool price");
                return;
            }
        };

        self.cache.set(&key, price);
        metrics::inc_dark_pool_updates();
        self.channels.publish_dark_pool(DarkPoolTick {
            key,
            price,
            at: OffsetDateTime::now_utc(),
        });
    }
}
