//! Subscription intents that survive reconnects.
//!
//! Recording is decoupled from connection state: a command recorded while
//! disconnected runs on the next successful connect. The connection calls
//! [`SubscriptionRegistry::replay_all`] exactly once per transition into
//! Connected; erased commands are absent from every later replay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::feed::messages::{HubMethod, OutboundFrame, SUCCESS_STATUS};
use crate::metrics;

/// One subscription intent: a remote method and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Remote method.
    pub method: HubMethod,
    /// Positional string arguments.
    pub args: Vec<String>,
}

impl Command {
    /// Subscribe to lit market data for one line.
    pub fn subscribe_market_data(instrument: &str, strategy: &str, tenor: &str) -> Self {
        Self {
            method: HubMethod::SubscribeMarketData,
            args: vec![
                instrument.to_string(),
                strategy.to_string(),
                tenor.to_string(),
            ],
        }
    }

    /// Subscribe to the dark-pool price of one line.
    pub fn subscribe_dark_pool_price(instrument: &str, strategy: &str, tenor: &str) -> Self {
        Self {
            method: HubMethod::SubscribeDarkPoolPrice,
            args: vec![
                instrument.to_string(),
                strategy.to_string(),
                tenor.to_string(),
            ],
        }
    }

    /// Subscribe to the message blotter for a user filter.
    pub fn subscribe_message_blotter(user_filter: &str) -> Self {
        Self {
            method: HubMethod::SubscribeMessageBlotter,
            args: vec![user_filter.to_string()],
        }
    }

    /// The unsubscribe command matching this subscribe command, with the
    /// same arguments.
    pub fn unsubscribe_counterpart(&self) -> Option<Self> {
        self.method.unsubscribe_counterpart().map(|method| Self {
            method,
            args: self.args.clone(),
        })
    }
}

/// Handle returned by [`SubscriptionRegistry::record`], used to erase the
/// recorded command later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHandle(u64);

#[derive(Debug)]
struct Recorded {
    handle: CommandHandle,
    command: Command,
}

/// Ordered list of subscription intents plus the plumbing to run them.
///
/// `run` is fire-and-forget: a non-success status token is logged when
/// the hub answers, never retried, and never surfaced to the caller.
pub struct SubscriptionRegistry {
    recorded: Mutex<Vec<Recorded>>,
    next_handle: AtomicU64,
    next_invoke_id: AtomicU64,
    /// Outbound frame queue of the live session, when connected.
    outbound: RwLock<Option<mpsc::Sender<String>>>,
    /// Invocations awaiting a result frame, for status logging only.
    in_flight: DashMap<u64, HubMethod>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            recorded: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            next_invoke_id: AtomicU64::new(1),
            outbound: RwLock::new(None),
            in_flight: DashMap::new(),
        }
    }

    /// Record a command for replay on every future connect. Never
    /// requires being connected.
    pub fn record(&self, command: Command) -> CommandHandle {
        let handle = CommandHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut recorded = self.recorded.lock().unwrap_or_else(|e| e.into_inner());
        recorded.push(Recorded {
            handle,
            command,
        });
        handle
    }

    /// Invoke a command now if connected; silently defer otherwise (a
    /// recorded command reaches the hub through the next replay).
    pub fn run(&self, command: &Command) {
        let outbound = self.outbound.read().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = outbound.as_ref() else {
            debug!(method = %command.method, "Not connected; command deferred to replay");
            return;
        };

        let id = self.next_invoke_id.fetch_add(1, Ordering::Relaxed);
        let frame = OutboundFrame::Invoke {
            id,
            method: command.method,
            args: command.args.clone(),
        };
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                warn!(method = %command.method, error = %e, "Failed to encode invocation");
                return;
            }
        };

        self.in_flight.insert(id, command.method);
        if let Err(e) = sender.try_send(json) {
            warn!(method = %command.method, error = %e, "Failed to queue invocation");
            self.in_flight.remove(&id);
        }
    }

    /// Record and, if connected, immediately run a command.
    pub fn record_and_run(&self, command: Command) -> CommandHandle {
        let handle = self.record(command.clone());
        self.run(&command);
        handle
    }

    /// Remove a recorded command so no future replay re-sends it. Returns
    /// the erased command; an unknown handle indicates a caller bug and is
    /// logged.
    pub fn erase(&self, handle: CommandHandle) -> Option<Command> {
        let mut recorded = self.recorded.lock().unwrap_or_else(|e| e.into_inner());
        match recorded.iter().position(|r| r.handle == handle) {
            Some(index) => Some(recorded.remove(index).command),
            None => {
                warn!(?handle, "Erase of unknown command handle");
                None
            }
        }
    }

    /// Run every recorded command in insertion order. Called by the
    /// connection exactly once per transition into Connected.
    pub fn replay_all(&self) {
        let commands: Vec<Command> = {
            let recorded = self.recorded.lock().unwrap_or_else(|e| e.into_inner());
            recorded.iter().map(|r| r.command.clone()).collect()
        };

        debug!(count = commands.len(), "Replaying recorded commands");
        for command in &commands {
            self.run(command);
        }
        metrics::inc_commands_replayed(commands.len() as u64);
    }

    /// Handle a result frame for a previously sent invocation.
    pub fn complete(&self, id: u64, status: &str) {
        let method = self.in_flight.remove(&id).map(|(_, m)| m);
        if status != SUCCESS_STATUS {
            metrics::inc_invoke_failures();
            warn!(id, ?method, status, "Invocation answered with non-success status");
        }
    }

    /// Install the live session's outbound queue.
    pub(crate) fn attach(&self, sender: mpsc::Sender<String>) {
        let mut outbound = self.outbound.write().unwrap_or_else(|e| e.into_inner());
        *outbound = Some(sender);
    }

    /// Drop the outbound queue on disconnect; stale invocation results
    /// from the torn-down session are harmless and only logged.
    pub(crate) fn detach(&self) {
        let mut outbound = self.outbound.write().unwrap_or_else(|e| e.into_inner());
        *outbound = None;
        self.in_flight.clear();
    }

    /// Whether an outbound queue is currently attached.
    pub fn is_attached(&self) -> bool {
        self.outbound
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Whether no commands are recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the recorded commands, in insertion order.
    pub fn recorded_commands(&self) -> Vec<Command> {
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::messages::InboundFrame;

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(json) = rx.try_recv() {
            frames.push(serde_json::from_str(&json).unwrap());
        }
        frames
    }

    #[test]
    fn run_is_a_no_op_while_detached() {
        let registry = SubscriptionRegistry::new();
        registry.run(&Command::subscribe_market_data("EURUSD", "ATMF", "1M"));
        // Nothing to observe: no queue, no panic.
        assert!(!registry.is_attached());
    }

    #[tokio::test]
    async fn replay_preserves_insertion_order() {
        let registry = SubscriptionRegistry::new();
        registry.record(Command::subscribe_market_data("EURUSD", "ATMF", "1M"));
        registry.record(Command::subscribe_dark_pool_price("EURUSD", "ATMF", "1M"));
        registry.record(Command::subscribe_message_blotter("desk-7"));

        let (tx, mut rx) = mpsc::channel(16);
        registry.attach(tx);
        registry.replay_all();

        let methods: Vec<HubMethod> = drain(&mut rx)
            .into_iter()
            .map(|f| match f {
                OutboundFrame::Invoke { method, .. } => method,
                OutboundFrame::Ping => panic!("unexpected ping"),
            })
            .collect();

        assert_eq!(
            methods,
            vec![
                HubMethod::SubscribeMarketData,
                HubMethod::SubscribeDarkPoolPrice,
                HubMethod::SubscribeMessageBlotter,
            ]
        );
    }

    #[tokio::test]
    async fn erased_commands_are_absent_from_replay() {
        let registry = SubscriptionRegistry::new();
        let keep = Command::subscribe_market_data("EURUSD", "ATMF", "1M");
        registry.record(keep.clone());
        let gone = registry.record(Command::subscribe_market_data("EURUSD", "ATMF", "2M"));

        assert_eq!(registry.erase(gone).map(|c| c.args[2].clone()), Some("2M".to_string()));

        let (tx, mut rx) = mpsc::channel(16);
        registry.attach(tx);
        registry.replay_all();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(registry.recorded_commands(), vec![keep]);
    }

    #[test]
    fn erasing_twice_warns_and_returns_none() {
        let registry = SubscriptionRegistry::new();
        let handle = registry.record(Command::subscribe_message_blotter("desk-7"));

        assert!(registry.erase(handle).is_some());
        assert!(registry.erase(handle).is_none());
    }

    #[tokio::test]
    async fn run_sends_one_invoke_when_attached() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::channel(16);
        registry.attach(tx);

        registry.run(&Command::subscribe_market_data("EURUSD", "Butterfly", "1W"));

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            OutboundFrame::Invoke { method, args, .. } => {
                assert_eq!(*method, HubMethod::SubscribeMarketData);
                assert_eq!(args, &["EURUSD", "Butterfly", "1W"]);
            }
            OutboundFrame::Ping => panic!("unexpected ping"),
        }
    }

    #[tokio::test]
    async fn complete_clears_in_flight_state() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::channel(16);
        registry.attach(tx);

        registry.run(&Command::subscribe_market_data("EURUSD", "ATMF", "1M"));
        let frames = drain(&mut rx);
        let OutboundFrame::Invoke { id, .. } = &frames[0] else {
            panic!("expected invoke");
        };

        // Non-success is logged, not raised.
        registry.complete(*id, "rejected");
        assert!(registry.in_flight.is_empty());
    }

    #[test]
    fn result_frame_decodes_for_completion() {
        let json = r#"{"type":"result","id":3,"status":"ok"}"#;
        let frame: InboundFrame = serde_json::from_str(json).unwrap();
        assert!(matches!(
            frame,
            InboundFrame::InvokeResult { id: 3, ref status } if status == "ok"
        ));
    }
}
