//! Typed in-process notification channels, scoped to one connection.
//!
//! Replaces the ambient string-keyed event bus of older terminals with
//! explicit per-key broadcast channels. Lagging subscribers lose the
//! oldest snapshots; every snapshot is a full idempotent replacement, so
//! a dropped one is superseded by the next.

use dashmap::DashMap;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::book::depth::DepthRow;
use crate::keys::BookKey;

const CHANNEL_CAPACITY: usize = 64;

/// One depth-table notification.
#[derive(Debug, Clone)]
pub struct DepthUpdate {
    /// Book the row belongs to.
    pub key: BookKey,
    /// Freshly assembled row.
    pub row: DepthRow,
}

/// One dark-pool price notification.
#[derive(Debug, Clone)]
pub struct DarkPoolTick {
    /// Dark-pool book the price belongs to.
    pub key: BookKey,
    /// Last published price, or `None` when the pool went quiet.
    pub price: Option<Decimal>,
    /// When the notification was published locally.
    pub at: OffsetDateTime,
}

/// Per-key broadcast channels for depth rows and dark-pool prices.
#[derive(Debug, Default)]
pub struct BookChannels {
    depth: DashMap<BookKey, broadcast::Sender<DepthUpdate>>,
    dark: DashMap<BookKey, broadcast::Sender<DarkPoolTick>>,
}

impl BookChannels {
    /// Create an empty channel set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to depth rows for one key.
    pub fn subscribe_depth(&self, key: &BookKey) -> broadcast::Receiver<DepthUpdate> {
        self.depth
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a depth row. Updates with no subscribers are dropped.
    pub fn publish_depth(&self, update: DepthUpdate) {
        if let Some(sender) = self.depth.get(&update.key) {
            let _ = sender.send(update);
        }
    }

    /// Subscribe to dark-pool prices for one key.
    pub fn subscribe_dark_pool(&self, key: &BookKey) -> broadcast::Receiver<DarkPoolTick> {
        self.dark
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a dark-pool price. Ticks with no subscribers are dropped.
    pub fn publish_dark_pool(&self, tick: DarkPoolTick) {
        if let Some(sender) = self.dark.get(&tick.key) {
            let _ = sender.send(tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::depth::build_row;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn depth_updates_reach_only_their_key() {
        let channels = BookChannels::new();
        let one = BookKey::lit("EURUSD", "ATMF", "1M");
        let two = BookKey::lit("EURUSD", "ATMF", "2M");

        let mut rx_one = channels.subscribe_depth(&one);
        let mut rx_two = channels.subscribe_depth(&two);

        channels.publish_depth(DepthUpdate {
            key: one.clone(),
            row: build_row(&one, &[]),
        });

        let update = rx_one.recv().await.unwrap();
        assert_eq!(update.key, one);
        assert!(rx_two.try_recv().is_err());
    }

    #[tokio::test]
    async fn dark_pool_ticks_roundtrip() {
        let channels = BookChannels::new();
        let key = BookKey::dark_pool("EURUSD", "ATMF", "1M");

        let mut rx = channels.subscribe_dark_pool(&key);
        channels.publish_dark_pool(DarkPoolTick {
            key: key.clone(),
            price: Some(dec!(1.071)),
            at: OffsetDateTime::UNIX_EPOCH,
        });

        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.price, Some(dec!(1.071)));
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let channels = BookChannels::new();
        let key = BookKey::lit("EURUSD", "ATMF", "1M");

        channels.publish_depth(DepthUpdate {
            key: key.clone(),
            row: build_row(&key, &[]),
        });
    }
}
