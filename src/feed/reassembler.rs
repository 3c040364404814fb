//! Pairs the two independently-published halves of a lit book update.
//!
//! The venue splits each lit update into an aggregated top-of-book view
//! and a full depth view, published in arbitrary order. A half is buffered
//! until its counterpart arrives; the merge consumes the buffer. Dark-pool
//! updates are never split and bypass pairing entirely.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use strum::Display;
use tracing::warn;

use super::messages::{BookUpdate, MergedMessage};
use crate::error::FeedError;
use crate::keys::{BookKey, Channel};
use crate::metrics;

/// Which half of a lit update a message is, distinguished structurally:
/// depth entries carry a size, top entries do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum HalfKind {
    /// Aggregated best-price view; entries are informational, not live
    /// orders.
    #[strum(serialize = "top")]
    Top,
    /// Full per-order depth view.
    #[strum(serialize = "depth")]
    Depth,
}

/// Classify a partial update by its entries.
pub fn classify(update: &BookUpdate) -> HalfKind {
    if update.entries.iter().any(|e| e.size.is_some()) {
        HalfKind::Depth
    } else {
        HalfKind::Top
    }
}

struct BufferedHalf {
    update: BookUpdate,
    kind: HalfKind,
    buffered_at: Instant,
}

/// Pairs partial update halves into one coherent update per key.
///
/// At most one half is buffered per key. A buffered half whose counterpart
/// never arrives is evicted after `ttl` on the next ingest for any key.
pub struct MessageReassembler {
    pending: DashMap<BookKey, BufferedHalf>,
    ttl: Duration,
}

impl MessageReassembler {
    /// Create a reassembler evicting unpaired halves after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    /// Feed one partial update.
    ///
    /// Returns `Ok(Some(_))` when the update completes a pair (or is
    /// dark-pool tagged and needs no counterpart), `Ok(None)` when it was
    /// buffered to await its counterpart, and an error when the buffered
    /// half is of the same kind — a protocol violation that is never
    /// silently merged.
    pub fn ingest(&self, update: BookUpdate) -> Result<Option<MergedMessage>, FeedError> {
        // The dark-pool stream is never split.
        if update.key.channel == Channel::DarkPool {
            return Ok(Some(MergedMessage {
                key: update.key,
                entries: update.entries,
            }));
        }

        self.sweep();

        let kind = classify(&update);
        match self.pending.remove(&update.key) {
            None => {
                self.pending.insert(
                    update.key.clone(),
                    BufferedHalf {
                        update,
                        kind,
                        buffered_at: Instant::now(),
                    },
                );
                Ok(None)
            }
            Some((key, buffered)) if buffered.kind == kind => {
                Err(FeedError::PairingViolation { key, kind })
            }
            Some((key, buffered)) => {
                let (depth, top) = match kind {
                    HalfKind::Depth => (update, buffered.update),
                    HalfKind::Top => (buffered.update, update),
                };
                Ok(Some(merge(key, depth, top)))
            }
        }
    }

    /// Number of halves currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop buffered halves older than the TTL.
    fn sweep(&self) {
        let before = self.pending.len();
        if before == 0 {
            return;
        }
        self.pending.retain(|key, half| {
            let keep = half.buffered_at.elapsed() <= self.ttl;
            if !keep {
                warn!(key = %key, kind = %half.kind, "evicting unpaired buffered half");
            }
            keep
        });
        let evicted = before - self.pending.len();
        if evicted > 0 {
            metrics::inc_halves_evicted(evicted as u64);
        }
    }
}

/// Merge the two halves: the depth view's entries, plus the top view's
/// size-less entries (informational only, not live orders).
fn merge(key: BookKey, depth: BookUpdate, top: BookUpdate) -> MergedMessage {
    let mut entries = depth.entries;
    entries.extend(top.entries.into_iter().filter(|e| e.size.is_none()));
    MergedMessage { key, entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::model::MarketEntry;
    use crate::feed::messages::EntryList;
    use crate::keys::Side;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn entry(size: Option<Decimal>) -> MarketEntry {
        MarketEntry {
            price: Some(dec!(1.07)),
            size,
            originator: "mm1".to_string(),
            firm: None,
            tick: None,
            timestamp: datetime!(2024-03-01 09:30:00 UTC),
            side: Side::Bid,
        }
    }

    fn update(key: &BookKey, sizes: &[Option<Decimal>]) -> BookUpdate {
        BookUpdate {
            key: key.clone(),
            entries: sizes.iter().map(|s| entry(*s)).collect::<EntryList>(),
        }
    }

    fn reassembler() -> MessageReassembler {
        MessageReassembler::new(Duration::from_secs(30))
    }

    #[test]
    fn first_half_is_buffered() {
        let r = reassembler();
        let key = BookKey::lit("EURUSD", "ATMF", "1M");

        let out = r.ingest(update(&key, &[None, None])).unwrap();
        assert!(out.is_none());
        assert_eq!(r.buffered_len(), 1);
    }

    #[test]
    fn pairing_is_commutative() {
        let key = BookKey::lit("EURUSD", "ATMF", "1M");
        let top = update(&key, &[None, None]);
        let depth = update(&key, &[Some(dec!(1)), Some(dec!(2)), Some(dec!(3)), Some(dec!(4))]);

        let r1 = reassembler();
        assert!(r1.ingest(top.clone()).unwrap().is_none());
        let merged_a = r1.ingest(depth.clone()).unwrap().unwrap();

        let r2 = reassembler();
        assert!(r2.ingest(depth).unwrap().is_none());
        let merged_b = r2.ingest(top).unwrap().unwrap();

        assert_eq!(merged_a.entries.len(), 6);
        assert_eq!(merged_a.entries.as_slice(), merged_b.entries.as_slice());
    }

    #[test]
    fn merge_consumes_the_buffer() {
        let r = reassembler();
        let key = BookKey::lit("EURUSD", "ATMF", "1M");

        r.ingest(update(&key, &[None])).unwrap();
        r.ingest(update(&key, &[Some(dec!(1))])).unwrap().unwrap();

        assert_eq!(r.buffered_len(), 0);
    }

    #[test]
    fn dark_pool_bypasses_pairing() {
        let r = reassembler();
        let key = BookKey::dark_pool("EURUSD", "ATMF", "1M");

        let merged = r.ingest(update(&key, &[Some(dec!(1))])).unwrap();
        assert!(merged.is_some());
        assert_eq!(r.buffered_len(), 0);
    }

    #[test]
    fn same_kind_twice_is_a_pairing_violation() {
        let r = reassembler();
        let key = BookKey::lit("EURUSD", "ATMF", "1M");

        r.ingest(update(&key, &[Some(dec!(1))])).unwrap();
        let err = r.ingest(update(&key, &[Some(dec!(2))])).unwrap_err();

        assert!(matches!(
            err,
            FeedError::PairingViolation {
                kind: HalfKind::Depth,
                ..
            }
        ));
    }

    #[test]
    fn keys_are_buffered_independently() {
        let r = reassembler();
        let one = BookKey::lit("EURUSD", "ATMF", "1M");
        let two = BookKey::lit("EURUSD", "ATMF", "2M");

        assert!(r.ingest(update(&one, &[None])).unwrap().is_none());
        assert!(r.ingest(update(&two, &[None])).unwrap().is_none());
        assert_eq!(r.buffered_len(), 2);

        assert!(r.ingest(update(&one, &[Some(dec!(1))])).unwrap().is_some());
        assert_eq!(r.buffered_len(), 1);
    }

    #[test]
    fn merged_keeps_sized_depth_and_sizeless_top_entries() {
        let r = reassembler();
        let key = BookKey::lit("EURUSD", "ATMF", "1M");

        r.ingest(update(&key, &[None, None])).unwrap();
        let merged = r
            .ingest(update(
                &key,
                &[Some(dec!(1)), Some(dec!(2)), Some(dec!(3)), Some(dec!(4))],
            ))
            .unwrap()
            .unwrap();

        assert_eq!(merged.entries.len(), 6);
        assert_eq!(
            merged.entries.iter().filter(|e| e.size.is_some()).count(),
            4
        );
    }

    #[test]
    fn stale_half_is_evicted_on_next_ingest() {
        let r = MessageReassembler::new(Duration::ZERO);
        let key = BookKey::lit("EURUSD", "ATMF", "1M");

        r.ingest(update(&key, &[None])).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        // The stale top half is swept before this depth half is processed,
        // so the depth half buffers instead of merging.
        let out = r.ingest(update(&key, &[Some(dec!(1))])).unwrap();
        assert!(out.is_none());
        assert_eq!(r.buffered_len(), 1);
    }

    #[test]
    fn classify_by_structure() {
        let key = BookKey::lit("EURUSD", "ATMF", "1M");
        assert_eq!(classify(&update(&key, &[None, None])), HalfKind::Top);
        assert_eq!(
            classify(&update(&key, &[None, Some(dec!(1))])),
            HalfKind::Depth
        );
    }
}
