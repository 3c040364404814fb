//! UI-ready per-tenor depth rows.

use dashmap::DashMap;
use rust_decimal::Decimal;

use super::model::Order;
use crate::keys::{BookKey, Channel, Side};

/// One renderable row: the best bid and offer for a tenor plus derived
/// mid and spread.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthRow {
    /// Tenor the row belongs to.
    pub tenor: String,
    /// Best bid, or a placeholder when the side is empty.
    pub bid: Order,
    /// Best offer, or a placeholder when the side is empty.
    pub ofr: Order,
    /// (bid + ofr) / 2, when both sides qualify.
    pub mid: Option<Decimal>,
    /// ofr - bid, when both sides qualify.
    pub spread: Option<Decimal>,
}

/// Assembles [`DepthRow`]s from derived order arrays.
///
/// Lit rows and dark-pool rows are held in sibling maps keyed by the same
/// tuple and are never merged: dark-pool liquidity has distinct visibility
/// rules.
#[derive(Debug, Default)]
pub struct DepthTableBuilder {
    lit: DashMap<BookKey, DepthRow>,
    dark: DashMap<BookKey, DepthRow>,
}

impl DepthTableBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the row for `key` from a freshly replaced order array and
    /// store it in the lit or dark table according to the key's channel.
    pub fn upsert(&self, key: &BookKey, orders: &[Order]) -> DepthRow {
        let row = build_row(key, orders);
        let table = match key.channel {
            Channel::Lit => &self.lit,
            Channel::DarkPool => &self.dark,
        };
        table.insert(key.clone(), row.clone());
        row
    }

    /// Current lit row for `key`.
    pub fn row(&self, key: &BookKey) -> Option<DepthRow> {
        self.lit.get(key).map(|row| row.clone())
    }

    /// Current dark-pool row for `key`.
    pub fn dark_row(&self, key: &BookKey) -> Option<DepthRow> {
        self.dark.get(key).map(|row| row.clone())
    }

    /// All lit rows for one (instrument, strategy) pair, sorted by tenor.
    pub fn rows_for(&self, instrument: &str, strategy: &str) -> Vec<DepthRow> {
        let mut rows: Vec<DepthRow> = self
            .lit
            .iter()
            .filter(|item| {
                item.key().instrument == instrument && item.key().strategy == strategy
            })
            .map(|item| item.value().clone())
            .collect();
        rows.sort_by(|a, b| a.tenor.cmp(&b.tenor));
        rows
    }

    /// Number of lit rows held.
    pub fn len(&self) -> usize {
        self.lit.len()
    }

    /// Whether no lit rows are held.
    pub fn is_empty(&self) -> bool {
        self.lit.is_empty()
    }
}

/// Pick one side's representative order: the best-priced active order,
/// falling back to any active order, else a placeholder.
fn best_on_side(key: &BookKey, orders: &[Order], side: Side) -> Order {
    let active = orders
        .iter()
        .filter(|o| o.side == side && o.status.is_active());

    let best_priced = active.clone().filter(|o| o.price.is_some()).max_by(
        |a, b| match (side, a.price, b.price) {
            (Side::Bid, Some(pa), Some(pb)) => pa.cmp(&pb),
            (Side::Ofr, Some(pa), Some(pb)) => pb.cmp(&pa),
            _ => std::cmp::Ordering::Equal,
        },
    );

    best_priced
        .or_else(|| active.clone().next())
        .cloned()
        .unwrap_or_else(|| Order::placeholder(key.clone(), side))
}

/// Assemble the row for one tenor.
pub fn build_row(key: &BookKey, orders: &[Order]) -> DepthRow {
    let bid = best_on_side(key, orders, Side::Bid);
    let ofr = best_on_side(key, orders, Side::Ofr);

    let (mid, spread) = match (bid.price, ofr.price) {
        (Some(bid_px), Some(ofr_px))
            if !bid.status.is_cancelled() && !ofr.status.is_cancelled() =>
        {
            (
                Some((bid_px + ofr_px) / Decimal::TWO),
                Some(ofr_px - bid_px),
            )
        }
        _ => (None, None),
    };

    DepthRow {
        tenor: key.tenor.clone(),
        bid,
        ofr,
        mid,
        spread,
    }
}
