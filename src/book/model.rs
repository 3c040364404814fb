//! Derivation of typed orders from raw market entries.
//!
//! Pure: no I/O, no clocks. Each facet of [`OrderStatus`] is computed
//! independently against the viewer's identity and combined by bitwise OR.

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use time::OffsetDateTime;

use super::status::{tick_arrow, OrderStatus, RawTick, TickArrow};
use crate::keys::{BookKey, Side};

/// Who is looking at the book.
#[derive(Debug, Clone)]
pub struct ViewerIdentity {
    /// Originator identity the venue knows the viewer by.
    pub originator_id: String,
    /// The viewer's firm, if the session carries one.
    pub firm: Option<String>,
    /// Whether the viewer holds a broker role.
    pub is_broker: bool,
}

/// One raw entry of a merged book update.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEntry {
    /// Price; absent on withdrawn or informational entries.
    pub price: Option<Decimal>,
    /// Size; absent on top-of-book informational entries.
    pub size: Option<Decimal>,
    /// Identity of the order's originator.
    pub originator: String,
    /// Originating firm.
    pub firm: Option<String>,
    /// Raw tick-direction indicator.
    pub tick: Option<RawTick>,
    /// Venue timestamp of the entry.
    pub timestamp: OffsetDateTime,
    /// Order side.
    pub side: Side,
}

/// A typed order derived from one [`MarketEntry`].
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Book the order belongs to.
    pub key: BookKey,
    /// Order side.
    pub side: Side,
    /// Price, if present.
    pub price: Option<Decimal>,
    /// Size, if present.
    pub size: Option<Decimal>,
    /// Derived status facets.
    pub status: OrderStatus,
    /// Rendered tick arrow.
    pub arrow: TickArrow,
    /// Originator identity.
    pub originator: String,
    /// Venue timestamp.
    pub timestamp: OffsetDateTime,
}

impl Order {
    /// Placeholder for a side with no live order: null price and size,
    /// Cancelled-equivalent status, so renderers never need a null check.
    pub fn placeholder(key: BookKey, side: Side) -> Self {
        Self {
            key,
            side,
            price: None,
            size: None,
            status: OrderStatus::CANCELLED,
            arrow: TickArrow::None,
            originator: String::new(),
            timestamp: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

/// Compute the status facets of one entry.
pub fn derive_status(entry: &MarketEntry, viewer: &ViewerIdentity) -> OrderStatus {
    let mut status = OrderStatus::NONE;

    let owned = entry.originator == viewer.originator_id;
    if owned {
        status |= OrderStatus::OWNED;
    }

    if let (Some(entry_firm), Some(viewer_firm)) = (&entry.firm, &viewer.firm) {
        if entry_firm == viewer_firm {
            status |= OrderStatus::SAME_BANK;
        }
    }

    if entry.price.is_some() {
        status |= OrderStatus::FILLED;
    }

    match entry.size {
        Some(size) if size > Decimal::ZERO => status |= OrderStatus::ACTIVE,
        _ => status |= OrderStatus::CANCELLED,
    }

    if owned && viewer.is_broker {
        status |= OrderStatus::OWNED_BY_BROKER;
    }

    status
}

/// Derive a typed [`Order`] from one entry.
pub fn derive_order(key: &BookKey, entry: &MarketEntry, viewer: &ViewerIdentity) -> Order {
    Order {
        key: key.clone(),
        side: entry.side,
        price: entry.price,
        size: entry.size,
        status: derive_status(entry, viewer),
        arrow: tick_arrow(entry.tick, entry.side),
        originator: entry.originator.clone(),
        timestamp: entry.timestamp,
    }
}

/// Confirmed order state per book.
///
/// Each merged update replaces the whole per-key order array atomically
/// (one `Arc` swap), so subscribers never observe a partially-updated
/// array. Transient in-flight facets are NOT stored here; they live in
/// [`super::pending::PendingActions`] and are applied by projection.
#[derive(Debug, Default)]
pub struct BookStore {
    books: DashMap<BookKey, Arc<Vec<Order>>>,
}

impl BookStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the order array for `key` with orders derived from
    /// `entries`, atomically. Returns the new array.
    pub fn replace(
        &self,
        key: &BookKey,
        entries: &[MarketEntry],
        viewer: &ViewerIdentity,
    ) -> Arc<Vec<Order>> {
        let orders: Arc<Vec<Order>> = Arc::new(
            entries
                .iter()
                .map(|entry| derive_order(key, entry, viewer))
                .collect(),
        );
        self.books.insert(key.clone(), Arc::clone(&orders));
        orders
    }

    /// Current order array for `key`.
    pub fn get(&self, key: &BookKey) -> Option<Arc<Vec<Order>>> {
        self.books.get(key).map(|orders| Arc::clone(&orders))
    }

    /// Number of books held.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether the store holds no books.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
