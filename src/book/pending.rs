//! Optimistic local actions awaiting venue confirmation.
//!
//! Confirmed state ([`super::model::BookStore`]) and pending actions are
//! kept in two explicit layers. A server update replaces the confirmed
//! array wholesale, which would drop any in-place transient bit; instead
//! the transient facets are re-applied by [`project`], a pure function,
//! after every replacement.
//!
//! No confirmation timeout exists: a mark persists until the caller clears
//! it on confirmation (or gives up and clears it itself).

use dashmap::DashMap;

use super::model::Order;
use super::status::OrderStatus;
use crate::keys::{BookKey, Side};

/// A local action in flight against one side of one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// A create has been sent and not yet confirmed.
    Creating,
    /// A cancel has been sent and not yet confirmed.
    Cancelling,
}

impl PendingAction {
    /// The transient status facet this action projects.
    pub fn facet(self) -> OrderStatus {
        match self {
            PendingAction::Creating => OrderStatus::BEING_CREATED,
            PendingAction::Cancelling => OrderStatus::BEING_CANCELLED,
        }
    }
}

/// In-flight local actions keyed by book and side.
#[derive(Debug, Default)]
pub struct PendingActions {
    actions: DashMap<(BookKey, Side), PendingAction>,
}

impl PendingActions {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an action in flight. A newer mark replaces an older one.
    pub fn mark(&self, key: &BookKey, side: Side, action: PendingAction) {
        self.actions.insert((key.clone(), side), action);
    }

    /// Clear the mark for one side, if any.
    pub fn clear(&self, key: &BookKey, side: Side) -> Option<PendingAction> {
        self.actions.remove(&(key.clone(), side)).map(|(_, a)| a)
    }

    /// Current mark for one side.
    pub fn get(&self, key: &BookKey, side: Side) -> Option<PendingAction> {
        self.actions.get(&(key.clone(), side)).map(|a| *a)
    }

    /// Number of marks held.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no actions are in flight.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Combine confirmed orders with pending actions.
///
/// Returns a copy of `orders` with the matching transient facet OR-ed onto
/// every owned order on a marked side. Confirmed state is never mutated.
pub fn project(orders: &[Order], pending: &PendingActions) -> Vec<Order> {
    orders
        .iter()
        .map(|order| {
            let mut projected = order.clone();
            if projected.status.is_owned() {
                if let Some(action) = pending.get(&projected.key, projected.side) {
                    projected.status |= action.facet();
                }
            }
            projected
        })
        .collect()
}
