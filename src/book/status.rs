//! Order status flags and tick-direction derivation.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::keys::Side;

/// Independently-true facets of an order's provenance and lifecycle stage,
/// packed into one integer for wire-format compactness.
///
/// Facets are only ever combined with bitwise OR; call sites read them
/// through the named predicates rather than raw bit tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderStatus(u16);

impl OrderStatus {
    /// No facets set.
    pub const NONE: Self = Self(0);
    /// The viewer submitted this order.
    pub const OWNED: Self = Self(1);
    /// The order belongs to the viewer's firm.
    pub const SAME_BANK: Self = Self(1 << 1);
    /// The order carries a price.
    pub const FILLED: Self = Self(1 << 2);
    /// The order is live.
    pub const ACTIVE: Self = Self(1 << 3);
    /// The order has no live size.
    pub const CANCELLED: Self = Self(1 << 4);
    /// Owned and the viewer holds a broker role.
    pub const OWNED_BY_BROKER: Self = Self(1 << 5);
    /// A local create action is awaiting confirmation.
    pub const BEING_CREATED: Self = Self(1 << 6);
    /// A local cancel action is awaiting confirmation.
    pub const BEING_CANCELLED: Self = Self(1 << 7);

    /// Raw bits, as carried on the wire.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether every facet in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the facets in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the facets in `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// The viewer submitted this order.
    pub const fn is_owned(self) -> bool {
        self.contains(Self::OWNED)
    }

    /// The order belongs to the viewer's firm.
    pub const fn is_same_bank(self) -> bool {
        self.contains(Self::SAME_BANK)
    }

    /// The order carries a price.
    pub const fn is_filled(self) -> bool {
        self.contains(Self::FILLED)
    }

    /// The order is live.
    pub const fn is_active(self) -> bool {
        self.contains(Self::ACTIVE)
    }

    /// The order has no live size.
    pub const fn is_cancelled(self) -> bool {
        self.contains(Self::CANCELLED)
    }

    /// Owned through the viewer's broker role.
    pub const fn is_owned_by_broker(self) -> bool {
        self.contains(Self::OWNED_BY_BROKER)
    }

    /// A local create action is in flight.
    pub const fn is_being_created(self) -> bool {
        self.contains(Self::BEING_CREATED)
    }

    /// A local cancel action is in flight.
    pub const fn is_being_cancelled(self) -> bool {
        self.contains(Self::BEING_CANCELLED)
    }
}

impl std::ops::BitOr for OrderStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for OrderStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Raw tick-direction indicator as published by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum RawTick {
    /// Price ticked up.
    #[strum(serialize = "up")]
    Up,
    /// Price ticked down.
    #[strum(serialize = "down")]
    Down,
    /// No direction.
    #[strum(serialize = "none")]
    None,
}

/// Rendered tick arrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum TickArrow {
    /// Upward arrow.
    Up,
    /// Downward arrow.
    Down,
    /// No arrow.
    #[default]
    None,
}

/// Derive the rendered arrow from the raw indicator.
///
/// The raw indicator is quoted from the offer's perspective, so it is
/// inverted for bids: a raw "down" renders as an upward arrow on a bid and
/// a downward arrow on an offer.
pub fn tick_arrow(raw: Option<RawTick>, side: Side) -> TickArrow {
    match (raw, side) {
        (None, _) | (Some(RawTick::None), _) => TickArrow::None,
        (Some(RawTick::Up), Side::Ofr) => TickArrow::Up,
        (Some(RawTick::Down), Side::Ofr) => TickArrow::Down,
        (Some(RawTick::Up), Side::Bid) => TickArrow::Down,
        (Some(RawTick::Down), Side::Bid) => TickArrow::Up,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facets_compose_by_or() {
        let status = OrderStatus::OWNED | OrderStatus::SAME_BANK | OrderStatus::ACTIVE;

        assert!(status.is_owned());
        assert!(status.is_same_bank());
        assert!(status.is_active());
        assert!(!status.is_cancelled());
    }

    #[test]
    fn insert_preserves_existing_facets() {
        let mut status = OrderStatus::OWNED;
        status.insert(OrderStatus::BEING_CANCELLED);

        assert!(status.is_owned());
        assert!(status.is_being_cancelled());
    }

    #[test]
    fn remove_clears_only_named_facet() {
        let mut status = OrderStatus::OWNED | OrderStatus::BEING_CREATED;
        status.remove(OrderStatus::BEING_CREATED);

        assert!(status.is_owned());
        assert!(!status.is_being_created());
    }

    #[test]
    fn raw_down_inverts_on_bid() {
        assert_eq!(tick_arrow(Some(RawTick::Down), Side::Bid), TickArrow::Up);
        assert_eq!(tick_arrow(Some(RawTick::Down), Side::Ofr), TickArrow::Down);
    }

    #[test]
    fn raw_up_inverts_on_bid() {
        assert_eq!(tick_arrow(Some(RawTick::Up), Side::Bid), TickArrow::Down);
        assert_eq!(tick_arrow(Some(RawTick::Up), Side::Ofr), TickArrow::Up);
    }

    #[test]
    fn missing_indicator_renders_no_arrow() {
        assert_eq!(tick_arrow(None, Side::Bid), TickArrow::None);
        assert_eq!(tick_arrow(Some(RawTick::None), Side::Ofr), TickArrow::None);
    }
}
