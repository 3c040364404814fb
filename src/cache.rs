//! External durable cache for the last published dark-pool price.
//!
//! The store itself lives outside this crate; it is consumed through
//! [`DarkPoolCache`] to pre-populate dark-pool state before the first
//! live update. The in-memory implementation backs tests and the
//! standalone binary.

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::keys::BookKey;

/// Last-published dark-pool price, keyed by (instrument, strategy, tenor).
pub trait DarkPoolCache: Send + Sync {
    /// Last published price for `key`, if one is cached.
    fn get(&self, key: &BookKey) -> Option<Decimal>;

    /// Record the last published price; `None` clears the entry.
    fn set(&self, key: &BookKey, price: Option<Decimal>);
}

/// In-memory cache implementation.
#[derive(Debug, Default)]
pub struct InMemoryDarkPoolCache {
    prices: DashMap<BookKey, Decimal>,
}

impl InMemoryDarkPoolCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DarkPoolCache for InMemoryDarkPoolCache {
    fn get(&self, key: &BookKey) -> Option<Decimal> {
        self.prices.get(key).map(|price| *price)
    }

    fn set(&self, key: &BookKey, price: Option<Decimal>) {
        match price {
            Some(price) => {
                self.prices.insert(key.clone(), price);
            }
            None => {
                self.prices.remove(key);
            }
        }
    }
}
