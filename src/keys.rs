//! Keys identifying one tradable line and its delivery channel.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Which stream a message belongs to.
///
/// The lit book is published in two halves (top-of-book and full depth);
/// the dark pool is a single price-only stream that is never split.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Lit order book (top + depth halves).
    #[default]
    #[strum(serialize = "lit")]
    Lit,
    /// Anonymous dark-pool stream.
    #[serde(rename = "dark")]
    #[strum(serialize = "dark")]
    DarkPool,
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Bid (buy) side.
    #[strum(serialize = "bid", serialize = "BID")]
    Bid,
    /// Offer (sell) side.
    #[strum(serialize = "ofr", serialize = "OFR")]
    Ofr,
}

impl Side {
    /// The opposite side.
    pub fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ofr,
            Side::Ofr => Side::Bid,
        }
    }
}

/// Identifies one book: (instrument, strategy, tenor) plus the channel tag
/// that separates the dark-pool stream from the lit stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookKey {
    /// Currency pair, e.g. "EURUSD".
    pub instrument: String,
    /// Option structure, e.g. "ATMF" or "Butterfly".
    pub strategy: String,
    /// Maturity bucket, e.g. "1W".
    pub tenor: String,
    /// Stream the book belongs to.
    #[serde(default)]
    pub channel: Channel,
}

impl BookKey {
    /// Key for the lit book.
    pub fn lit(
        instrument: impl Into<String>,
        strategy: impl Into<String>,
        tenor: impl Into<String>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            strategy: strategy.into(),
            tenor: tenor.into(),
            channel: Channel::Lit,
        }
    }

    /// Key for the dark-pool book of the same line.
    pub fn dark_pool(
        instrument: impl Into<String>,
        strategy: impl Into<String>,
        tenor: impl Into<String>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            strategy: strategy.into(),
            tenor: tenor.into(),
            channel: Channel::DarkPool,
        }
    }

    /// Same line on the dark-pool channel.
    pub fn as_dark_pool(&self) -> Self {
        Self {
            channel: Channel::DarkPool,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for BookKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}[{}]",
            self.instrument, self.strategy, self.tenor, self.channel
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lit_and_dark_keys_differ() {
        let lit = BookKey::lit("EURUSD", "ATMF", "1M");
        let dark = lit.as_dark_pool();

        assert_ne!(lit, dark);
        assert_eq!(lit.instrument, dark.instrument);
        assert_eq!(dark.channel, Channel::DarkPool);
    }

    #[test]
    fn channel_defaults_to_lit() {
        assert_eq!(Channel::default(), Channel::Lit);
    }

    #[test]
    fn side_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ofr);
        assert_eq!(Side::Ofr.opposite(), Side::Bid);
    }

    #[test]
    fn key_display_includes_channel() {
        let key = BookKey::dark_pool("EURUSD", "ATMF", "1M");
        assert_eq!(key.to_string(), "EURUSD/ATMF/1M[dark]");
    }
}
