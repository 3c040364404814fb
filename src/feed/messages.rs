//! Wire frames exchanged with the hub.
//!
//! All frames are JSON text messages. Prices and sizes travel as strings
//! and are parsed to `Decimal`; a field that fails to parse fails only
//! that frame.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::book::model::MarketEntry;
use crate::book::status::RawTick;
use crate::error::FeedError;
use crate::keys::{BookKey, Channel, Side};

/// Status token the hub returns for a successful invocation.
pub const SUCCESS_STATUS: &str = "ok";

/// Entry list of one update; most books quote a handful of orders.
pub type EntryList = SmallVec<[MarketEntry; 8]>;

/// Remote methods invocable on the hub.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
pub enum HubMethod {
    /// Subscribe to lit market data for one line.
    #[strum(serialize = "subscribeMarketData")]
    SubscribeMarketData,
    /// Unsubscribe lit market data.
    #[strum(serialize = "unsubscribeMarketData")]
    UnsubscribeMarketData,
    /// Subscribe to the dark-pool price of one line.
    #[strum(serialize = "subscribeDarkPoolPrice")]
    SubscribeDarkPoolPrice,
    /// Unsubscribe the dark-pool price.
    #[strum(serialize = "unsubscribeDarkPoolPrice")]
    UnsubscribeDarkPoolPrice,
    /// Subscribe to the message blotter for a user filter.
    #[strum(serialize = "subscribeMessageBlotter")]
    SubscribeMessageBlotter,
    /// Unsubscribe the message blotter.
    #[strum(serialize = "unsubscribeMessageBlotter")]
    UnsubscribeMessageBlotter,
}

impl HubMethod {
    /// The unsubscribe counterpart of a subscribe method.
    pub fn unsubscribe_counterpart(self) -> Option<Self> {
        match self {
            HubMethod::SubscribeMarketData => Some(HubMethod::UnsubscribeMarketData),
            HubMethod::SubscribeDarkPoolPrice => Some(HubMethod::UnsubscribeDarkPoolPrice),
            HubMethod::SubscribeMessageBlotter => Some(HubMethod::UnsubscribeMessageBlotter),
            _ => None,
        }
    }
}

/// One raw entry as published by the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEntry {
    /// Price as string, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// Size as string; absent on top-of-book informational entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Originator identity.
    pub originator: String,
    /// Originating firm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firm: Option<String>,
    /// Raw tick indicator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<RawTick>,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    /// Order side.
    pub side: Side,
}

impl WireEntry {
    /// Decode to a typed [`MarketEntry`].
    pub fn decode(&self) -> Result<MarketEntry, FeedError> {
        let price = match &self.price {
            Some(raw) => Some(
                raw.parse::<Decimal>()
                    .map_err(|e| FeedError::Decode(format!("price {raw:?}: {e}")))?,
            ),
            None => None,
        };
        let size = match &self.size {
            Some(raw) => Some(
                raw.parse::<Decimal>()
                    .map_err(|e| FeedError::Decode(format!("size {raw:?}: {e}")))?,
            ),
            None => None,
        };
        let timestamp =
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.timestamp) * 1_000_000)
                .map_err(|_| FeedError::BadTimestamp(self.timestamp))?;

        Ok(MarketEntry {
            price,
            size,
            originator: self.originator.clone(),
            firm: self.firm.clone(),
            tick: self.tick,
            timestamp,
            side: self.side,
        })
    }
}

/// A market-data update frame (one half of a lit update, or a complete
/// dark-pool update).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataFrame {
    /// Currency pair.
    pub instrument: String,
    /// Option structure.
    pub strategy: String,
    /// Maturity bucket.
    pub tenor: String,
    /// Channel tag; absent means lit.
    #[serde(default)]
    pub channel: Channel,
    /// Raw entries.
    pub entries: Vec<WireEntry>,
}

impl MarketDataFrame {
    /// Decode to a typed partial update.
    pub fn decode(&self) -> Result<BookUpdate, FeedError> {
        let entries = self
            .entries
            .iter()
            .map(WireEntry::decode)
            .collect::<Result<EntryList, FeedError>>()?;

        Ok(BookUpdate {
            key: BookKey {
                instrument: self.instrument.clone(),
                strategy: self.strategy.clone(),
                tenor: self.tenor.clone(),
                channel: self.channel,
            },
            entries,
        })
    }
}

/// A dark-pool price frame; an absent price means the pool went quiet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DarkPoolPriceFrame {
    /// Currency pair.
    pub instrument: String,
    /// Option structure.
    pub strategy: String,
    /// Maturity bucket.
    pub tenor: String,
    /// Price as string, or absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

impl DarkPoolPriceFrame {
    /// The dark-pool key this frame addresses.
    pub fn key(&self) -> BookKey {
        BookKey::dark_pool(&self.instrument, &self.strategy, &self.tenor)
    }

    /// Decode the price.
    pub fn decode_price(&self) -> Result<Option<Decimal>, FeedError> {
        match &self.price {
            Some(raw) => raw
                .parse::<Decimal>()
                .map(Some)
                .map_err(|e| FeedError::Decode(format!("dark-pool price {raw:?}: {e}"))),
            None => Ok(None),
        }
    }
}

/// Frames received from the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundFrame {
    /// Market-data update (partial or dark-pool).
    MarketData(MarketDataFrame),
    /// Dark-pool price update.
    DarkPoolPrice(DarkPoolPriceFrame),
    /// Result of an invocation.
    #[serde(rename = "result")]
    InvokeResult {
        /// Invocation id the result answers.
        id: u64,
        /// Status token; anything but [`SUCCESS_STATUS`] is a failure.
        status: String,
    },
    /// Keep-alive response.
    Pong,
}

/// Frames sent to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundFrame {
    /// Remote method invocation.
    Invoke {
        /// Caller-assigned invocation id.
        id: u64,
        /// Method to invoke.
        method: HubMethod,
        /// Positional string arguments.
        args: Vec<String>,
    },
    /// Keep-alive probe.
    Ping,
}

/// A decoded partial update, keyed and typed.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    /// Book the update addresses.
    pub key: BookKey,
    /// Decoded entries.
    pub entries: EntryList,
}

/// The single coherent book update produced by pairing two partial views
/// (or taken verbatim from the unsplit dark-pool stream).
#[derive(Debug, Clone)]
pub struct MergedMessage {
    /// Book the update addresses.
    pub key: BookKey,
    /// Complete entry list: depth entries plus size-less top entries.
    pub entries: EntryList,
}
