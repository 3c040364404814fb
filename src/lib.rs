//! Real-time market-data synchronization layer for an FX options trading
//! terminal.
//!
//! Maintains a live, consistent per-instrument order book fed by partial
//! update messages over a persistent websocket connection to the venue's
//! hub. Subscriptions survive arbitrary connection loss: intents are
//! recorded locally and replayed on every reconnect, with no caller
//! involvement.
//!
//! # Pipeline
//!
//! ```text
//! hub frames -> MessageReassembler -> MergedMessage -> OrderBookModel
//!            -> DepthTableBuilder -> typed per-key channels
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`hub`]: Connection lifecycle, transport, and subscription replay
//! - [`feed`]: Wire frames, half-update reassembly, notification channels
//! - [`book`]: Order status derivation and depth-row assembly
//! - [`cache`]: External durable cache for dark-pool prices
//! - [`api`]: HTTP API for health/metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod book;
pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod hub;
pub mod keys;
pub mod metrics;
pub mod utils;

pub use config::Config;
pub use error::{Result, SyncError};
