//! Feed plumbing: wire frames, partial-update reassembly, and typed
//! notification channels.

pub mod channels;
pub mod messages;
pub mod reassembler;

pub use channels::{BookChannels, DarkPoolTick, DepthUpdate};
pub use messages::{
    BookUpdate, DarkPoolPriceFrame, EntryList, HubMethod, InboundFrame, MarketDataFrame,
    MergedMessage, OutboundFrame, WireEntry, SUCCESS_STATUS,
};
pub use reassembler::{classify, HalfKind, MessageReassembler};
