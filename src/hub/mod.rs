//! Hub connection: transport, lifecycle, and subscription replay.

pub mod connection;
pub mod mock;
pub mod registry;
pub mod transport;

pub use connection::{ConnectionState, HubConfig, HubConnection, HubStatus};
pub use registry::{Command, CommandHandle, SubscriptionRegistry};
pub use transport::{HubTransport, TransportSession, WsTransport};
