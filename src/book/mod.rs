//! Order book model: status derivation, confirmed/pending state, and
//! depth-row assembly.

pub mod depth;
pub mod model;
pub mod pending;
pub mod status;

pub use depth::{DepthRow, DepthTableBuilder};
pub use model::{derive_order, derive_status, BookStore, MarketEntry, Order, ViewerIdentity};
pub use pending::{project, PendingAction, PendingActions};
pub use status::{tick_arrow, OrderStatus, RawTick, TickArrow};
