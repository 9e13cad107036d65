//! # Stormwatch Detection
//!
//! Link to the Detection Server: the push subscription carrying analysed
//! frames for the selected device, and the periodic alert history query.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod history;
pub mod memory;
pub mod session;
pub mod transport;

// Re-export main types
pub use history::{AlertHistoryPoller, HistorySource, HttpHistorySource};
pub use memory::{memory_transport, MemoryServer, MemoryTransport};
pub use session::{Delivery, SessionContext, StreamSession};
pub use transport::{ChannelEvent, FrameChannel, FrameTransport, WebSocketTransport};
