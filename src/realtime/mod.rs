//! Real-time fan-out: live connections, rooms, presence and typing.
//!
//! ```text
//!  write handlers ──publish──┐
//!                            ▼
//!  ws task ──ClientEvent──► Hub ──try_send──► per-connection queue ──► ws sink
//!                    (one lock over registry,
//!                     rooms, presence, typing)
//! ```

mod event;
mod hub;
mod presence;
mod registry;
mod rooms;
mod typing;
pub mod ws;

pub use event::{ClientEvent, ServerEvent};
pub use hub::{Hub, HubConfig};
pub use presence::{OnlineUser, PresenceStatus};
pub use registry::ConnectionHandle;
pub use rooms::RoomKey;
