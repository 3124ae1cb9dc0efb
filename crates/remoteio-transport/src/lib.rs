//! In-process capability transport.
//!
//! Handles, message channels with out-of-band handle transfer and a
//! txid-correlated `call`, user-signalable events, shared memory objects and
//! stream sockets. This is the lowest layer of remoteio; the frame and peer
//! crates only see it through the types re-exported here.

pub mod channel;
pub mod error;
pub mod event;
pub mod handle;
pub mod signals;
pub mod socket;
pub mod vmo;

pub use channel::{CallError, Channel, Packet, WriteError, MAX_MSG_BYTES, MAX_MSG_HANDLES};
pub use error::{Result, Status};
pub use event::Event;
pub use handle::{Handle, HandleBased, HandleTable, ObjectKind};
pub use signals::{Signals, USER_SIGNAL_SHIFT};
pub use socket::{Socket, SOCKET_CAPACITY};
pub use vmo::Vmo;
