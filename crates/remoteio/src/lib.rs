//! Remote I/O over capability channels.
//!
//! A client opens objects on a server through a small request/reply
//! protocol carried on channels that transfer handles alongside bytes.
//!
//! # Crate Structure
//!
//! - [`transport`]: handles, channels, events, VMOs and sockets
//! - [`frame`]: message header, validation and describe messages
//! - [`peer`]: client transactions, server dispatch, open handshake and
//!   the object bridge (behind `peer` feature)
//! - [`demo`]: an in-process memory-file server (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use remoteio_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use remoteio_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use remoteio_peer::*;
}

#[cfg(feature = "peer")]
pub mod demo;
