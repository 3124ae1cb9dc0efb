//! Client and server halves of the remote I/O protocol.
//!
//! Clients issue transactions over a [`Connection`], open objects through
//! the handshake in pipelined or describe mode, and wrap what comes back in
//! an [`IoObject`]. Servers drive a [`Handler`] one message at a time with
//! [`handle_rpc`] or [`serve`].

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod fdtable;
pub mod handshake;
pub mod namespace;
pub mod object;
pub mod pipe;
pub mod poll;
pub mod remote;
pub mod service;
#[cfg(test)]
mod testing;
pub mod vmofile;

pub use connection::Connection;
pub use dispatch::{
    handle_close, handle_rpc, handler, respond, serve, txn_handoff, Dispatch, Handler, Outcome,
};
pub use error::{Result, RioError};
pub use fdtable::{create_fd, FdTable, FdTableConfig, TableFull, DEFAULT_MAX_FDS};
pub use handshake::{
    connect, get_object, open_handle, open_handle_raw, service_clone, service_clone_to,
    service_connect, service_connect_at, OpenFlags, OpenOptions, OpenedObject, SERVICE_MODE,
};
pub use namespace::{Namespace, PrefixNamespace};
pub use object::{from_handles, HandleInfo, HandleType, IoObject};
pub use pipe::{PipeIo, SocketIo};
pub use poll::{PollEvents, POLL_MASK, POLL_SHIFT};
pub use remote::{ioctl_op, IoctlKind, IoctlReply, MiscReply, RemoteIo, Whence};
pub use service::ServiceIo;
pub use vmofile::VmoFile;
