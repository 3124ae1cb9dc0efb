use remoteio_frame::{ObjectExtra, Protocol};
use remoteio_transport::{Channel, Handle, HandleBased, Signals, Socket, Vmo};
use tracing::debug;

use crate::error::{Result, RioError};
use crate::handshake::OpenOptions;
use crate::pipe::{PipeIo, SocketIo};
use crate::poll::PollEvents;
use crate::remote::{IoctlReply, RemoteIo, Whence};
use crate::service::ServiceIo;
use crate::vmofile::VmoFile;

/// Type tag of a handle passed between processes at startup or returned by
/// clone and unwrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    Remote,
    Pipe,
    Socket,
    Service,
    Other(u32),
}

/// A handle together with its type tag.
#[derive(Debug)]
pub struct HandleInfo {
    pub handle: Handle,
    pub kind: HandleType,
}

impl HandleInfo {
    pub fn new(handle: Handle, kind: HandleType) -> Self {
        Self { handle, kind }
    }
}

/// A local I/O object, one variant per protocol.
///
/// Operations a variant does not support fail with `NotSupported`.
#[derive(Debug)]
pub enum IoObject {
    Remote(RemoteIo),
    Service(ServiceIo),
    Pipe(PipeIo),
    Socket(SocketIo),
    Vmofile(VmoFile),
}

fn convert<T: HandleBased>(handle: Handle, what: &'static str) -> Result<T> {
    T::from_handle(handle).map_err(|_| RioError::InvalidArgs(what))
}

/// Build the local object for `protocol` from `handles`.
///
/// Every supplied handle is consumed: kept by the object, closed as unused,
/// or closed on failure. An unknown protocol is not-supported; a handle
/// count or kind that does not fit the protocol is invalid-argument.
pub fn from_handles(protocol: u32, handles: Vec<Handle>, extra: &ObjectExtra) -> Result<IoObject> {
    let Some(protocol) = Protocol::from_raw(protocol) else {
        debug!(protocol, handles = handles.len(), "unknown protocol");
        return Err(RioError::NotSupported("unknown protocol"));
    };
    let mut handles = handles.into_iter();
    let count = handles.len();
    let object = match (protocol, count) {
        (Protocol::Remote, 1 | 2) => {
            let control = handles.next().map(|h| convert::<Channel>(h, "remote control must be a channel"));
            let control = control.ok_or(RioError::InvalidArgs("missing control handle"))??;
            IoObject::Remote(RemoteIo::new(control, handles.next()))
        }
        (Protocol::Service, 1) => {
            let channel = handles.next().map(|h| convert::<Channel>(h, "service must be a channel"));
            IoObject::Service(ServiceIo::new(
                channel.ok_or(RioError::InvalidArgs("missing service handle"))??,
            ))
        }
        (Protocol::Pipe, 1) => {
            let socket = handles.next().map(|h| convert::<Socket>(h, "pipe must be a socket"));
            IoObject::Pipe(PipeIo::new(
                socket.ok_or(RioError::InvalidArgs("missing pipe handle"))??,
            ))
        }
        (Protocol::Vmofile, 2) => {
            let fits = extra.offset.checked_add(extra.length).is_some()
                && i64::try_from(extra.length).is_ok();
            if !fits {
                debug!(offset = extra.offset, length = extra.length, "vmofile window out of range");
                return Err(RioError::InvalidArgs("vmofile window out of range"));
            }
            // No client-side control channel for memory-mapped files.
            drop(handles.next());
            let vmo = handles.next().map(|h| convert::<Vmo>(h, "vmofile needs a vmo"));
            let vmo = vmo.ok_or(RioError::InvalidArgs("missing vmo handle"))??;
            IoObject::Vmofile(VmoFile::new(vmo, extra.offset, extra.length))
        }
        (Protocol::Socket | Protocol::SocketConnected, 2) => {
            let control = handles.next().map(|h| convert::<Channel>(h, "socket control must be a channel"));
            let control = control.ok_or(RioError::InvalidArgs("missing socket control"))??;
            let data = handles.next().map(|h| convert::<Socket>(h, "socket data must be a socket"));
            let data = data.ok_or(RioError::InvalidArgs("missing socket data"))??;
            IoObject::Socket(SocketIo::new(
                control,
                data,
                protocol == Protocol::SocketConnected,
            ))
        }
        _ => {
            debug!(protocol = protocol.name(), count, "handle count does not fit protocol");
            return Err(RioError::InvalidArgs("handle count does not fit protocol"));
        }
    };
    Ok(object)
}

impl IoObject {
    pub fn protocol(&self) -> Protocol {
        match self {
            IoObject::Remote(_) => Protocol::Remote,
            IoObject::Service(_) => Protocol::Service,
            IoObject::Pipe(_) => Protocol::Pipe,
            IoObject::Socket(socket) if socket.is_connected() => Protocol::SocketConnected,
            IoObject::Socket(_) => Protocol::Socket,
            IoObject::Vmofile(_) => Protocol::Vmofile,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteIo> {
        match self {
            IoObject::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            IoObject::Remote(io) => io.read(buf),
            IoObject::Pipe(io) => io.read(buf),
            IoObject::Socket(io) => io.read(buf),
            IoObject::Vmofile(io) => io.read(buf),
            IoObject::Service(_) => Err(RioError::NotSupported("read")),
        }
    }

    pub fn read_at(&self, buf: &mut [u8], offset: i64) -> Result<usize> {
        match self {
            IoObject::Remote(io) => io.read_at(buf, offset),
            IoObject::Vmofile(io) => {
                let offset = u64::try_from(offset).map_err(|_| RioError::InvalidArgs("negative offset"))?;
                io.read_at(buf, offset)
            }
            _ => Err(RioError::NotSupported("read_at")),
        }
    }

    pub fn write(&self, data: &[u8]) -> Result<usize> {
        match self {
            IoObject::Remote(io) => io.write(data),
            IoObject::Pipe(io) => io.write(data),
            IoObject::Socket(io) => io.write(data),
            IoObject::Service(_) | IoObject::Vmofile(_) => Err(RioError::NotSupported("write")),
        }
    }

    pub fn write_at(&self, data: &[u8], offset: i64) -> Result<usize> {
        match self {
            IoObject::Remote(io) => io.write_at(data, offset),
            _ => Err(RioError::NotSupported("write_at")),
        }
    }

    pub fn seek(&self, offset: i64, whence: Whence) -> Result<i64> {
        match self {
            IoObject::Remote(io) => io.seek(offset, whence),
            IoObject::Vmofile(io) => io.seek(offset, whence),
            _ => Err(RioError::NotSupported("seek")),
        }
    }

    pub fn ioctl(
        &self,
        op: u32,
        input: &[u8],
        handles: Vec<Handle>,
        output: &mut [u8],
    ) -> Result<IoctlReply> {
        match self {
            IoObject::Remote(io) => io.ioctl(op, input, handles, output),
            _ => Err(RioError::NotSupported("ioctl")),
        }
    }

    pub fn open(&self, path: &str, options: &OpenOptions) -> Result<IoObject> {
        match self {
            IoObject::Remote(io) => io.open(path, options),
            _ => Err(RioError::NotSupported("open")),
        }
    }

    pub fn clone_handles(&self) -> Result<Vec<HandleInfo>> {
        match self {
            IoObject::Remote(io) => io.clone_handles(),
            IoObject::Service(io) => io.clone_handles(),
            _ => Err(RioError::NotSupported("clone")),
        }
    }

    /// Release the object and every handle it owns.
    pub fn close(self) -> Result<()> {
        match self {
            IoObject::Remote(io) => io.close(),
            _ => Ok(()),
        }
    }

    /// Give up the underlying handles without closing the remote side.
    pub fn unwrap(self) -> Result<Vec<HandleInfo>> {
        match self {
            IoObject::Remote(io) => Ok(io.unwrap()),
            IoObject::Service(io) => Ok(io.unwrap()),
            IoObject::Pipe(io) => Ok(io.unwrap()),
            IoObject::Socket(io) => Ok(io.unwrap()),
            IoObject::Vmofile(_) => Err(RioError::NotSupported("unwrap")),
        }
    }

    /// Handle and signals to wait on for `events`. No handle means the
    /// object cannot be waited on.
    pub fn wait_begin(&self, events: PollEvents) -> (Option<&Handle>, Signals) {
        match self {
            IoObject::Remote(io) => io.wait_begin(events),
            IoObject::Pipe(io) => io.wait_begin(events),
            IoObject::Socket(io) => io.wait_begin(events),
            IoObject::Service(_) | IoObject::Vmofile(_) => (None, Signals::empty()),
        }
    }

    pub fn wait_end(&self, signals: Signals) -> PollEvents {
        match self {
            IoObject::Remote(io) => io.wait_end(signals),
            IoObject::Pipe(io) => io.wait_end(signals),
            IoObject::Socket(io) => io.wait_end(signals),
            IoObject::Service(_) | IoObject::Vmofile(_) => PollEvents::empty(),
        }
    }
}
