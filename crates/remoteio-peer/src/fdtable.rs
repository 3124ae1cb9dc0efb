use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use remoteio_frame::{ObjectExtra, Protocol};
use remoteio_transport::{Handle, Status};
use tracing::debug;

use crate::error::{Result, RioError};
use crate::object::{from_handles, HandleInfo, HandleType, IoObject};

/// Default number of descriptor slots.
pub const DEFAULT_MAX_FDS: usize = 256;

/// Descriptor table configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdTableConfig {
    /// Number of slots; binds beyond it fail.
    pub max_fds: usize,
}

impl Default for FdTableConfig {
    fn default() -> Self {
        Self {
            max_fds: DEFAULT_MAX_FDS,
        }
    }
}

/// No free slot at or above the requested minimum. Carries the object back.
#[derive(Debug, thiserror::Error)]
#[error("descriptor table full")]
pub struct TableFull(pub IoObject);

/// Binds I/O objects to small integers.
#[derive(Debug)]
pub struct FdTable {
    slots: Mutex<Vec<Option<Arc<IoObject>>>>,
    config: FdTableConfig,
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new(FdTableConfig::default())
    }
}

impl FdTable {
    pub fn new(config: FdTableConfig) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &FdTableConfig {
        &self.config
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Option<Arc<IoObject>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `io` to the lowest free descriptor `>= min`.
    pub fn bind(&self, io: IoObject, min: usize) -> std::result::Result<usize, TableFull> {
        let mut slots = self.slots();
        let free = (min..self.config.max_fds).find(|&fd| slots.get(fd).is_none_or(Option::is_none));
        let Some(fd) = free else {
            return Err(TableFull(io));
        };
        if slots.len() <= fd {
            slots.resize_with(fd + 1, || None);
        }
        slots[fd] = Some(Arc::new(io));
        debug!(fd, "descriptor bound");
        Ok(fd)
    }

    pub fn get(&self, fd: usize) -> Option<Arc<IoObject>> {
        self.slots().get(fd).cloned().flatten()
    }

    /// Remove the binding without closing the object.
    pub fn unbind(&self, fd: usize) -> Option<Arc<IoObject>> {
        let mut slots = self.slots();
        let io = slots.get_mut(fd).and_then(Option::take);
        while slots.last().is_some_and(Option::is_none) {
            slots.pop();
        }
        io
    }

    /// Unbind `fd` and close the object once nobody else holds it.
    pub fn close(&self, fd: usize) -> Result<()> {
        let io = self
            .unbind(fd)
            .ok_or(RioError::Transport(Status::BAD_HANDLE))?;
        match Arc::try_unwrap(io) {
            Ok(io) => io.close(),
            Err(_) => Ok(()),
        }
    }

    /// Number of bound descriptors.
    pub fn len(&self) -> usize {
        self.slots().iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build an object from startup handles and bind it to a descriptor.
///
/// The first handle's type selects the protocol: remote, pipe, or a
/// connected socket. Any other type fails with `IO` and closes every handle.
/// A full table closes the object and fails with `BAD_STATE`.
pub fn create_fd(table: &FdTable, handles: Vec<HandleInfo>) -> Result<usize> {
    let protocol = match handles.first().map(|info| info.kind) {
        Some(HandleType::Remote) => Protocol::Remote,
        Some(HandleType::Pipe) => Protocol::Pipe,
        Some(HandleType::Socket) => Protocol::SocketConnected,
        other => {
            debug!(kind = ?other, "startup handle type has no protocol");
            return Err(RioError::io("unsupported startup handle type"));
        }
    };
    let handles: Vec<Handle> = handles.into_iter().map(|info| info.handle).collect();
    let io = from_handles(protocol.raw(), handles, &ObjectExtra::default())?;
    table.bind(io, 0).map_err(|TableFull(io)| {
        let _ = io.close();
        RioError::BadState("descriptor table full")
    })
}
