use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::channel::ChannelEnd;
use crate::error::{Result, Status};
use crate::event::EventObject;
use crate::signals::Signals;
use crate::socket::SocketEnd;
use crate::vmo::VmoObject;

/// Per-process table of open handles.
///
/// Every [`Handle`] remembers the table it was created in. Handles moved
/// through a channel stay accounted to their original table until closed.
pub struct HandleTable {
    next_value: AtomicU32,
    open: AtomicUsize,
}

impl HandleTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_value: AtomicU32::new(1),
            open: AtomicUsize::new(0),
        })
    }

    /// Number of handles currently open in this table.
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn install(self: &Arc<Self>, object: Object) -> Handle {
        let mut value = self.next_value.fetch_add(1, Ordering::Relaxed);
        if value == 0 {
            value = self.next_value.fetch_add(1, Ordering::Relaxed);
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        trace!(handle = value, kind = object.kind().name(), "handle opened");
        Handle {
            value,
            object,
            table: Arc::clone(self),
        }
    }
}

impl fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("open", &self.open_count())
            .finish()
    }
}

/// Kind of kernel object a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Channel,
    Event,
    Vmo,
    Socket,
}

impl ObjectKind {
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Channel => "channel",
            ObjectKind::Event => "event",
            ObjectKind::Vmo => "vmo",
            ObjectKind::Socket => "socket",
        }
    }
}

pub(crate) enum Object {
    Channel(ChannelEnd),
    Event(Arc<EventObject>),
    Vmo(Arc<VmoObject>),
    Socket(SocketEnd),
}

impl Object {
    fn kind(&self) -> ObjectKind {
        match self {
            Object::Channel(_) => ObjectKind::Channel,
            Object::Event(_) => ObjectKind::Event,
            Object::Vmo(_) => ObjectKind::Vmo,
            Object::Socket(_) => ObjectKind::Socket,
        }
    }
}

/// An owned reference to a kernel object.
///
/// Dropping a handle closes it. There is exactly one owner at a time;
/// transferring a handle through a channel moves it.
pub struct Handle {
    value: u32,
    object: Object,
    table: Arc<HandleTable>,
}

impl Handle {
    /// Opaque handle value, for diagnostics.
    pub fn raw(&self) -> u32 {
        self.value
    }

    pub fn kind(&self) -> ObjectKind {
        self.object.kind()
    }

    /// The table this handle is accounted to.
    pub fn table(&self) -> &Arc<HandleTable> {
        &self.table
    }

    /// Close the handle explicitly.
    pub fn close(self) {
        drop(self);
    }

    /// Create a second handle to the same object.
    ///
    /// Only events and VMOs may be duplicated.
    pub fn duplicate(&self) -> Result<Handle> {
        let object = match &self.object {
            Object::Event(event) => Object::Event(Arc::clone(event)),
            Object::Vmo(vmo) => Object::Vmo(Arc::clone(vmo)),
            Object::Channel(_) | Object::Socket(_) => return Err(Status::NOT_SUPPORTED),
        };
        Ok(self.table.install(object))
    }

    /// Current signal state, without blocking.
    pub fn signals(&self) -> Signals {
        match &self.object {
            Object::Channel(end) => end.signals(),
            Object::Event(event) => event.signals(),
            Object::Socket(end) => end.signals(),
            Object::Vmo(_) => Signals::empty(),
        }
    }

    /// Block until any of `signals` is asserted; returns the observed set.
    ///
    /// There is no timeout. Waiting on an object that can never assert any
    /// of the requested signals fails with `BAD_STATE` instead of hanging.
    pub fn wait_one(&self, signals: Signals) -> Result<Signals> {
        match &self.object {
            Object::Channel(end) => end.wait(signals),
            Object::Event(event) => event.wait(signals),
            Object::Socket(end) => end.wait(signals),
            Object::Vmo(_) => Err(Status::BAD_STATE),
        }
    }

    pub(crate) fn object(&self) -> &Object {
        &self.object
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        match &self.object {
            Object::Channel(end) => end.on_close(),
            Object::Socket(end) => end.on_close(),
            Object::Event(_) | Object::Vmo(_) => {}
        }
        self.table.open.fetch_sub(1, Ordering::SeqCst);
        trace!(handle = self.value, kind = self.kind().name(), "handle closed");
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("value", &format_args!("{:#x}", self.value))
            .field("kind", &self.kind().name())
            .finish()
    }
}

/// Implemented by the typed wrappers around [`Handle`].
pub trait HandleBased: Sized {
    const KIND: ObjectKind;

    fn into_handle(self) -> Handle;

    fn as_handle(&self) -> &Handle;

    #[doc(hidden)]
    fn from_handle_unchecked(handle: Handle) -> Self;

    /// Convert a type-erased handle. A handle of the wrong kind is closed.
    fn from_handle(handle: Handle) -> Result<Self> {
        if handle.kind() != Self::KIND {
            return Err(Status::WRONG_TYPE);
        }
        Ok(Self::from_handle_unchecked(handle))
    }
}

macro_rules! handle_based {
    ($name:ident, $kind:expr) => {
        impl $crate::handle::HandleBased for $name {
            const KIND: $crate::handle::ObjectKind = $kind;

            fn into_handle(self) -> $crate::handle::Handle {
                self.0
            }

            fn as_handle(&self) -> &$crate::handle::Handle {
                &self.0
            }

            fn from_handle_unchecked(handle: $crate::handle::Handle) -> Self {
                $name(handle)
            }
        }

        impl From<$name> for $crate::handle::Handle {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl TryFrom<$crate::handle::Handle> for $name {
            type Error = $crate::error::Status;

            fn try_from(handle: $crate::handle::Handle) -> $crate::error::Result<Self> {
                <$name as $crate::handle::HandleBased>::from_handle(handle)
            }
        }
    };
}

pub(crate) use handle_based;
