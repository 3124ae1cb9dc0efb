use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::{Result, Status};
use crate::handle::{handle_based, Handle, HandleTable, Object, ObjectKind};
use crate::signals::Signals;

/// Bytes each direction buffers before writes return `SHOULD_WAIT`.
pub const SOCKET_CAPACITY: usize = 64 * 1024;

#[derive(Default)]
struct Side {
    /// Bytes waiting to be read by this side.
    buffer: VecDeque<u8>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    sides: Mutex<[Side; 2]>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, [Side; 2]> {
        self.sides.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct SocketEnd {
    shared: Arc<Shared>,
    side: usize,
}

impl SocketEnd {
    fn observe(sides: &[Side; 2], side: usize) -> Signals {
        let mut signals = Signals::empty();
        if !sides[side].buffer.is_empty() {
            signals |= Signals::READABLE;
        }
        let peer = &sides[1 - side];
        if peer.closed {
            signals |= Signals::PEER_CLOSED;
        } else if peer.buffer.len() < SOCKET_CAPACITY {
            signals |= Signals::WRITABLE;
        }
        signals
    }

    pub(crate) fn signals(&self) -> Signals {
        Self::observe(&self.shared.lock(), self.side)
    }

    pub(crate) fn wait(&self, wanted: Signals) -> Result<Signals> {
        let reachable = Signals::READABLE | Signals::WRITABLE | Signals::PEER_CLOSED;
        if !wanted.intersects(reachable) {
            return Err(Status::BAD_STATE);
        }
        let mut sides = self.shared.lock();
        loop {
            let observed = Self::observe(&sides, self.side);
            if observed.intersects(wanted) {
                return Ok(observed);
            }
            if sides[1 - self.side].closed {
                return Err(Status::PEER_CLOSED);
            }
            sides = self
                .shared
                .changed
                .wait(sides)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn on_close(&self) {
        let mut sides = self.shared.lock();
        sides[self.side].closed = true;
        sides[self.side].buffer.clear();
        drop(sides);
        self.shared.changed.notify_all();
    }
}

/// One end of a bounded byte-stream pair.
#[derive(Debug)]
pub struct Socket(Handle);

handle_based!(Socket, ObjectKind::Socket);

impl Socket {
    pub fn create(table: &Arc<HandleTable>) -> (Socket, Socket) {
        let shared = Arc::new(Shared::default());
        let a = table.install(Object::Socket(SocketEnd {
            shared: Arc::clone(&shared),
            side: 0,
        }));
        let b = table.install(Object::Socket(SocketEnd { shared, side: 1 }));
        (Socket(a), Socket(b))
    }

    fn end(&self) -> &SocketEnd {
        match self.0.object() {
            Object::Socket(end) => end,
            _ => unreachable!("Socket always wraps a socket handle"),
        }
    }

    /// Queue as much of `data` as fits; returns the number of bytes accepted.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let end = self.end();
        let mut sides = end.shared.lock();
        let peer = &mut sides[1 - end.side];
        if peer.closed {
            return Err(Status::PEER_CLOSED);
        }
        let room = SOCKET_CAPACITY - peer.buffer.len();
        if room == 0 && !data.is_empty() {
            return Err(Status::SHOULD_WAIT);
        }
        let accepted = room.min(data.len());
        peer.buffer.extend(&data[..accepted]);
        drop(sides);
        end.shared.changed.notify_all();
        trace!(accepted, "socket write");
        Ok(accepted)
    }

    /// Take up to `buf.len()` buffered bytes.
    ///
    /// Fails with `SHOULD_WAIT` when nothing is buffered, or `PEER_CLOSED`
    /// once the buffer is drained and the peer is gone.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let end = self.end();
        let mut sides = end.shared.lock();
        let peer_closed = sides[1 - end.side].closed;
        let own = &mut sides[end.side];
        if own.buffer.is_empty() {
            return Err(if peer_closed {
                Status::PEER_CLOSED
            } else {
                Status::SHOULD_WAIT
            });
        }
        let count = own.buffer.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(own.buffer.drain(..count)) {
            *slot = byte;
        }
        drop(sides);
        end.shared.changed.notify_all();
        Ok(count)
    }
}
