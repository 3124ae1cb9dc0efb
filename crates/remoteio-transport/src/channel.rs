use std::collections::{HashMap, VecDeque};
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::{Result, Status};
use crate::handle::{handle_based, Handle, HandleTable, Object, ObjectKind};
use crate::signals::Signals;

/// Largest payload a single channel message may carry.
pub const MAX_MSG_BYTES: usize = 65536;

/// Largest number of handles a single channel message may carry.
pub const MAX_MSG_HANDLES: usize = 64;

/// One message as delivered by a channel.
///
/// `handles.len()` is the transport's own count of transferred handles and
/// is the only handle count a receiver should trust.
#[derive(Debug, Default)]
pub struct Packet {
    pub bytes: Vec<u8>,
    pub handles: Vec<Handle>,
}

impl Packet {
    pub fn new(bytes: Vec<u8>, handles: Vec<Handle>) -> Self {
        Self { bytes, handles }
    }

    /// The leading little-endian word, used to pair call replies.
    pub fn txid(&self) -> Option<u32> {
        leading_txid(&self.bytes)
    }
}

fn leading_txid(bytes: &[u8]) -> Option<u32> {
    let word: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(word))
}

/// A failed channel write. The handles were not transferred and are
/// handed back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("channel write failed: {status}")]
pub struct WriteError {
    pub status: Status,
    pub handles: Vec<Handle>,
}

impl WriteError {
    fn new(status: Status, handles: Vec<Handle>) -> Self {
        Self { status, handles }
    }
}

/// A failed [`Channel::call`].
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The request never left; its handles are returned.
    #[error("call write phase failed: {0}")]
    Write(#[from] WriteError),

    /// The request was sent but no reply arrived.
    #[error("call read phase failed: {0}")]
    Read(Status),
}

impl CallError {
    pub fn status(&self) -> Status {
        match self {
            CallError::Write(err) => err.status,
            CallError::Read(status) => *status,
        }
    }
}

#[derive(Default)]
struct Side {
    inbox: VecDeque<Packet>,
    replies: HashMap<u32, Option<Packet>>,
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

    fn wait<'a>(&self, guard: MutexGuard<'a, [Side; 2]>) -> MutexGuard<'a, [Side; 2]> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// One endpoint of a channel, as held inside a [`Handle`].
pub(crate) struct ChannelEnd {
    shared: Arc<Shared>,
    side: usize,
}

impl ChannelEnd {
    fn peer(&self) -> usize {
        1 - self.side
    }

    fn observe(sides: &[Side; 2], side: usize) -> Signals {
        let mut signals = Signals::empty();
        if !sides[side].inbox.is_empty() {
            signals |= Signals::READABLE;
        }
        if sides[1 - side].closed {
            signals |= Signals::PEER_CLOSED;
        } else {
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
            if sides[self.peer()].closed {
                return Err(Status::PEER_CLOSED);
            }
            sides = self.shared.wait(sides);
        }
    }

    fn check_limits(bytes: &[u8], handles: &[Handle]) -> Result<()> {
        if bytes.len() > MAX_MSG_BYTES || handles.len() > MAX_MSG_HANDLES {
            return Err(Status::OUT_OF_RANGE);
        }
        Ok(())
    }

    /// Queue `packet` for the peer, or hand it to a caller waiting on its txid.
    fn deliver(&self, sides: &mut [Side; 2], packet: Packet) {
        let target = &mut sides[self.peer()];
        if let Some(slot) = packet.txid().and_then(|txid| target.replies.get_mut(&txid)) {
            if slot.is_none() {
                *slot = Some(packet);
                return;
            }
        }
        target.inbox.push_back(packet);
    }

    fn write(&self, bytes: &[u8], handles: Vec<Handle>) -> std::result::Result<(), WriteError> {
        if let Err(status) = Self::check_limits(bytes, &handles) {
            return Err(WriteError::new(status, handles));
        }
        let mut sides = self.shared.lock();
        if sides[self.peer()].closed {
            return Err(WriteError::new(Status::PEER_CLOSED, handles));
        }
        trace!(bytes = bytes.len(), handles = handles.len(), "channel write");
        self.deliver(&mut sides, Packet::new(bytes.to_vec(), handles));
        drop(sides);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn read_bounded(&self, max_bytes: usize, max_handles: usize) -> Result<Packet> {
        let mut sides = self.shared.lock();
        let peer_closed = sides[self.peer()].closed;
        let inbox = &mut sides[self.side].inbox;
        let Some(next) = inbox.front() else {
            return Err(if peer_closed {
                Status::PEER_CLOSED
            } else {
                Status::SHOULD_WAIT
            });
        };
        if next.bytes.len() > max_bytes || next.handles.len() > max_handles {
            return Err(Status::BUFFER_TOO_SMALL);
        }
        inbox.pop_front().ok_or(Status::SHOULD_WAIT)
    }

    fn call(&self, bytes: &[u8], handles: Vec<Handle>) -> std::result::Result<Packet, CallError> {
        if let Err(status) = Self::check_limits(bytes, &handles) {
            return Err(WriteError::new(status, handles).into());
        }
        let Some(txid) = leading_txid(bytes) else {
            return Err(WriteError::new(Status::INVALID_ARGS, handles).into());
        };

        let mut sides = self.shared.lock();
        if sides[self.peer()].closed {
            return Err(WriteError::new(Status::PEER_CLOSED, handles).into());
        }
        if sides[self.side].replies.contains_key(&txid) {
            return Err(WriteError::new(Status::ALREADY_EXISTS, handles).into());
        }
        sides[self.side].replies.insert(txid, None);
        trace!(txid, bytes = bytes.len(), handles = handles.len(), "channel call");
        self.deliver(&mut sides, Packet::new(bytes.to_vec(), handles));
        self.shared.changed.notify_all();

        loop {
            if matches!(sides[self.side].replies.get(&txid), Some(Some(_))) {
                return sides[self.side]
                    .replies
                    .remove(&txid)
                    .flatten()
                    .ok_or(CallError::Read(Status::INTERNAL));
            }
            if sides[self.peer()].closed {
                sides[self.side].replies.remove(&txid);
                return Err(CallError::Read(Status::PEER_CLOSED));
            }
            sides = self.shared.wait(sides);
        }
    }

    pub(crate) fn on_close(&self) {
        let mut sides = self.shared.lock();
        let side = &mut sides[self.side];
        side.closed = true;
        let inbox = mem::take(&mut side.inbox);
        let replies = mem::take(&mut side.replies);
        drop(sides);
        self.shared.changed.notify_all();
        // Queued messages may carry handles to this same channel; drop them
        // after the lock is released.
        drop(inbox);
        drop(replies);
    }
}

/// One endpoint of a bidirectional message channel.
#[derive(Debug)]
pub struct Channel(Handle);

handle_based!(Channel, ObjectKind::Channel);

impl Channel {
    /// Create a connected pair of endpoints in `table`.
    pub fn create(table: &Arc<HandleTable>) -> (Channel, Channel) {
        let shared = Arc::new(Shared::default());
        let a = table.install(Object::Channel(ChannelEnd {
            shared: Arc::clone(&shared),
            side: 0,
        }));
        let b = table.install(Object::Channel(ChannelEnd { shared, side: 1 }));
        (Channel(a), Channel(b))
    }

    fn end(&self) -> &ChannelEnd {
        match self.0.object() {
            Object::Channel(end) => end,
            _ => unreachable!("Channel always wraps a channel handle"),
        }
    }

    /// Send one message. On failure the handles come back inside the error.
    pub fn write(&self, bytes: &[u8], handles: Vec<Handle>) -> std::result::Result<(), WriteError> {
        self.end().write(bytes, handles)
    }

    /// Take the next message if it fits in the given bounds.
    ///
    /// Never blocks. A message that does not fit stays queued and the read
    /// fails with `BUFFER_TOO_SMALL`.
    pub fn read_bounded(&self, max_bytes: usize, max_handles: usize) -> Result<Packet> {
        self.end().read_bounded(max_bytes, max_handles)
    }

    /// Take the next message of any size.
    pub fn read(&self) -> Result<Packet> {
        self.read_bounded(MAX_MSG_BYTES, MAX_MSG_HANDLES)
    }

    /// Block until a message is readable or the peer has closed.
    pub fn wait_readable(&self) -> Result<Signals> {
        self.0
            .wait_one(Signals::READABLE | Signals::PEER_CLOSED)
    }

    /// Send a request and block for the reply carrying the same leading txid.
    ///
    /// Any number of threads may call concurrently on one endpoint as long as
    /// their txids differ.
    pub fn call(&self, bytes: &[u8], handles: Vec<Handle>) -> std::result::Result<Packet, CallError> {
        self.end().call(bytes, handles)
    }
}
