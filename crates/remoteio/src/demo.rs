//! In-process memory-file server.
//!
//! The root connection behaves like a flat directory of byte buffers. Every
//! opened file is served on its own thread until the client closes it or
//! goes away. Each request is counted by op name so callers can see how many
//! transactions an operation took.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use remoteio_frame::{op_name, send_describe, Describe, Header, Message, Op, Protocol, MAX_CHUNK};
use remoteio_peer::{serve, Handler, OpenFlags, Outcome, Whence};
use remoteio_transport::{Channel, Handle, HandleBased, HandleTable, Status};
use tracing::{debug, warn};

/// Largest file the server will grow.
pub const MAX_FILE_SIZE: usize = 16 << 20;

#[derive(Debug, Default)]
struct State {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    counts: Mutex<BTreeMap<&'static str, u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl State {
    /// Count a request. The close synthesized when a client vanishes has
    /// no transaction id and is not counted.
    fn record(&self, header: &Header) {
        if header.txid == 0 && Op::Close.matches(header.op) {
            return;
        }
        *lock(&self.counts).entry(op_name(header.op)).or_default() += 1;
    }

    fn open(&self, name: &str, flags: OpenFlags) -> Result<(), Status> {
        if name.is_empty() || name == "." || name.contains('/') {
            return Err(Status::INVALID_ARGS);
        }
        if flags.contains(OpenFlags::DIRECTORY) {
            return Err(Status::NOT_SUPPORTED);
        }
        let mut files = lock(&self.files);
        match files.get_mut(name) {
            Some(_) if flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) => {
                Err(Status::ALREADY_EXISTS)
            }
            Some(contents) => {
                if flags.contains(OpenFlags::TRUNCATE) {
                    contents.clear();
                }
                Ok(())
            }
            None if flags.contains(OpenFlags::CREATE) => {
                files.insert(name.to_owned(), Vec::new());
                Ok(())
            }
            None => Err(Status::NOT_FOUND),
        }
    }
}

/// A memory-file server shared by every connection it spawns.
#[derive(Debug, Clone, Default)]
pub struct DemoServer {
    state: Arc<State>,
}

impl DemoServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root directory connection and serve it on a new thread.
    /// The thread ends when the returned channel is closed.
    pub fn spawn_root(&self, table: &Arc<HandleTable>) -> io::Result<(Channel, JoinHandle<()>)> {
        let (client, server) = Channel::create(table);
        let handler = DirHandler {
            state: Arc::clone(&self.state),
        };
        let join = spawn_serving("remoteio-demo-root", server, handler)?;
        Ok((client, join))
    }

    /// Add or replace a file.
    pub fn insert(&self, name: &str, contents: impl Into<Vec<u8>>) {
        lock(&self.state.files).insert(name.to_owned(), contents.into());
    }

    /// Current contents of a file.
    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        lock(&self.state.files).get(name).cloned()
    }

    /// Requests handled so far, by op name.
    pub fn counts(&self) -> Vec<(&'static str, u64)> {
        lock(&self.state.counts)
            .iter()
            .map(|(name, count)| (*name, *count))
            .collect()
    }

    /// Requests handled so far for one op.
    pub fn count(&self, op: Op) -> u64 {
        lock(&self.state.counts).get(op.name()).copied().unwrap_or(0)
    }
}

fn spawn_serving<H>(name: &str, channel: Channel, handler: H) -> io::Result<JoinHandle<()>>
where
    H: Handler + Send + 'static,
{
    thread::Builder::new().name(name.to_owned()).spawn(move || {
        let mut handler = handler;
        if let Err(err) = serve(&channel, &mut handler) {
            warn!(error = %err, "demo connection ended with error");
        }
    })
}

/// Pull the new connection's channel out of an open or clone request.
fn take_channel(handles: Vec<Handle>) -> Option<Channel> {
    let mut handles = handles.into_iter();
    let channel = Channel::from_handle(handles.next()?).ok()?;
    Some(channel)
}

/// Answer a describe open, or just drop the channel of a pipelined one.
fn answer_open(cnxn: &Channel, flags: OpenFlags, result: Result<(), Status>) {
    if !flags.contains(OpenFlags::DESCRIBE) {
        return;
    }
    let describe = match result {
        Ok(()) => Describe::ok(Protocol::Remote),
        Err(status) => Describe::error(status.into_raw()),
    };
    if let Err(err) = send_describe(cnxn, &describe, None) {
        debug!(error = %err, "describe not delivered");
    }
}

fn start_file(state: &Arc<State>, name: String, cnxn: Channel) {
    let handler = FileHandler {
        state: Arc::clone(state),
        name,
        position: 0,
    };
    if let Err(err) = spawn_serving("remoteio-demo-file", cnxn, handler) {
        warn!(error = %err, "could not start file connection");
    }
}

struct DirHandler {
    state: Arc<State>,
}

impl DirHandler {
    fn open(&self, msg: &Message, handles: Vec<Handle>) -> Outcome {
        let flags = OpenFlags::from_bits_truncate(msg.header.arg as u32);
        let Some(cnxn) = take_channel(handles) else {
            debug!("open without a connection channel");
            return Outcome::Indirect;
        };
        let name = String::from_utf8_lossy(msg.data()).into_owned();
        let result = self.state.open(&name, flags);
        debug!(name, ok = result.is_ok(), "demo open");
        answer_open(&cnxn, flags, result);
        if result.is_ok() {
            start_file(&self.state, name, cnxn);
        }
        Outcome::Indirect
    }

    fn unlink(&self, msg: &Message) -> Outcome {
        let name = String::from_utf8_lossy(msg.data());
        match lock(&self.state.files).remove(name.as_ref()) {
            Some(_) => Outcome::Reply(0),
            None => Outcome::Reply(Status::NOT_FOUND.into_raw()),
        }
    }

    fn readdir(&self, msg: &mut Message) -> Outcome {
        let limit = usize::try_from(msg.header.arg).unwrap_or(0).min(MAX_CHUNK);
        let mut listing = Vec::new();
        let mut entries = 0;
        for name in lock(&self.state.files).keys() {
            if listing.len() + name.len() + 1 > limit {
                break;
            }
            listing.extend_from_slice(name.as_bytes());
            listing.push(0);
            entries += 1;
        }
        msg.set_data(listing);
        Outcome::Reply(entries)
    }
}

impl Handler for DirHandler {
    fn handle(&mut self, msg: &mut Message) -> Outcome {
        self.state.record(&msg.header);
        let handles = msg.take_handles();
        let op = msg.header.op;
        if Op::Open.matches(op) {
            return self.open(msg, handles);
        }
        drop(handles);
        if Op::Close.matches(op) || Op::Sync.matches(op) {
            msg.set_data(Vec::new());
            Outcome::Reply(0)
        } else if Op::Unlink.matches(op) {
            let outcome = self.unlink(msg);
            msg.set_data(Vec::new());
            outcome
        } else if Op::Readdir.matches(op) {
            self.readdir(msg)
        } else {
            Outcome::Reply(Status::NOT_SUPPORTED.into_raw())
        }
    }
}

struct FileHandler {
    state: Arc<State>,
    name: String,
    position: u64,
}

fn to_reply(count: usize) -> Outcome {
    Outcome::Reply(i32::try_from(count).unwrap_or(i32::MAX))
}

impl FileHandler {
    fn read(&self, msg: &mut Message, offset: u64) -> usize {
        let want = usize::try_from(msg.header.arg).unwrap_or(0).min(MAX_CHUNK);
        let files = lock(&self.state.files);
        let contents = files.get(&self.name).map(Vec::as_slice).unwrap_or_default();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(contents.len());
        let end = start.saturating_add(want).min(contents.len());
        let data = contents[start..end].to_vec();
        drop(files);
        msg.set_data(data);
        end - start
    }

    fn write(&self, msg: &mut Message, offset: u64) -> Result<usize, Status> {
        let data = msg.data().clone();
        msg.set_data(Vec::new());
        let start = usize::try_from(offset).map_err(|_| Status::OUT_OF_RANGE)?;
        let end = start
            .checked_add(data.len())
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or(Status::OUT_OF_RANGE)?;
        let mut files = lock(&self.state.files);
        let contents = files.entry(self.name.clone()).or_default();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[start..end].copy_from_slice(&data);
        Ok(data.len())
    }

    fn size(&self) -> u64 {
        lock(&self.state.files)
            .get(&self.name)
            .map_or(0, |contents| contents.len() as u64)
    }

    fn seek(&mut self, msg: &mut Message) -> Outcome {
        let base = match msg.header.arg {
            x if x == Whence::Set as i32 => 0,
            x if x == Whence::Current as i32 => self.position as i64,
            x if x == Whence::End as i32 => self.size() as i64,
            _ => return Outcome::Reply(Status::INVALID_ARGS.into_raw()),
        };
        let Some(target) = base.checked_add(msg.header.offset()).filter(|t| *t >= 0) else {
            return Outcome::Reply(Status::INVALID_ARGS.into_raw());
        };
        self.position = target as u64;
        msg.header.set_offset(target);
        Outcome::Reply(0)
    }

    fn clone_connection(&self, msg: &Message, handles: Vec<Handle>) -> Outcome {
        let flags = OpenFlags::from_bits_truncate(msg.header.arg as u32);
        if let Some(cnxn) = take_channel(handles) {
            answer_open(&cnxn, flags, Ok(()));
            start_file(&self.state, self.name.clone(), cnxn);
        }
        Outcome::Indirect
    }
}

impl Handler for FileHandler {
    fn handle(&mut self, msg: &mut Message) -> Outcome {
        self.state.record(&msg.header);
        let handles = msg.take_handles();
        let op = msg.header.op;
        if Op::Clone.matches(op) {
            return self.clone_connection(msg, handles);
        }
        drop(handles);

        if Op::Read.matches(op) {
            let n = self.read(msg, self.position);
            self.position += n as u64;
            to_reply(n)
        } else if Op::ReadAt.matches(op) {
            match u64::try_from(msg.header.offset()) {
                Ok(offset) => to_reply(self.read(msg, offset)),
                Err(_) => Outcome::Reply(Status::INVALID_ARGS.into_raw()),
            }
        } else if Op::Write.matches(op) {
            match self.write(msg, self.position) {
                Ok(n) => {
                    self.position += n as u64;
                    to_reply(n)
                }
                Err(status) => Outcome::Reply(status.into_raw()),
            }
        } else if Op::WriteAt.matches(op) {
            let written = u64::try_from(msg.header.offset())
                .map_err(|_| Status::INVALID_ARGS)
                .and_then(|offset| self.write(msg, offset));
            match written {
                Ok(n) => to_reply(n),
                Err(status) => Outcome::Reply(status.into_raw()),
            }
        } else if Op::Seek.matches(op) {
            self.seek(msg)
        } else if Op::Stat.matches(op) {
            msg.set_data(self.size().to_le_bytes().to_vec());
            Outcome::Reply(0)
        } else if Op::Truncate.matches(op) {
            let Some(len) = usize::try_from(msg.header.offset())
                .ok()
                .filter(|len| *len <= MAX_FILE_SIZE)
            else {
                return Outcome::Reply(Status::INVALID_ARGS.into_raw());
            };
            lock(&self.state.files)
                .entry(self.name.clone())
                .or_default()
                .resize(len, 0);
            msg.set_data(Vec::new());
            Outcome::Reply(0)
        } else if Op::Close.matches(op) || Op::Sync.matches(op) {
            msg.set_data(Vec::new());
            Outcome::Reply(0)
        } else {
            Outcome::Reply(Status::NOT_SUPPORTED.into_raw())
        }
    }
}
