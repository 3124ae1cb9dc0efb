use bytes::Bytes;
use remoteio_frame::{Message, Op, MAX_CHUNK, MAX_IOCTL_INPUT};
use remoteio_transport::{Channel, Handle, Signals};
use tracing::trace;

use crate::connection::Connection;
use crate::error::{Result, RioError};
use crate::handshake::{get_object, open_handle, OpenOptions};
use crate::object::{HandleInfo, HandleType, IoObject};
use crate::poll::{self, PollEvents};

/// How an ioctl moves handles, encoded in bits 20..=23 of the ioctl op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlKind {
    Default,
    GetHandle,
    GetTwoHandles,
    SetHandle,
    SetTwoHandles,
    GetThreeHandles,
}

impl IoctlKind {
    const fn raw(self) -> u32 {
        match self {
            IoctlKind::Default => 0x0,
            IoctlKind::GetHandle => 0x1,
            IoctlKind::GetTwoHandles => 0x2,
            IoctlKind::SetHandle => 0x3,
            IoctlKind::SetTwoHandles => 0x5,
            IoctlKind::GetThreeHandles => 0x6,
        }
    }

    /// Kind of a full ioctl op. Unrecognised kinds move no handles.
    pub fn of(op: u32) -> IoctlKind {
        match (op >> 20) & 0xf {
            0x1 => IoctlKind::GetHandle,
            0x2 => IoctlKind::GetTwoHandles,
            0x3 => IoctlKind::SetHandle,
            0x5 => IoctlKind::SetTwoHandles,
            0x6 => IoctlKind::GetThreeHandles,
            _ => IoctlKind::Default,
        }
    }

    fn handles_sent(self) -> usize {
        match self {
            IoctlKind::SetHandle => 1,
            IoctlKind::SetTwoHandles => 2,
            _ => 0,
        }
    }

    /// Output bytes a get kind must reserve for its handle slots.
    fn slots_needed(self) -> usize {
        self.handles_kept() * HANDLE_SLOT
    }

    fn handles_kept(self) -> usize {
        match self {
            IoctlKind::GetHandle => 1,
            IoctlKind::GetTwoHandles => 2,
            IoctlKind::GetThreeHandles => 3,
            _ => 0,
        }
    }
}

/// Width of one handle value in an ioctl output buffer.
const HANDLE_SLOT: usize = std::mem::size_of::<u32>();

/// Build an ioctl op from its kind, family and number.
pub const fn ioctl_op(kind: IoctlKind, family: u8, number: u8) -> u32 {
    (kind.raw() << 20) | ((family as u32) << 8) | number as u32
}

/// Seek origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set = 0,
    Current = 1,
    End = 2,
}

/// Result of [`RemoteIo::ioctl`].
#[derive(Debug)]
pub struct IoctlReply {
    /// The server's non-negative result.
    pub result: i32,
    /// Reply bytes copied into the output buffer.
    pub copied: usize,
    /// Handles returned by get-handle kinds.
    pub handles: Vec<Handle>,
}

/// Result of [`RemoteIo::misc`].
#[derive(Debug, Clone)]
pub struct MiscReply {
    pub result: i32,
    pub data: Bytes,
}

/// Chunked transfers return what moved, or the error if nothing did.
fn partial(count: usize, err: RioError) -> Result<usize> {
    if count > 0 {
        Ok(count)
    } else {
        Err(err)
    }
}

/// A connection to a remote I/O server speaking the full protocol.
#[derive(Debug)]
pub struct RemoteIo {
    conn: Connection,
}

impl RemoteIo {
    pub fn new(control: Channel, event: Option<Handle>) -> Self {
        Self {
            conn: Connection::new(control, event),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.read_common(Op::Read, buf, 0)
    }

    pub fn read_at(&self, buf: &mut [u8], offset: i64) -> Result<usize> {
        self.read_common(Op::ReadAt, buf, offset)
    }

    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.write_common(Op::Write, data, 0)
    }

    pub fn write_at(&self, data: &[u8], offset: i64) -> Result<usize> {
        self.write_common(Op::WriteAt, data, offset)
    }

    /// Send `data` in chunks of at most `MAX_CHUNK`, stopping at the first
    /// short transfer.
    fn write_common(&self, op: Op, data: &[u8], mut offset: i64) -> Result<usize> {
        let mut count = 0usize;
        let mut rest = data;
        while !rest.is_empty() {
            let xfer = rest.len().min(MAX_CHUNK);
            let mut msg = Message::new(op).with_data(Bytes::copy_from_slice(&rest[..xfer]));
            if op == Op::WriteAt {
                msg.header.set_offset(offset);
            }
            let reply = match self.conn.call(msg) {
                Ok(reply) => reply,
                Err(err) => return partial(count, err),
            };
            let moved = reply.header.arg as usize;
            drop(reply);
            if moved > xfer {
                return partial(count, RioError::io(format!("wrote {moved} of {xfer} bytes")));
            }
            count += moved;
            rest = &rest[moved..];
            offset += moved as i64;
            if moved < xfer {
                trace!(moved, xfer, "short write");
                break;
            }
        }
        Ok(count)
    }

    fn read_common(&self, op: Op, buf: &mut [u8], mut offset: i64) -> Result<usize> {
        let mut count = 0usize;
        while count < buf.len() {
            let xfer = (buf.len() - count).min(MAX_CHUNK);
            let mut msg = Message::new(op);
            msg.header.arg = xfer as i32;
            if op == Op::ReadAt {
                msg.header.set_offset(offset);
            }
            let reply = match self.conn.call(msg) {
                Ok(reply) => reply,
                Err(err) => return partial(count, err),
            };
            let moved = reply.header.arg as usize;
            if moved > reply.data().len() || moved > xfer {
                return partial(count, RioError::io(format!("read {moved} of {xfer} bytes")));
            }
            buf[count..count + moved].copy_from_slice(&reply.data()[..moved]);
            count += moved;
            offset += moved as i64;
            if moved < xfer {
                trace!(moved, xfer, "short read");
                break;
            }
        }
        Ok(count)
    }

    /// Reposition the server-side offset; returns the new offset.
    pub fn seek(&self, offset: i64, whence: Whence) -> Result<i64> {
        let mut msg = Message::new(Op::Seek);
        msg.header.arg = whence as i32;
        msg.header.set_offset(offset);
        let reply = self.conn.call(msg)?;
        Ok(reply.header.offset())
    }

    /// Send a close transaction, then release both handles whatever the
    /// transaction's outcome.
    pub fn close(self) -> Result<()> {
        let result = self.conn.call(Message::new(Op::Close));
        drop(self.conn);
        result.map(drop)
    }

    pub fn ioctl(
        &self,
        op: u32,
        input: &[u8],
        handles: Vec<Handle>,
        output: &mut [u8],
    ) -> Result<IoctlReply> {
        if input.len() > MAX_IOCTL_INPUT || output.len() > MAX_CHUNK {
            return Err(RioError::InvalidArgs("ioctl buffer too large"));
        }
        let kind = IoctlKind::of(op);
        if handles.len() != kind.handles_sent() {
            return Err(RioError::InvalidArgs("ioctl handle count does not match its kind"));
        }
        if output.len() < kind.slots_needed() {
            return Err(RioError::InvalidArgs("ioctl output too small for its handles"));
        }
        let msg_op = match kind {
            IoctlKind::SetHandle => Op::Ioctl1H,
            IoctlKind::SetTwoHandles => Op::Ioctl2H,
            _ => Op::Ioctl,
        };
        let mut msg = Message::new(msg_op)
            .with_data(Bytes::copy_from_slice(input))
            .with_handles(handles);
        msg.header.arg = output.len() as i32;
        msg.header.set_ioctl_op(op);

        let mut reply = self.conn.call(msg)?;
        let copied = reply.data().len().min(output.len());
        output[..copied].copy_from_slice(&reply.data()[..copied]);
        let mut handles = reply.take_handles();
        handles.truncate(kind.handles_kept());
        Ok(IoctlReply {
            result: reply.header.arg,
            copied,
            handles,
        })
    }

    fn misc_txn(
        &self,
        op: Op,
        offset: i64,
        max_reply: usize,
        data: &[u8],
        handles: Vec<Handle>,
    ) -> Result<Message> {
        if data.len() > MAX_CHUNK || max_reply > MAX_CHUNK {
            return Err(RioError::InvalidArgs("misc payload too large"));
        }
        let mut msg = Message::new(op)
            .with_data(Bytes::copy_from_slice(data))
            .with_handles(handles);
        msg.header.arg = max_reply as i32;
        msg.header.set_offset(offset);
        self.conn.call(msg)
    }

    /// A generic request that receives no handles (stat, readdir, unlink,
    /// truncate, sync, setattr and the like).
    pub fn misc(&self, op: Op, offset: i64, max_reply: usize, data: &[u8]) -> Result<MiscReply> {
        if matches!(op, Op::Rename | Op::Link | Op::Mmap | Op::Fcntl) {
            return Err(RioError::InvalidArgs("op has a dedicated call"));
        }
        let mut reply = self.misc_txn(op, offset, max_reply, data, Vec::new())?;
        drop(reply.take_handles());
        if reply.data().len() > max_reply {
            return Err(RioError::io(format!(
                "{}-byte reply exceeds {max_reply}",
                reply.data().len()
            )));
        }
        Ok(MiscReply {
            result: reply.header.arg,
            data: reply.data().clone(),
        })
    }

    fn two_names(src: &str, dst: &str) -> Vec<u8> {
        let mut names = Vec::with_capacity(src.len() + dst.len() + 2);
        names.extend_from_slice(src.as_bytes());
        names.push(0);
        names.extend_from_slice(dst.as_bytes());
        names.push(0);
        names
    }

    /// Rename `src` to `dst`; `token` names the destination directory.
    pub fn rename(&self, src: &str, dst: &str, token: Handle) -> Result<i32> {
        let reply = self.misc_txn(Op::Rename, 0, 0, &Self::two_names(src, dst), vec![token])?;
        Ok(reply.header.arg)
    }

    /// Link `dst` to `src`; `token` names the destination directory.
    pub fn link(&self, src: &str, dst: &str, token: Handle) -> Result<i32> {
        let reply = self.misc_txn(Op::Link, 0, 0, &Self::two_names(src, dst), vec![token])?;
        Ok(reply.header.arg)
    }

    /// Map a window of the object; the reply must carry exactly one handle.
    pub fn mmap(&self, offset: i64, max_reply: usize, data: &[u8]) -> Result<(Bytes, Handle)> {
        let mut reply = self.misc_txn(Op::Mmap, offset, max_reply, data, Vec::new())?;
        let mut handles = reply.take_handles();
        if handles.len() != 1 || reply.data().len() > max_reply {
            return Err(RioError::io(format!(
                "mmap reply with {} handles and {} bytes",
                handles.len(),
                reply.data().len()
            )));
        }
        let handle = handles
            .pop()
            .ok_or_else(|| RioError::io("mmap reply without a handle"))?;
        Ok((reply.data().clone(), handle))
    }

    /// Returns the mode word of the reply.
    pub fn fcntl(&self, cmd: u32, flags: u32) -> Result<u32> {
        let mut msg = Message::new(Op::Fcntl);
        msg.header.arg = cmd as i32;
        msg.header.set_mode(flags);
        let reply = self.conn.call(msg)?;
        Ok(reply.header.mode())
    }

    /// Open `path` relative to this connection.
    pub fn open(&self, path: &str, options: &OpenOptions) -> Result<IoObject> {
        open_handle(self.conn.control(), path, options)
    }

    /// Open a second connection to the same object with a describe clone.
    pub fn clone_handles(&self) -> Result<Vec<HandleInfo>> {
        let opened = get_object(
            self.conn.control(),
            Op::Clone,
            "",
            &OpenOptions::default().describe(true),
        )?;
        let mut handles = vec![HandleInfo::new(opened.control.into(), HandleType::Remote)];
        if let Some(event) = opened.handle {
            handles.push(HandleInfo::new(event, HandleType::Remote));
        }
        Ok(handles)
    }

    /// Give up the handles without a close transaction.
    pub fn unwrap(self) -> Vec<HandleInfo> {
        let (control, event) = self.conn.into_parts();
        let mut handles = vec![HandleInfo::new(control.into(), HandleType::Remote)];
        if let Some(event) = event {
            handles.push(HandleInfo::new(event, HandleType::Remote));
        }
        handles
    }

    /// Handle and signals to wait on for `events`.
    pub fn wait_begin(&self, events: PollEvents) -> (Option<&Handle>, Signals) {
        (self.conn.event(), poll::wait_begin(events))
    }

    pub fn wait_end(&self, signals: Signals) -> PollEvents {
        poll::wait_end(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread::JoinHandle;

    use remoteio_frame::{send_describe, Describe, ObjectExtra, Protocol};
    use remoteio_transport::{Event, HandleBased, HandleTable, Status, Vmo};

    use crate::dispatch::Outcome;
    use crate::testing::serve_with;

    fn remote_with<F>(table: &Arc<HandleTable>, handler: F) -> (RemoteIo, JoinHandle<()>)
    where
        F: FnMut(&mut Message) -> Outcome + Send + 'static,
    {
        let (client, server) = Channel::create(table);
        let join = serve_with(server, handler);
        (RemoteIo::new(client, None), join)
    }

    fn finish(io: RemoteIo, server: JoinHandle<()>) {
        drop(io);
        server.join().expect("server thread should exit");
    }

    /// A file server over `content` that answers read, read-at and write.
    fn file_server(content: Vec<u8>, log: Arc<Mutex<Vec<(u32, usize, i64)>>>) -> impl FnMut(&mut Message) -> Outcome + Send + 'static {
        let mut content = content;
        move |msg: &mut Message| {
            let op = msg.header.op;
            let offset = msg.header.offset();
            if Op::Write.matches(op) || Op::WriteAt.matches(op) {
                let n = msg.data().len();
                log.lock().unwrap().push((op, n, offset));
                content.extend_from_slice(msg.data());
                msg.set_data(Bytes::new());
                return Outcome::Reply(n as i32);
            }
            if Op::Read.matches(op) || Op::ReadAt.matches(op) {
                let want = msg.header.arg as usize;
                log.lock().unwrap().push((op, want, offset));
                let start = (offset as usize).min(content.len());
                let end = (start + want).min(content.len());
                msg.set_data(Bytes::copy_from_slice(&content[start..end]));
                return Outcome::Reply((end - start) as i32);
            }
            Outcome::Reply(0)
        }
    }

    #[test]
    fn write_splits_into_max_chunk_transactions() {
        let table = HandleTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (io, server) = remote_with(&table, file_server(Vec::new(), Arc::clone(&log)));

        let data = vec![0x5a; MAX_CHUNK * 5 / 2];
        assert_eq!(io.write(&data).expect("write"), data.len());
        finish(io, server);

        let sizes: Vec<usize> = log.lock().unwrap().iter().map(|(_, n, _)| *n).collect();
        assert_eq!(sizes, vec![MAX_CHUNK, MAX_CHUNK, MAX_CHUNK / 2]);
    }

    #[test]
    fn short_write_stops_the_loop() {
        let table = HandleTable::new();
        let calls = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&calls);
        let (io, server) = remote_with(&table, move |msg: &mut Message| {
            let mut calls = seen.lock().unwrap();
            *calls += 1;
            let n = if *calls == 2 { 100 } else { msg.data().len() };
            msg.set_data(Bytes::new());
            Outcome::Reply(n as i32)
        });

        let data = vec![1u8; MAX_CHUNK * 5 / 2];
        assert_eq!(io.write(&data).expect("write"), MAX_CHUNK + 100);
        finish(io, server);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn read_at_advances_offset_and_stops_short() {
        let table = HandleTable::new();
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (io, server) = remote_with(&table, file_server(content.clone(), Arc::clone(&log)));

        let mut buf = vec![0u8; 20_000];
        let n = io.read_at(&mut buf, 0).expect("read_at");
        assert_eq!(n, content.len());
        assert_eq!(&buf[..n], &content[..]);
        finish(io, server);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!((log[0].1, log[0].2), (MAX_CHUNK, 0));
        assert_eq!((log[1].1, log[1].2), (MAX_CHUNK, MAX_CHUNK as i64));
    }

    #[test]
    fn plain_read_does_not_send_offsets() {
        let table = HandleTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (io, server) = remote_with(&table, file_server(vec![7u8; 3 * MAX_CHUNK], Arc::clone(&log)));

        let mut buf = vec![0u8; 2 * MAX_CHUNK];
        assert_eq!(io.read(&mut buf).expect("read"), 2 * MAX_CHUNK);
        finish(io, server);
        assert!(log.lock().unwrap().iter().all(|(op, _, offset)| *op == Op::Read.raw() && *offset == 0));
    }

    #[test]
    fn overrun_is_io_unless_bytes_already_moved() {
        let table = HandleTable::new();
        let calls = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&calls);
        let (io, server) = remote_with(&table, move |msg: &mut Message| {
            let mut calls = seen.lock().unwrap();
            *calls += 1;
            let want = msg.header.arg as usize;
            msg.set_data(vec![0u8; want]);
            if *calls == 1 {
                Outcome::Reply(want as i32)
            } else {
                Outcome::Reply(want as i32 + 1)
            }
        });

        let mut buf = vec![0u8; 2 * MAX_CHUNK];
        assert_eq!(io.read(&mut buf).expect("partial read"), MAX_CHUNK);
        let err = io.read(&mut buf[..10]).unwrap_err();
        assert_eq!(err.status(), Status::IO);
        finish(io, server);
    }

    #[test]
    fn remote_error_after_progress_returns_count() {
        let table = HandleTable::new();
        let calls = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&calls);
        let (io, server) = remote_with(&table, move |msg: &mut Message| {
            let mut calls = seen.lock().unwrap();
            *calls += 1;
            let n = msg.data().len() as i32;
            msg.set_data(Bytes::new());
            if *calls == 1 {
                Outcome::Reply(n)
            } else {
                Outcome::Reply(Status::IO.into_raw())
            }
        });
        let data = vec![0u8; 3 * MAX_CHUNK];
        assert_eq!(io.write(&data).expect("partial write"), MAX_CHUNK);
        assert!(matches!(io.write(&data[..1]), Err(RioError::Remote(Status::IO))));
        finish(io, server);
    }

    #[test]
    fn seek_returns_reply_offset() {
        let table = HandleTable::new();
        let (io, server) = remote_with(&table, |msg: &mut Message| {
            assert_eq!(msg.header.arg, Whence::End as i32);
            let target = 100 + msg.header.offset();
            msg.header.set_offset(target);
            Outcome::Reply(0)
        });
        assert_eq!(io.seek(-4, Whence::End).expect("seek"), 96);
        finish(io, server);
    }

    #[test]
    fn ioctl_set_handle_uses_one_handle_op() {
        let table = HandleTable::new();
        let (io, server) = remote_with(&table, |msg: &mut Message| {
            assert_eq!(msg.header.op, Op::Ioctl1H.raw());
            assert_eq!(msg.handles().len(), 1);
            assert_eq!(msg.data().as_ref(), b"in");
            drop(msg.take_handles());
            msg.set_data(&b"abcdef"[..]);
            Outcome::Reply(3)
        });
        let op = ioctl_op(IoctlKind::SetHandle, 0x12, 1);
        let mut out = [0u8; 4];
        let reply = io
            .ioctl(op, b"in", vec![Event::create(&table).into_handle()], &mut out)
            .expect("ioctl");
        assert_eq!(reply.result, 3);
        assert_eq!(reply.copied, 4);
        assert_eq!(&out, b"abcd");
        finish(io, server);
        assert_eq!(table.open_count(), 0);
    }

    #[test]
    fn ioctl_rejects_bad_handle_counts_locally() {
        let table = HandleTable::new();
        let (client, _server) = Channel::create(&table);
        let io = RemoteIo::new(client, None);
        let mut out = [0u8; 4];

        let set = ioctl_op(IoctlKind::SetTwoHandles, 1, 1);
        let one = vec![Event::create(&table).into_handle()];
        assert!(matches!(io.ioctl(set, b"", one, &mut out), Err(RioError::InvalidArgs(_))));

        let plain = ioctl_op(IoctlKind::Default, 1, 1);
        let extra = vec![Event::create(&table).into_handle()];
        assert!(matches!(io.ioctl(plain, b"", extra, &mut out), Err(RioError::InvalidArgs(_))));

        let big = vec![0u8; MAX_IOCTL_INPUT + 1];
        assert!(matches!(io.ioctl(plain, &big, Vec::new(), &mut out), Err(RioError::InvalidArgs(_))));

        assert_eq!(io.connection().peek_txid(), 1);
        assert_eq!(table.open_count(), 2);
    }

    #[test]
    fn ioctl_get_kinds_need_room_for_their_handles() {
        let table = HandleTable::new();
        let (client, server) = Channel::create(&table);
        let io = RemoteIo::new(client, None);
        for (kind, slots) in [
            (IoctlKind::GetHandle, 1),
            (IoctlKind::GetTwoHandles, 2),
            (IoctlKind::GetThreeHandles, 3),
        ] {
            let mut out = vec![0u8; slots * 4 - 1];
            let err = io
                .ioctl(ioctl_op(kind, 1, 1), b"", Vec::new(), &mut out)
                .unwrap_err();
            assert!(matches!(err, RioError::InvalidArgs(_)));
        }
        assert_eq!(io.connection().peek_txid(), 1);
        assert_eq!(server.read().unwrap_err(), Status::SHOULD_WAIT);
    }

    #[test]
    fn ioctl_get_handle_keeps_only_what_the_kind_allows() {
        let table = HandleTable::new();
        let server_table = Arc::clone(&table);
        let (io, server) = remote_with(&table, move |msg: &mut Message| {
            msg.set_data(Bytes::new());
            for _ in 0..2 {
                msg.push_handle(Event::create(&server_table).into_handle());
            }
            Outcome::Reply(0)
        });
        let before = table.open_count();
        let mut out = [0u8; 4];
        let reply = io
            .ioctl(ioctl_op(IoctlKind::GetHandle, 2, 3), b"", Vec::new(), &mut out)
            .expect("ioctl");
        assert_eq!(reply.handles.len(), 1);
        assert_eq!(table.open_count(), before + 1);

        let reply = io
            .ioctl(ioctl_op(IoctlKind::Default, 2, 4), b"", Vec::new(), &mut out)
            .expect("ioctl");
        assert!(reply.handles.is_empty());
        assert_eq!(table.open_count(), before + 1);
        finish(io, server);
    }

    #[test]
    fn misc_bounds_the_reply_and_closes_its_handles() {
        let table = HandleTable::new();
        let server_table = Arc::clone(&table);
        let (io, server) = remote_with(&table, move |msg: &mut Message| {
            if Op::Stat.matches(msg.header.op) {
                msg.set_data(vec![9u8; 10]);
            } else {
                assert_eq!(msg.data().as_ref(), b"victim");
                msg.set_data(Bytes::new());
                msg.push_handle(Event::create(&server_table).into_handle());
            }
            Outcome::Reply(0)
        });
        let before = table.open_count();
        assert_eq!(io.misc(Op::Stat, 0, 10, b"").expect("stat").data.len(), 10);
        assert_eq!(io.misc(Op::Stat, 0, 4, b"").unwrap_err().status(), Status::IO);
        assert_eq!(io.misc(Op::Unlink, 0, 0, b"victim").expect("unlink").result, 0);
        assert_eq!(table.open_count(), before);
        assert!(matches!(io.misc(Op::Rename, 0, 0, b""), Err(RioError::InvalidArgs(_))));
        finish(io, server);
    }

    #[test]
    fn rename_carries_names_and_token() {
        let table = HandleTable::new();
        let (io, server) = remote_with(&table, |msg: &mut Message| {
            assert_eq!(msg.header.op, Op::Rename.raw());
            assert_eq!(msg.data().as_ref(), b"old\0new\0");
            assert_eq!(msg.take_handles().len(), 1);
            Outcome::Reply(0)
        });
        let token = Event::create(&table).into_handle();
        assert_eq!(io.rename("old", "new", token).expect("rename"), 0);
        finish(io, server);
    }

    #[test]
    fn mmap_requires_exactly_one_handle() {
        let table = HandleTable::new();
        let server_table = Arc::clone(&table);
        let calls = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&calls);
        let (io, server) = remote_with(&table, move |msg: &mut Message| {
            let mut calls = seen.lock().unwrap();
            *calls += 1;
            msg.set_data(Bytes::new());
            if *calls == 2 {
                msg.push_handle(Vmo::create(&server_table, 4096).into_handle());
            }
            Outcome::Reply(0)
        });
        assert_eq!(io.mmap(0, 0, b"").unwrap_err().status(), Status::IO);
        let (_, vmo) = io.mmap(0, 0, b"").expect("mmap");
        assert_eq!(Vmo::from_handle(vmo).expect("vmo").size(), 4096);
        finish(io, server);
    }

    #[test]
    fn fcntl_round_trips_mode_word() {
        let table = HandleTable::new();
        let (io, server) = remote_with(&table, |msg: &mut Message| {
            assert_eq!(msg.header.arg, 3);
            let mode = msg.header.mode() | 0x8;
            msg.header.set_mode(mode);
            Outcome::Reply(0)
        });
        assert_eq!(io.fcntl(3, 0x1).expect("fcntl"), 0x9);
        finish(io, server);
    }

    #[test]
    fn close_releases_handles_even_on_remote_error() {
        let table = HandleTable::new();
        let (client, server_end) = Channel::create(&table);
        let server = serve_with(server_end, |msg: &mut Message| {
            assert_eq!(msg.header.op, Op::Close.raw());
            Outcome::Reply(Status::IO.into_raw())
        });
        let io = RemoteIo::new(client, Some(Event::create(&table).into_handle()));
        assert!(matches!(io.close(), Err(RioError::Remote(Status::IO))));
        server.join().expect("server thread should exit");
        assert_eq!(table.open_count(), 0);
    }

    #[test]
    fn wait_begin_uses_the_event_handle() {
        let table = HandleTable::new();
        let (client, _server) = Channel::create(&table);
        let io = RemoteIo::new(client, Some(Event::create(&table).into_handle()));
        let (handle, signals) = io.wait_begin(PollEvents::IN);
        assert!(handle.is_some());
        assert!(signals.contains(poll::to_signals(PollEvents::IN | PollEvents::ERR)));
        assert_eq!(io.unwrap().len(), 2);
    }

    #[test]
    fn clone_is_answered_by_describe() {
        let table = HandleTable::new();
        let server_table = Arc::clone(&table);
        let (io, server) = remote_with(&table, move |msg: &mut Message| {
            if !Op::Clone.matches(msg.header.op) {
                return Outcome::Reply(0);
            }
            let cnxn = msg.take_handles().pop().expect("clone carries a channel");
            let cnxn = Channel::from_handle(cnxn).expect("channel");
            let event = Event::create(&server_table).into_handle();
            send_describe(&cnxn, &Describe::ok(Protocol::Remote), Some(event)).expect("describe");
            Outcome::Indirect
        });
        let handles = io.clone_handles().expect("clone");
        assert_eq!(handles.len(), 2);
        assert!(handles.iter().all(|info| info.kind == HandleType::Remote));
        finish(io, server);
    }

    #[test]
    fn describe_open_builds_vmofile() {
        let table = HandleTable::new();
        let server_table = Arc::clone(&table);
        let (io, server) = remote_with(&table, move |msg: &mut Message| {
            assert_eq!(msg.data().as_ref(), b"blob");
            let cnxn = msg.take_handles().pop().expect("open carries a channel");
            let cnxn = Channel::from_handle(cnxn).expect("channel");
            let vmo = Vmo::create(&server_table, 64);
            vmo.write(b"xxhello", 0).expect("vmo write");
            let mut describe = Describe::ok(Protocol::Vmofile);
            describe.extra = ObjectExtra { offset: 2, length: 5 };
            send_describe(&cnxn, &describe, Some(vmo.into_handle())).expect("describe");
            Outcome::Indirect
        });
        let object = io
            .open("blob", &OpenOptions::new().describe(true))
            .expect("open");
        let mut buf = [0u8; 8];
        let n = object.read(&mut buf).expect("read");
        assert_eq!(&buf[..n], b"hello");
        finish(io, server);
    }
}
