use bitflags::bitflags;
use bytes::Bytes;
use remoteio_frame::{write_message, Describe, Message, Op, Protocol, MAX_PATH};
use remoteio_transport::{Channel, Handle, HandleBased};
use tracing::debug;

use crate::error::{Result, RioError};
use crate::namespace::Namespace;
use crate::object::{from_handles, IoObject};

bitflags! {
    /// Open request flags, carried in the request's `arg`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const RIGHT_READABLE = 0x0000_0001;
        const RIGHT_WRITABLE = 0x0000_0002;
        const RIGHT_ADMIN = 0x0000_0004;

        const CREATE = 0x0001_0000;
        const EXCLUSIVE = 0x0002_0000;
        const TRUNCATE = 0x0004_0000;
        const DIRECTORY = 0x0008_0000;
        const APPEND = 0x0010_0000;
        const NO_REMOTE = 0x0020_0000;
        /// Wait for a describe message instead of pipelining.
        const DESCRIBE = 0x0080_0000;
    }
}

/// Mode used by service connections.
pub const SERVICE_MODE: u32 = 0o755;

/// Options for opening an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    pub flags: OpenFlags,
    /// Permission bits for created objects.
    pub mode: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            flags: OpenFlags::RIGHT_READABLE,
            mode: 0,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, flag: OpenFlags, on: bool) -> Self {
        self.flags.set(flag, on);
        self
    }

    pub fn read(self, on: bool) -> Self {
        self.set(OpenFlags::RIGHT_READABLE, on)
    }

    pub fn write(self, on: bool) -> Self {
        self.set(OpenFlags::RIGHT_WRITABLE, on)
    }

    pub fn create(self, on: bool) -> Self {
        self.set(OpenFlags::CREATE, on)
    }

    pub fn truncate(self, on: bool) -> Self {
        self.set(OpenFlags::TRUNCATE, on)
    }

    pub fn directory(self, on: bool) -> Self {
        self.set(OpenFlags::DIRECTORY, on)
    }

    pub fn append(self, on: bool) -> Self {
        self.set(OpenFlags::APPEND, on)
    }

    pub fn describe(self, on: bool) -> Self {
        self.set(OpenFlags::DESCRIBE, on)
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

/// A freshly opened connection and what the server said about it.
#[derive(Debug)]
pub struct OpenedObject {
    pub control: Channel,
    pub describe: Describe,
    /// Extra handle from the describe message, if any.
    pub handle: Option<Handle>,
}

fn check_path(path: &str) -> Result<()> {
    if path.len() >= MAX_PATH {
        return Err(RioError::BadPath {
            len: path.len(),
            max: MAX_PATH,
        });
    }
    Ok(())
}

fn open_request(op: Op, flags: OpenFlags, mode: u32, path: &str) -> Message {
    let mut msg = Message::new(op).with_data(Bytes::copy_from_slice(path.as_bytes()));
    msg.header.arg = flags.bits() as i32;
    msg.header.set_mode(mode);
    msg
}

/// Send a one-way open or clone request carrying `cnxn` as the new
/// connection's server end.
///
/// `cnxn` is consumed on every path. The describe flag is rejected: nobody
/// would read the description.
pub fn connect(
    svc: &Channel,
    cnxn: Channel,
    op: Op,
    flags: OpenFlags,
    mode: u32,
    path: &str,
) -> Result<()> {
    check_path(path)?;
    if flags.contains(OpenFlags::DESCRIBE) {
        return Err(RioError::InvalidArgs("describe is not allowed on a one-way connect"));
    }
    let msg = open_request(op, flags, mode, path).with_handles(vec![cnxn.into_handle()]);
    debug!(op = op.name(), path, flags = flags.bits(), "connect");
    write_message(svc, msg).map_err(|err| RioError::Transport(err.status()))
}

/// Open an object and wait for its describe message.
///
/// The request travels on `parent` carrying the new channel's far end; the
/// description is read from the near end.
fn sync_open_connection(parent: &Channel, mut msg: Message) -> Result<OpenedObject> {
    let (control, server_end) = Channel::create(parent.as_handle().table());
    msg.set_handles(vec![server_end.into_handle()]);
    write_message(parent, msg).map_err(|err| RioError::Transport(err.status()))?;

    control.wait_readable()?;
    let packet = control.read()?;
    let (describe, handle) = Describe::from_packet(packet)
        .map_err(|err| RioError::io(format!("bad describe reply: {err}")))?;
    if describe.status != 0 {
        debug!(status = describe.status, "describe open failed");
        return Err(RioError::Remote(remoteio_transport::Status::from_raw(
            describe.status,
        )));
    }
    Ok(OpenedObject {
        control,
        describe,
        handle,
    })
}

/// Open `path` (or clone, with `Op::Clone`) through `parent`.
///
/// Pipelined mode returns at once with a locally made remote description;
/// a server-side failure shows up later as a transport error on the new
/// channel. Describe mode blocks for the server's answer.
pub fn get_object(
    parent: &Channel,
    op: Op,
    path: &str,
    options: &OpenOptions,
) -> Result<OpenedObject> {
    check_path(path)?;
    if options.flags.contains(OpenFlags::DESCRIBE) {
        let msg = open_request(op, options.flags, options.mode, path);
        return sync_open_connection(parent, msg);
    }
    let (control, server_end) = Channel::create(parent.as_handle().table());
    connect(parent, server_end, op, options.flags, options.mode, path)?;
    Ok(OpenedObject {
        control,
        describe: Describe::ok(Protocol::Remote),
        handle: None,
    })
}

/// Open `path` and build the matching local object.
pub fn open_handle(parent: &Channel, path: &str, options: &OpenOptions) -> Result<IoObject> {
    let opened = get_object(parent, Op::Open, path, options)?;
    let mut handles = vec![opened.control.into_handle()];
    handles.extend(opened.handle);
    from_handles(opened.describe.protocol, handles, &opened.describe.extra)
}

/// Open `path` and return just the control channel. Anything but a remote
/// object is closed and reported as the wrong type.
pub fn open_handle_raw(parent: &Channel, path: &str, options: &OpenOptions) -> Result<Channel> {
    let opened = get_object(parent, Op::Open, path, options)?;
    if opened.describe.protocol != Protocol::Remote.raw() {
        return Err(RioError::WrongType {
            protocol: opened.describe.protocol,
        });
    }
    Ok(opened.control)
}

fn service_rights() -> OpenFlags {
    OpenFlags::RIGHT_READABLE | OpenFlags::RIGHT_WRITABLE
}

/// Connect `channel` to the service at `path` in the root namespace.
pub fn service_connect(
    root: Option<&dyn Namespace>,
    path: Option<&str>,
    channel: Channel,
) -> Result<()> {
    let Some(path) = path else {
        return Err(RioError::InvalidArgs("missing service path"));
    };
    let Some(root) = root else {
        return Err(RioError::NotFound("no root namespace"));
    };
    root.connect(path, service_rights(), channel)
}

/// Connect `channel` to the service at `path` under `dir`.
pub fn service_connect_at(dir: Option<&Channel>, path: Option<&str>, channel: Channel) -> Result<()> {
    let Some(path) = path else {
        return Err(RioError::InvalidArgs("missing service path"));
    };
    let Some(dir) = dir else {
        return Err(RioError::Unavailable("no directory handle"));
    };
    connect(dir, channel, Op::Open, service_rights(), SERVICE_MODE, path)
}

/// Pipelined clone of a service connection.
pub fn service_clone(svc: &Channel) -> Result<Channel> {
    let (client, server_end) = Channel::create(svc.as_handle().table());
    connect(svc, server_end, Op::Clone, service_rights(), SERVICE_MODE, "")?;
    Ok(client)
}

/// Pipelined clone of `svc` onto a caller-supplied server end.
pub fn service_clone_to(svc: Option<&Channel>, srv: Channel) -> Result<()> {
    let Some(svc) = svc else {
        return Err(RioError::InvalidArgs("no service handle"));
    };
    connect(svc, srv, Op::Clone, service_rights(), SERVICE_MODE, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use remoteio_frame::{read_message, send_describe, ObjectExtra};
    use remoteio_transport::{Event, HandleTable, Status, Vmo};

    use crate::testing::answer_open;

    fn describe_opts() -> OpenOptions {
        OpenOptions::new().describe(true)
    }

    #[test]
    fn pipelined_open_returns_without_a_server() {
        let table = HandleTable::new();
        let (parent, server) = Channel::create(&table);
        let options = OpenOptions::new().write(true).mode(0o644);

        let opened = get_object(&parent, Op::Open, "data/log", &options).expect("pipelined open");
        assert_eq!(opened.describe.status, 0);
        assert_eq!(opened.describe.protocol, Protocol::Remote.raw());
        assert!(opened.handle.is_none());

        let request = read_message(&server).expect("queued open request");
        assert_eq!(request.header.op, Op::Open.raw());
        assert_eq!(request.header.arg as u32, options.flags.bits());
        assert_eq!(request.header.mode(), 0o644);
        assert_eq!(request.data().as_ref(), b"data/log");
        assert_eq!(request.handles().len(), 1);
    }

    #[test]
    fn long_path_is_rejected_before_sending() {
        let table = HandleTable::new();
        let (parent, server) = Channel::create(&table);
        let path = "a".repeat(MAX_PATH);
        let err = get_object(&parent, Op::Open, &path, &OpenOptions::new()).unwrap_err();
        assert_eq!(err.status(), Status::BAD_PATH);
        assert!(read_message(&server).is_err());
        assert_eq!(table.open_count(), 2);

        let fits = "a".repeat(MAX_PATH - 1);
        assert!(get_object(&parent, Op::Open, &fits, &OpenOptions::new()).is_ok());
    }

    #[test]
    fn connect_refuses_describe_and_closes_channel() {
        let table = HandleTable::new();
        let (parent, _server) = Channel::create(&table);
        let (_client, cnxn) = Channel::create(&table);
        let err = connect(&parent, cnxn, Op::Open, OpenFlags::DESCRIBE, 0, "x").unwrap_err();
        assert!(matches!(err, RioError::InvalidArgs(_)));
        assert_eq!(table.open_count(), 3);
    }

    #[test]
    fn describe_open_returns_server_description() {
        let table = HandleTable::new();
        let (parent, server) = Channel::create(&table);
        let peer = answer_open(server, |cnxn, msg, table| {
            assert!(OpenFlags::from_bits_truncate(msg.header.arg as u32).contains(OpenFlags::DESCRIBE));
            let mut describe = Describe::ok(Protocol::Remote);
            describe.extra = ObjectExtra { offset: 1, length: 2 };
            send_describe(&cnxn, &describe, Some(Event::create(table).into_handle()))
                .expect("describe should send");
        });
        let opened = get_object(&parent, Op::Open, "svc", &describe_opts()).expect("describe open");
        peer.join().expect("peer thread");
        assert_eq!(opened.describe.extra.length, 2);
        assert!(opened.handle.is_some());
    }

    #[test]
    fn negative_describe_status_is_returned_and_handles_closed() {
        let table = HandleTable::new();
        let (parent, server) = Channel::create(&table);
        let peer = answer_open(server, |cnxn, _, table| {
            send_describe(
                &cnxn,
                &Describe::error(Status::NOT_FOUND.into_raw()),
                Some(Event::create(table).into_handle()),
            )
            .expect("describe should send");
        });
        let err = get_object(&parent, Op::Open, "missing", &describe_opts()).unwrap_err();
        peer.join().expect("peer thread");
        assert!(matches!(err, RioError::Remote(Status::NOT_FOUND)));
        assert_eq!(table.open_count(), 1);
    }

    #[test]
    fn malformed_describe_is_io() {
        let table = HandleTable::new();
        let (parent, server) = Channel::create(&table);
        let peer = answer_open(server, |cnxn, _, table| {
            cnxn.write(&[0u8; 16], vec![Event::create(table).into_handle()])
                .expect("raw reply should send");
        });
        let err = get_object(&parent, Op::Open, "x", &describe_opts()).unwrap_err();
        peer.join().expect("peer thread");
        assert_eq!(err.status(), Status::IO);
        assert_eq!(table.open_count(), 1);
    }

    #[test]
    fn describe_open_fails_when_server_hangs_up() {
        let table = HandleTable::new();
        let (parent, server) = Channel::create(&table);
        let peer = answer_open(server, |cnxn, _, _| drop(cnxn));
        let err = get_object(&parent, Op::Open, "x", &describe_opts()).unwrap_err();
        peer.join().expect("peer thread");
        assert_eq!(err.status(), Status::PEER_CLOSED);
        assert_eq!(table.open_count(), 1);
    }

    #[test]
    fn open_raw_rejects_non_remote_objects() {
        let table = HandleTable::new();
        let (parent, server) = Channel::create(&table);
        let peer = answer_open(server, |cnxn, _, table| {
            let vmo = Vmo::create(table, 8);
            send_describe(&cnxn, &Describe::ok(Protocol::Vmofile), Some(vmo.into_handle()))
                .expect("describe should send");
        });
        let err = open_handle_raw(&parent, "blob", &describe_opts()).unwrap_err();
        peer.join().expect("peer thread");
        assert!(matches!(err, RioError::WrongType { protocol } if protocol == Protocol::Vmofile.raw()));
        assert_eq!(table.open_count(), 1);
    }

    #[test]
    fn service_connect_checks_inputs_and_consumes_channel() {
        let table = HandleTable::new();
        let (_client, cnxn) = Channel::create(&table);
        let err = service_connect(None, Some("/svc/echo"), cnxn).unwrap_err();
        assert_eq!(err.status(), Status::NOT_FOUND);

        let (_client2, cnxn) = Channel::create(&table);
        let err = service_connect_at(None, Some("echo"), cnxn).unwrap_err();
        assert_eq!(err.status(), Status::UNAVAILABLE);

        let (_client3, cnxn) = Channel::create(&table);
        let err = service_connect_at(None, None, cnxn).unwrap_err();
        assert_eq!(err.status(), Status::INVALID_ARGS);

        let (_client4, cnxn) = Channel::create(&table);
        assert!(service_clone_to(None, cnxn).is_err());
        assert_eq!(table.open_count(), 4);
    }

    #[test]
    fn service_clone_is_a_pipelined_clone() {
        let table = HandleTable::new();
        let (svc, server) = Channel::create(&table);
        let _clone = service_clone(&svc).expect("clone");
        let request = read_message(&server).expect("clone request");
        assert_eq!(request.header.op, Op::Clone.raw());
        assert_eq!(request.header.mode(), SERVICE_MODE);
        assert_eq!(
            request.header.arg as u32,
            (OpenFlags::RIGHT_READABLE | OpenFlags::RIGHT_WRITABLE).bits()
        );
        assert!(request.data().is_empty());
        assert_eq!(request.handles().len(), 1);
    }

    #[test]
    fn service_connect_at_opens_with_service_mode() {
        let table = HandleTable::new();
        let (dir, server) = Channel::create(&table);
        let (_client, cnxn) = Channel::create(&table);
        service_connect_at(Some(&dir), Some("echo"), cnxn).expect("connect");
        let request = read_message(&server).expect("open request");
        assert_eq!(request.header.op, Op::Open.raw());
        assert_eq!(request.header.mode(), SERVICE_MODE);
        assert_eq!(request.data().as_ref(), b"echo");
    }
}
