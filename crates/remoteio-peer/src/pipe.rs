use remoteio_transport::{Channel, Handle, HandleBased, Signals, Socket, Status};

use crate::error::{Result, RioError};
use crate::object::{HandleInfo, HandleType};
use crate::poll::PollEvents;

/// Read from a socket, blocking until data arrives. End of stream reads 0.
fn blocking_read(socket: &Socket, buf: &mut [u8]) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    loop {
        match socket.read(buf) {
            Ok(n) => return Ok(n),
            Err(Status::PEER_CLOSED) => return Ok(0),
            Err(Status::SHOULD_WAIT) => {
                match socket
                    .as_handle()
                    .wait_one(Signals::READABLE | Signals::PEER_CLOSED)
                {
                    Ok(_) | Err(Status::PEER_CLOSED) => continue,
                    Err(status) => return Err(status.into()),
                }
            }
            Err(status) => return Err(status.into()),
        }
    }
}

/// Write to a socket, blocking until at least one byte is accepted.
fn blocking_write(socket: &Socket, data: &[u8]) -> Result<usize> {
    if data.is_empty() {
        return Ok(0);
    }
    loop {
        match socket.write(data) {
            Ok(n) => return Ok(n),
            Err(Status::SHOULD_WAIT) => {
                socket
                    .as_handle()
                    .wait_one(Signals::WRITABLE | Signals::PEER_CLOSED)?;
            }
            Err(status) => return Err(status.into()),
        }
    }
}

fn stream_signals(events: PollEvents) -> Signals {
    let mut signals = Signals::empty();
    if events.contains(PollEvents::IN) {
        signals |= Signals::READABLE | Signals::PEER_CLOSED;
    }
    if events.contains(PollEvents::OUT) {
        signals |= Signals::WRITABLE;
    }
    if events.intersects(PollEvents::RDHUP | PollEvents::HUP) {
        signals |= Signals::PEER_CLOSED;
    }
    signals
}

fn stream_events(signals: Signals) -> PollEvents {
    let mut events = PollEvents::empty();
    if signals.contains(Signals::READABLE) {
        events |= PollEvents::IN;
    }
    if signals.contains(Signals::WRITABLE) {
        events |= PollEvents::OUT;
    }
    if signals.contains(Signals::PEER_CLOSED) {
        events |= PollEvents::IN | PollEvents::RDHUP;
    }
    events
}

/// A byte-stream pipe over one socket.
#[derive(Debug)]
pub struct PipeIo {
    socket: Socket,
}

impl PipeIo {
    pub fn new(socket: Socket) -> Self {
        Self { socket }
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        blocking_read(&self.socket, buf)
    }

    pub fn write(&self, data: &[u8]) -> Result<usize> {
        blocking_write(&self.socket, data)
    }

    pub fn wait_begin(&self, events: PollEvents) -> (Option<&Handle>, Signals) {
        (Some(self.socket.as_handle()), stream_signals(events))
    }

    pub fn wait_end(&self, signals: Signals) -> PollEvents {
        stream_events(signals)
    }

    pub fn unwrap(self) -> Vec<HandleInfo> {
        vec![HandleInfo::new(self.socket.into_handle(), HandleType::Pipe)]
    }
}

/// A socket endpoint: control channel plus data socket.
///
/// Data operations on a socket that is not yet connected fail with
/// bad-state.
#[derive(Debug)]
pub struct SocketIo {
    control: Channel,
    data: Socket,
    connected: bool,
}

impl SocketIo {
    pub fn new(control: Channel, data: Socket, connected: bool) -> Self {
        Self {
            control,
            data,
            connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn control(&self) -> &Channel {
        &self.control
    }

    fn connected_data(&self) -> Result<&Socket> {
        if !self.connected {
            return Err(RioError::BadState("socket is not connected"));
        }
        Ok(&self.data)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        blocking_read(self.connected_data()?, buf)
    }

    pub fn write(&self, data: &[u8]) -> Result<usize> {
        blocking_write(self.connected_data()?, data)
    }

    pub fn wait_begin(&self, events: PollEvents) -> (Option<&Handle>, Signals) {
        (Some(self.data.as_handle()), stream_signals(events))
    }

    pub fn wait_end(&self, signals: Signals) -> PollEvents {
        stream_events(signals)
    }

    pub fn unwrap(self) -> Vec<HandleInfo> {
        vec![
            HandleInfo::new(self.control.into_handle(), HandleType::Socket),
            HandleInfo::new(self.data.into_handle(), HandleType::Socket),
        ]
    }
}
