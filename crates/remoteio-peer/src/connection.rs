use std::sync::atomic::{AtomicU32, Ordering};

use remoteio_frame::{op_name, Message, Op};
use remoteio_transport::{CallError, Channel, Handle};
use tracing::debug;

use crate::error::{Result, RioError};

/// A client connection: the control channel plus an optional auxiliary
/// event handle, and the transaction counter for the channel.
///
/// Calls take `&self`; any number of threads may share one connection.
#[derive(Debug)]
pub struct Connection {
    control: Channel,
    event: Option<Handle>,
    next_txid: AtomicU32,
}

impl Connection {
    pub fn new(control: Channel, event: Option<Handle>) -> Self {
        Self {
            control,
            event,
            next_txid: AtomicU32::new(1),
        }
    }

    pub fn control(&self) -> &Channel {
        &self.control
    }

    pub fn event(&self) -> Option<&Handle> {
        self.event.as_ref()
    }

    /// Surrender both handles without any transaction.
    pub fn into_parts(self) -> (Channel, Option<Handle>) {
        (self.control, self.event)
    }

    /// Perform one request/reply transaction.
    ///
    /// The request's handles are consumed on every path. On success the
    /// reply is a valid status message with a non-negative `arg`, and its
    /// handles belong to the caller. Otherwise every reply handle has been
    /// closed:
    /// - an invalid request fails with `InvalidArgs` before transmitting;
    /// - transport failures in either phase surface as `Transport(status)`;
    /// - a malformed reply or one with an op other than status is `Io`;
    /// - a negative reply status is returned as `Remote(status)`.
    pub fn call(&self, mut msg: Message) -> Result<Message> {
        if !msg.is_valid() {
            return Err(RioError::InvalidArgs("request exceeds message limits"));
        }
        let txid = self.next_txid.fetch_add(1, Ordering::Relaxed);
        msg.header.txid = txid;
        debug!(
            txid,
            op = op_name(msg.header.op),
            len = msg.header.datalen,
            handles = msg.header.hcount,
            "txn"
        );

        let (bytes, handles) = msg.into_wire();
        let packet = match self.control.call(&bytes, handles) {
            Ok(packet) => packet,
            Err(CallError::Read(status)) => return Err(RioError::Transport(status)),
            Err(CallError::Write(err)) => return Err(RioError::Transport(err.status)),
        };

        let reply = Message::from_packet(packet)
            .map_err(|err| RioError::io(format!("malformed reply to txid {txid}: {err}")))?;
        if !Op::Status.matches(reply.header.op) {
            return Err(RioError::io(format!(
                "reply op {} to txid {txid}",
                op_name(reply.header.op)
            )));
        }
        if reply.header.arg < 0 {
            return Err(RioError::Remote(remoteio_transport::Status::from_raw(
                reply.header.arg,
            )));
        }
        Ok(reply)
    }

    /// Next transaction id this connection will assign.
    pub fn peek_txid(&self) -> u32 {
        self.next_txid.load(Ordering::Relaxed)
    }
}
