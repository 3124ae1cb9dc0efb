//! Server side of the protocol: one dispatch cycle per incoming message.

use remoteio_frame::{encode_handoff_error, read_message, write_message, FrameError, Message, Op};
use remoteio_transport::{Channel, HandleBased, Status};
use tracing::{debug, warn};

use crate::error::{Result, RioError};

/// What a handler did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Send a status reply carrying this value and whatever payload and
    /// handles the handler left in the message.
    Reply(i32),
    /// The handler will reply later and re-arm dispatch itself.
    ///
    /// Handles still attached to the message are closed when the cycle
    /// ends; take them with [`Message::take_handles`] to keep them.
    Deferred,
    /// The handler already replied on its own and owns the reply route.
    ///
    /// As with `Deferred`, handles left in the message are closed.
    Indirect,
}

/// Result of one dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Keep dispatching.
    Continue,
    /// A handler deferred its reply; stop until it re-arms.
    Deferred,
    /// The connection is finished: a close was answered or the peer left.
    Done,
}

/// Handles requests arriving on a served channel.
pub trait Handler {
    fn handle(&mut self, msg: &mut Message) -> Outcome;
}

impl<F> Handler for F
where
    F: FnMut(&mut Message) -> Outcome,
{
    fn handle(&mut self, msg: &mut Message) -> Outcome {
        self(msg)
    }
}

/// Read one message from `channel`, hand it to `handler`, and reply.
///
/// A malformed request has its handles closed and fails with the frame
/// error. After a close request the cycle reports [`Dispatch::Done`] even if
/// the reply could not be sent.
pub fn handle_rpc<H: Handler + ?Sized>(channel: &Channel, handler: &mut H) -> Result<Dispatch> {
    let mut msg = read_message(channel)?;
    let is_close = Op::Close.matches(msg.header.op);

    match handler.handle(&mut msg) {
        Outcome::Indirect => Ok(Dispatch::Continue),
        Outcome::Deferred => Ok(Dispatch::Deferred),
        Outcome::Reply(value) => {
            msg.header.arg = value;
            let sent = respond(channel, msg);
            if is_close {
                return Ok(Dispatch::Done);
            }
            sent.map(|()| Dispatch::Continue)
        }
    }
}

/// Send `msg` back as a status reply.
///
/// A negative result or a message over the protocol limits loses its payload
/// and handles; an over-limit message with a non-negative result is answered
/// with `INTERNAL`. Handles that fail to send are closed.
pub fn respond(channel: &Channel, mut msg: Message) -> Result<()> {
    if msg.header.arg < 0 || !msg.is_valid() {
        msg.discard();
        if msg.header.arg >= 0 {
            msg.header.arg = Status::INTERNAL.into_raw();
        }
    }
    msg.header.op = Op::Status.raw();
    write_message(channel, msg).map_err(|err| {
        debug!(error = %err, "reply not sent");
        RioError::Transport(err.status())
    })
}

/// Tell `handler` that the peer is gone by handing it a synthetic close.
/// Nothing is sent back.
pub fn handle_close<H: Handler + ?Sized>(handler: &mut H) {
    let mut msg = Message::new(Op::Close);
    let _ = handler.handle(&mut msg);
}

/// Dispatch one cycle, or run the close path when there is no channel.
pub fn handler<H: Handler + ?Sized>(channel: Option<&Channel>, handler: &mut H) -> Result<Dispatch> {
    match channel {
        Some(channel) => handle_rpc(channel, handler),
        None => {
            handle_close(handler);
            Ok(Dispatch::Done)
        }
    }
}

/// Serve `channel` until a close is answered, a handler defers, or the peer
/// goes away.
///
/// Peer closure and malformed traffic both run the close path; the latter
/// is also returned as an error.
pub fn serve<H: Handler + ?Sized>(channel: &Channel, handler: &mut H) -> Result<Dispatch> {
    loop {
        if let Err(status) = channel.wait_readable() {
            debug!(%status, "served channel unusable");
            handle_close(handler);
            return Ok(Dispatch::Done);
        }
        match handle_rpc(channel, handler) {
            Ok(Dispatch::Continue) => {}
            Ok(outcome) => return Ok(outcome),
            Err(err) if err.status() == Status::PEER_CLOSED => {
                handle_close(handler);
                return Ok(Dispatch::Done);
            }
            Err(err) => {
                warn!(error = %err, "dispatch failed; closing");
                handle_close(handler);
                return Err(err);
            }
        }
    }
}

/// Forward `msg` to a second-tier server `srv`, attaching `reply` as the
/// channel the answer should go to.
///
/// Handles already in `msg` are closed. If the forward fails, the waiter on
/// `reply` gets a status-only error reply and `reply` is closed.
pub fn txn_handoff(srv: &Channel, reply: Channel, mut msg: Message) -> Result<()> {
    msg.header.txid = 0;
    drop(msg.take_handles());
    msg.push_handle(reply.into_handle());

    let err = match write_message(srv, msg) {
        Ok(()) => return Ok(()),
        Err(FrameError::Write(err)) => err,
        Err(other) => return Err(other.into()),
    };
    let status = err.status;
    debug!(%status, "handoff failed");
    if let Some(reply) = err.handles.into_iter().next() {
        if let Ok(reply) = Channel::from_handle(reply) {
            let _ = reply.write(&encode_handoff_error(status.into_raw()), Vec::new());
        }
    }
    Err(RioError::Transport(status))
}
