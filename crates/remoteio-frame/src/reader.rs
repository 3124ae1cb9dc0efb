use remoteio_transport::{Channel, Status};
use tracing::trace;

use crate::codec::{Message, MAX_HANDLES, MAX_MESSAGE_SIZE};
use crate::error::Result;
use crate::ops::op_name;

/// Read one message without blocking.
///
/// At most `MAX_MESSAGE_SIZE` bytes and `MAX_HANDLES` handles are accepted;
/// anything larger is left queued and reported as `BUFFER_TOO_SMALL`.
pub fn read_message(channel: &Channel) -> Result<Message> {
    let packet = channel.read_bounded(MAX_MESSAGE_SIZE, MAX_HANDLES)?;
    let msg = Message::from_packet(packet)?;
    trace!(
        txid = msg.header.txid,
        op = op_name(msg.header.op),
        datalen = msg.header.datalen,
        hcount = msg.header.hcount,
        "message received"
    );
    Ok(msg)
}

/// Block until a message arrives, then read it.
///
/// Fails with `PEER_CLOSED` once the peer is gone and nothing is queued.
pub fn wait_message(channel: &Channel) -> Result<Message> {
    loop {
        channel.wait_readable()?;
        match read_message(channel) {
            Err(crate::FrameError::Transport(Status::SHOULD_WAIT)) => continue,
            other => return other,
        }
    }
}
