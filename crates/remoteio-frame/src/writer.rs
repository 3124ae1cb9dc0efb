use remoteio_transport::Channel;
use tracing::trace;

use crate::codec::Message;
use crate::error::Result;
use crate::ops::op_name;

/// Write one message. On failure the message's handles travel back inside
/// [`FrameError::Write`](crate::FrameError::Write).
pub fn write_message(channel: &Channel, msg: Message) -> Result<()> {
    let txid = msg.header.txid;
    let op = msg.header.op;
    let (bytes, handles) = msg.into_wire();
    trace!(txid, op = op_name(op), bytes = bytes.len(), handles = handles.len(), "message sent");
    channel.write(&bytes, handles)?;
    Ok(())
}
