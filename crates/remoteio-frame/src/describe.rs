use bytes::{Buf, BufMut, BytesMut};
use remoteio_transport::{Channel, Handle, Packet};
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::ops::{op_name, Op};
use crate::protocol::Protocol;

/// Describe message: txid (4) + op (4) + status (4) + protocol (4) +
/// extra offset (8) + extra length (8) = 32 bytes.
pub const DESCRIBE_SIZE: usize = 32;

/// Size of the status-only reply sent when a handoff cannot be delivered.
pub const HANDOFF_ERROR_SIZE: usize = 8;

/// Type-specific data carried by a describe message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectExtra {
    /// Start of the window into a memory-mapped file.
    pub offset: u64,
    /// Length of that window.
    pub length: u64,
}

/// The out-of-band answer to a describe open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Describe {
    pub status: i32,
    pub protocol: u32,
    pub extra: ObjectExtra,
}

impl Describe {
    /// A successful description of `protocol`.
    pub fn ok(protocol: Protocol) -> Self {
        Self {
            status: 0,
            protocol: protocol.raw(),
            extra: ObjectExtra::default(),
        }
    }

    /// A failed open.
    pub fn error(status: i32) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(DESCRIBE_SIZE);
        dst.put_u32_le(0);
        dst.put_u32_le(Op::OnOpen.raw());
        dst.put_i32_le(self.status);
        dst.put_u32_le(self.protocol);
        dst.put_u64_le(self.extra.offset);
        dst.put_u64_le(self.extra.length);
    }

    /// Decode a describe message. The size must be exact and the op must be
    /// on-open; the status is not interpreted here.
    pub fn decode(mut src: &[u8]) -> Result<Describe> {
        if src.len() != DESCRIBE_SIZE {
            return Err(FrameError::BadDescribe {
                size: src.len(),
                handles: 0,
            });
        }
        let _txid = src.get_u32_le();
        let op = src.get_u32_le();
        if op != Op::OnOpen.raw() {
            return Err(FrameError::UnexpectedOp {
                op,
                name: op_name(op),
            });
        }
        Ok(Describe {
            status: src.get_i32_le(),
            protocol: src.get_u32_le(),
            extra: ObjectExtra {
                offset: src.get_u64_le(),
                length: src.get_u64_le(),
            },
        })
    }

    /// Decode a describe packet, keeping its optional handle.
    ///
    /// More than one handle is malformed. On any error every received
    /// handle is closed.
    pub fn from_packet(packet: Packet) -> Result<(Describe, Option<Handle>)> {
        let Packet { bytes, mut handles } = packet;
        if handles.len() > 1 {
            return Err(FrameError::BadDescribe {
                size: bytes.len(),
                handles: handles.len(),
            });
        }
        let describe = Describe::decode(&bytes)?;
        Ok((describe, handles.pop()))
    }
}

/// Send a describe message, optionally carrying one handle.
pub fn send_describe(channel: &Channel, describe: &Describe, handle: Option<Handle>) -> Result<()> {
    let mut buf = BytesMut::with_capacity(DESCRIBE_SIZE);
    describe.encode(&mut buf);
    debug!(
        status = describe.status,
        protocol = describe.protocol,
        with_handle = handle.is_some(),
        "sending describe"
    );
    channel.write(&buf, handle.into_iter().collect())?;
    Ok(())
}

/// Encode the status-only reply used when a handoff fails.
pub fn encode_handoff_error(status: i32) -> [u8; HANDOFF_ERROR_SIZE] {
    let mut buf = [0u8; HANDOFF_ERROR_SIZE];
    buf[..4].copy_from_slice(&status.to_le_bytes());
    buf
}
