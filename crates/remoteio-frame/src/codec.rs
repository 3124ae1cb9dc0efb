use bytes::{Buf, BufMut, Bytes, BytesMut};
use remoteio_transport::{Handle, Packet};
use tracing::warn;

use crate::error::{FrameError, Result};
use crate::ops::Op;

/// Header: txid (4) + op (4) + arg (4) + reserved (4) + arg2 (8) +
/// datalen (4) + hcount (4) = 32 bytes.
pub const HEADER_SIZE: usize = 32;

/// Largest inline payload of one message, and the chunk size of transfers.
pub const MAX_CHUNK: usize = 8192;

/// Largest number of handles one message may carry.
pub const MAX_HANDLES: usize = 3;

/// Largest ioctl input payload.
pub const MAX_IOCTL_INPUT: usize = 1024;

/// Path length limit. A path of `MAX_PATH` bytes or more is rejected.
pub const MAX_PATH: usize = 4096;

/// Largest message on the wire.
pub const MAX_MESSAGE_SIZE: usize = HEADER_SIZE + MAX_CHUNK;

/// Fixed-size message header.
///
/// `arg` carries the request argument and, in replies, the status or result.
/// `arg2` is a union: a signed offset, open/fcntl mode bits, or an ioctl op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub txid: u32,
    pub op: u32,
    pub arg: i32,
    pub reserved: u32,
    pub arg2: u64,
    pub datalen: u32,
    pub hcount: u32,
}

impl Header {
    pub fn new(op: Op) -> Self {
        Self {
            op: op.raw(),
            ..Self::default()
        }
    }

    pub fn offset(&self) -> i64 {
        self.arg2 as i64
    }

    pub fn set_offset(&mut self, offset: i64) {
        self.arg2 = offset as u64;
    }

    pub fn mode(&self) -> u32 {
        self.arg2 as u32
    }

    pub fn set_mode(&mut self, mode: u32) {
        self.arg2 = u64::from(mode);
    }

    pub fn ioctl_op(&self) -> u32 {
        self.arg2 as u32
    }

    pub fn set_ioctl_op(&mut self, op: u32) {
        self.arg2 = u64::from(op);
    }

    /// Encode the header into the wire format.
    ///
    /// Wire format (all little-endian):
    /// ```text
    /// ┌──────────┬─────────┬──────────┬────────────┬──────────┬───────────┬──────────┐
    /// │ txid 4B  │ op 4B   │ arg 4B   │ reserved 4B│ arg2 8B  │ datalen 4B│ hcount 4B│
    /// └──────────┴─────────┴──────────┴────────────┴──────────┴───────────┴──────────┘
    /// ```
    /// The txid leads so the transport can pair a call with its reply.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32_le(self.txid);
        dst.put_u32_le(self.op);
        dst.put_i32_le(self.arg);
        dst.put_u32_le(self.reserved);
        dst.put_u64_le(self.arg2);
        dst.put_u32_le(self.datalen);
        dst.put_u32_le(self.hcount);
    }

    /// Decode a header from the front of `src`.
    pub fn decode(mut src: &[u8]) -> Result<Header> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                size: src.len(),
                need: HEADER_SIZE,
            });
        }
        Ok(Header {
            txid: src.get_u32_le(),
            op: src.get_u32_le(),
            arg: src.get_i32_le(),
            reserved: src.get_u32_le(),
            arg2: src.get_u64_le(),
            datalen: src.get_u32_le(),
            hcount: src.get_u32_le(),
        })
    }
}

/// True iff the header's lengths are within protocol limits.
pub fn validate(header: &Header) -> bool {
    header.datalen as usize <= MAX_CHUNK && header.hcount as usize <= MAX_HANDLES
}

/// True iff a received message of `size` bytes is consistent with its header.
pub fn validate_reply(header: &Header, size: usize) -> bool {
    size >= HEADER_SIZE && header.datalen as usize == size - HEADER_SIZE && validate(header)
}

/// A remote I/O message: header, inline payload and attached handles.
///
/// `header.datalen` and `header.hcount` follow the payload and handle list
/// through the setters below.
#[derive(Debug, Default)]
pub struct Message {
    pub header: Header,
    data: Bytes,
    handles: Vec<Handle>,
}

fn wire_len(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

impl Message {
    pub fn new(op: Op) -> Self {
        Self {
            header: Header::new(op),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.set_data(data);
        self
    }

    pub fn with_handles(mut self, handles: Vec<Handle>) -> Self {
        self.set_handles(handles);
        self
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
        self.header.datalen = wire_len(self.data.len());
    }

    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    pub fn set_handles(&mut self, handles: Vec<Handle>) {
        self.handles = handles;
        self.header.hcount = wire_len(self.handles.len());
    }

    pub fn push_handle(&mut self, handle: Handle) {
        self.handles.push(handle);
        self.header.hcount = wire_len(self.handles.len());
    }

    /// Take ownership of every attached handle.
    pub fn take_handles(&mut self) -> Vec<Handle> {
        self.header.hcount = 0;
        std::mem::take(&mut self.handles)
    }

    /// Close every attached handle and drop the payload.
    pub fn discard(&mut self) {
        drop(self.take_handles());
        self.set_data(Bytes::new());
    }

    /// Protocol limits hold and the header agrees with the payload and
    /// handle list actually attached.
    pub fn is_valid(&self) -> bool {
        validate(&self.header)
            && self.header.datalen as usize == self.data.len()
            && self.header.hcount as usize == self.handles.len()
    }

    /// Encode header and payload.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.data.len());
        self.header.encode(&mut buf);
        buf.put_slice(&self.data);
        buf
    }

    /// Split into wire bytes and the handles to transfer alongside them.
    pub fn into_wire(self) -> (BytesMut, Vec<Handle>) {
        let bytes = self.encode();
        (bytes, self.handles)
    }

    /// Decode and validate a message received from the transport.
    ///
    /// The header's handle count is replaced by the number of handles the
    /// transport actually delivered. A message that fails validation has
    /// its handles closed before the error is returned.
    pub fn from_packet(packet: Packet) -> Result<Message> {
        let Packet { bytes, handles } = packet;
        let size = bytes.len();
        let mut header = Header::decode(&bytes)?;
        header.hcount = wire_len(handles.len());
        if !validate_reply(&header, size) {
            warn!(
                size,
                datalen = header.datalen,
                hcount = header.hcount,
                "discarding malformed message"
            );
            return Err(FrameError::Invalid {
                datalen: header.datalen,
                hcount: header.hcount,
                size,
            });
        }
        let data = Bytes::from(bytes).slice(HEADER_SIZE..);
        Ok(Message {
            header,
            data,
            handles,
        })
    }
}
