//! Remote I/O message codec and validator.
//!
//! Every message is a fixed 32-byte little-endian header followed by at most
//! [`MAX_CHUNK`] payload bytes, with at most [`MAX_HANDLES`] handles carried
//! out of band by the transport. Receive paths validate every length field
//! against what the transport actually delivered before anything trusts it.

pub mod codec;
pub mod describe;
pub mod error;
pub mod ops;
pub mod protocol;
pub mod reader;
pub mod writer;

pub use codec::{
    validate, validate_reply, Header, Message, HEADER_SIZE, MAX_CHUNK, MAX_HANDLES,
    MAX_IOCTL_INPUT, MAX_MESSAGE_SIZE, MAX_PATH,
};
pub use describe::{
    encode_handoff_error, send_describe, Describe, ObjectExtra, DESCRIBE_SIZE, HANDOFF_ERROR_SIZE,
};
pub use error::{FrameError, Result};
pub use ops::{op_name, opcode, Op, ALL_OPS};
pub use protocol::Protocol;
pub use reader::{read_message, wait_message};
pub use writer::write_message;
