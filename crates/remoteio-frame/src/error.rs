use remoteio_transport::{Status, WriteError};

/// Errors that can occur while encoding, validating or moving messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than a header arrived.
    #[error("message truncated ({size} bytes, header needs {need})")]
    Truncated { size: usize, need: usize },

    /// Header lengths disagree with the bytes and handles actually received,
    /// or exceed the protocol limits.
    #[error("invalid message (datalen {datalen}, hcount {hcount}, received {size} bytes)")]
    Invalid {
        datalen: u32,
        hcount: u32,
        size: usize,
    },

    /// The peer answered with an op this exchange does not allow.
    #[error("unexpected op {op:#x} ({name})")]
    UnexpectedOp { op: u32, name: &'static str },

    /// A describe message of the wrong shape.
    #[error("malformed describe message ({size} bytes, {handles} handles)")]
    BadDescribe { size: usize, handles: usize },

    /// The message could not be written; any handles it carried are inside.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// The transport refused a read or wait.
    #[error("transport error: {0}")]
    Transport(#[from] Status),
}

impl FrameError {
    /// The wire status this error is reported as.
    pub fn status(&self) -> Status {
        match self {
            FrameError::Truncated { .. } | FrameError::Invalid { .. } => Status::INVALID_ARGS,
            FrameError::UnexpectedOp { .. } | FrameError::BadDescribe { .. } => Status::IO,
            FrameError::Write(err) => err.status,
            FrameError::Transport(status) => *status,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
