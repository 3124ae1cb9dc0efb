use remoteio_frame::FrameError;
use remoteio_transport::Status;

/// Errors returned by remote I/O operations.
///
/// Every variant projects back onto a wire status through
/// [`RioError::status`].
#[derive(Debug, thiserror::Error)]
pub enum RioError {
    /// A request was rejected locally before reaching the transport.
    #[error("invalid arguments: {0}")]
    InvalidArgs(&'static str),

    /// A path of `len` bytes does not fit the protocol's path limit.
    #[error("path too long ({len} bytes, limit {max})")]
    BadPath { len: usize, max: usize },

    /// The peer violated the protocol.
    #[error("protocol violation: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("unavailable: {0}")]
    Unavailable(&'static str),

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// The server resolved the object to a different protocol.
    #[error("wrong object type (protocol {protocol})")]
    WrongType { protocol: u32 },

    #[error("bad state: {0}")]
    BadState(&'static str),

    /// The peer answered with this negative status.
    #[error("remote error: {0}")]
    Remote(Status),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] Status),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

impl RioError {
    /// The wire status this error is reported as.
    pub fn status(&self) -> Status {
        match self {
            RioError::InvalidArgs(_) => Status::INVALID_ARGS,
            RioError::BadPath { .. } => Status::BAD_PATH,
            RioError::Io(_) => Status::IO,
            RioError::NotFound(_) => Status::NOT_FOUND,
            RioError::Unavailable(_) => Status::UNAVAILABLE,
            RioError::NotSupported(_) => Status::NOT_SUPPORTED,
            RioError::WrongType { .. } => Status::WRONG_TYPE,
            RioError::BadState(_) => Status::BAD_STATE,
            RioError::Remote(status) | RioError::Transport(status) => *status,
            RioError::Frame(err) => err.status(),
        }
    }

    pub(crate) fn io(what: impl Into<String>) -> Self {
        RioError::Io(what.into())
    }
}

pub type Result<T> = std::result::Result<T, RioError>;
