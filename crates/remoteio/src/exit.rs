use std::fmt;

use remoteio_peer::RioError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Map a protocol error onto an exit code: locally rejected input is a
/// usage error, a misbehaving peer is invalid data.
pub fn rio_error(context: &str, err: RioError) -> CliError {
    let code = match &err {
        RioError::InvalidArgs(_) | RioError::BadPath { .. } => USAGE,
        RioError::Io(_) | RioError::WrongType { .. } | RioError::Frame(_) => DATA_INVALID,
        RioError::BadState(_) => INTERNAL,
        _ => FAILURE,
    };
    CliError::new(code, format!("{context}: {err} [{}]", err.status().name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use remoteio_transport::Status;

    #[test]
    fn codes_follow_error_kind() {
        assert_eq!(rio_error("x", RioError::BadPath { len: 1, max: 1 }).code, USAGE);
        assert_eq!(rio_error("x", RioError::Io("short".into())).code, DATA_INVALID);
        assert_eq!(rio_error("x", RioError::Remote(Status::NOT_FOUND)).code, FAILURE);
        let err = rio_error("open", RioError::Transport(Status::PEER_CLOSED));
        assert_eq!(err.code, FAILURE);
        assert!(err.message.contains("PEER_CLOSED"));
    }
}
