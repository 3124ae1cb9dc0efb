use std::fmt;

/// A kernel status code.
///
/// Zero is success; every error is negative. Remote peers send these codes
/// verbatim inside replies, so unknown negative values must survive a round
/// trip untouched.
#[derive(Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{} ({})", self.name(), self.0)]
pub struct Status(i32);

impl Status {
    pub const OK: Status = Status(0);
    pub const INTERNAL: Status = Status(-1);
    pub const NOT_SUPPORTED: Status = Status(-2);
    pub const NO_RESOURCES: Status = Status(-3);
    pub const CALL_FAILED: Status = Status(-5);
    pub const INVALID_ARGS: Status = Status(-10);
    pub const BAD_HANDLE: Status = Status(-11);
    pub const WRONG_TYPE: Status = Status(-12);
    pub const OUT_OF_RANGE: Status = Status(-14);
    pub const BUFFER_TOO_SMALL: Status = Status(-15);
    pub const BAD_STATE: Status = Status(-20);
    pub const SHOULD_WAIT: Status = Status(-22);
    pub const PEER_CLOSED: Status = Status(-24);
    pub const NOT_FOUND: Status = Status(-25);
    pub const ALREADY_EXISTS: Status = Status(-26);
    pub const UNAVAILABLE: Status = Status(-28);
    pub const IO: Status = Status(-40);
    pub const BAD_PATH: Status = Status(-50);

    /// Wrap a raw status value.
    pub const fn from_raw(raw: i32) -> Self {
        Status(raw)
    }

    /// The raw wire value.
    pub const fn into_raw(self) -> i32 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Split a raw reply value into a non-negative result or an error status.
    pub fn ok(raw: i32) -> Result<i32> {
        if raw < 0 {
            Err(Status(raw))
        } else {
            Ok(raw)
        }
    }

    /// Human-readable name of the status code.
    pub fn name(self) -> &'static str {
        match self {
            Status::OK => "OK",
            Status::INTERNAL => "INTERNAL",
            Status::NOT_SUPPORTED => "NOT_SUPPORTED",
            Status::NO_RESOURCES => "NO_RESOURCES",
            Status::CALL_FAILED => "CALL_FAILED",
            Status::INVALID_ARGS => "INVALID_ARGS",
            Status::BAD_HANDLE => "BAD_HANDLE",
            Status::WRONG_TYPE => "WRONG_TYPE",
            Status::OUT_OF_RANGE => "OUT_OF_RANGE",
            Status::BUFFER_TOO_SMALL => "BUFFER_TOO_SMALL",
            Status::BAD_STATE => "BAD_STATE",
            Status::SHOULD_WAIT => "SHOULD_WAIT",
            Status::PEER_CLOSED => "PEER_CLOSED",
            Status::NOT_FOUND => "NOT_FOUND",
            Status::ALREADY_EXISTS => "ALREADY_EXISTS",
            Status::UNAVAILABLE => "UNAVAILABLE",
            Status::IO => "IO",
            Status::BAD_PATH => "BAD_PATH",
            _ => "UNKNOWN",
        }
    }

    /// POSIX errno equivalent, for callers exposing a file-descriptor API.
    #[cfg(unix)]
    pub fn to_errno(self) -> i32 {
        match self {
            Status::OK => 0,
            Status::NOT_SUPPORTED => libc::ENOTSUP,
            Status::NO_RESOURCES => libc::ENOMEM,
            Status::INVALID_ARGS | Status::OUT_OF_RANGE => libc::EINVAL,
            Status::BAD_HANDLE | Status::BAD_STATE => libc::EBADF,
            Status::WRONG_TYPE => libc::EPROTOTYPE,
            Status::BUFFER_TOO_SMALL => libc::ENOBUFS,
            Status::SHOULD_WAIT => libc::EAGAIN,
            Status::PEER_CLOSED => libc::EPIPE,
            Status::NOT_FOUND => libc::ENOENT,
            Status::ALREADY_EXISTS => libc::EEXIST,
            Status::UNAVAILABLE => libc::EBUSY,
            Status::BAD_PATH => libc::ENAMETOOLONG,
            _ => libc::EIO,
        }
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({}={})", self.name(), self.0)
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.0
    }
}

pub type Result<T> = std::result::Result<T, Status>;
