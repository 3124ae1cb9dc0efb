//! Protocol-type tags naming the kind of object behind a connection.

/// Resolved object type, reported by describe replies and startup handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Protocol {
    Remote = 1,
    Pipe = 2,
    Vmofile = 3,
    Service = 4,
    Socket = 5,
    SocketConnected = 6,
}

impl Protocol {
    pub fn from_raw(raw: u32) -> Option<Protocol> {
        match raw {
            1 => Some(Protocol::Remote),
            2 => Some(Protocol::Pipe),
            3 => Some(Protocol::Vmofile),
            4 => Some(Protocol::Service),
            5 => Some(Protocol::Socket),
            6 => Some(Protocol::SocketConnected),
            _ => None,
        }
    }

    pub const fn raw(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Remote => "remote",
            Protocol::Pipe => "pipe",
            Protocol::Vmofile => "vmofile",
            Protocol::Service => "service",
            Protocol::Socket => "socket",
            Protocol::SocketConnected => "socket-connected",
        }
    }
}

impl From<Protocol> for u32 {
    fn from(protocol: Protocol) -> Self {
        protocol.raw()
    }
}
