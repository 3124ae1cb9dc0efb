//! Remote I/O operation codes.
//!
//! The low byte selects the operation; bits 8..=9 of the code record how
//! many handles the request carries.

/// Operation code carried in every message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Op {
    /// Generic reply to any request.
    Status = 0x0000_0000,
    Close = 0x0000_0001,
    Clone = 0x0000_0102,
    Open = 0x0000_0103,
    Misc = 0x0000_0004,
    Read = 0x0000_0005,
    Write = 0x0000_0006,
    Seek = 0x0000_0007,
    Stat = 0x0000_0008,
    Readdir = 0x0000_0009,
    Ioctl = 0x0000_000a,
    Ioctl1H = 0x0000_010a,
    Ioctl2H = 0x0000_020a,
    Unlink = 0x0000_000b,
    ReadAt = 0x0000_000c,
    WriteAt = 0x0000_000d,
    Truncate = 0x0000_000e,
    Rename = 0x0000_010f,
    Setattr = 0x0000_0018,
    Sync = 0x0000_0019,
    Link = 0x0000_011a,
    Mmap = 0x0000_001b,
    Fcntl = 0x0000_001c,
    /// Out-of-band description sent after a describe open.
    OnOpen = 0x8000_0007,
}

/// Every op, in code order.
pub const ALL_OPS: [Op; 24] = [
    Op::Status,
    Op::Close,
    Op::Clone,
    Op::Open,
    Op::Misc,
    Op::Read,
    Op::Write,
    Op::Seek,
    Op::Stat,
    Op::Readdir,
    Op::Ioctl,
    Op::Ioctl1H,
    Op::Ioctl2H,
    Op::Unlink,
    Op::ReadAt,
    Op::WriteAt,
    Op::Truncate,
    Op::Rename,
    Op::Setattr,
    Op::Sync,
    Op::Link,
    Op::Mmap,
    Op::Fcntl,
    Op::OnOpen,
];

/// The operation selector of a raw code, ignoring the handle-count bits.
pub const fn opcode(raw: u32) -> u32 {
    raw & 0xff
}

impl Op {
    /// Parse an exact raw code.
    pub fn from_raw(raw: u32) -> Option<Op> {
        ALL_OPS.iter().copied().find(|op| op.raw() == raw)
    }

    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// True if `raw` selects this operation, whatever handle bits it carries.
    pub fn matches(self, raw: u32) -> bool {
        if self == Op::OnOpen {
            return raw == Op::OnOpen.raw();
        }
        raw & 0x8000_0000 == 0 && opcode(raw) == opcode(self.raw())
    }

    /// Number of handles a request with this op carries.
    pub const fn handle_count(self) -> usize {
        ((self as u32 >> 8) & 0x3) as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Op::Status => "status",
            Op::Close => "close",
            Op::Clone => "clone",
            Op::Open => "open",
            Op::Misc => "misc",
            Op::Read => "read",
            Op::Write => "write",
            Op::Seek => "seek",
            Op::Stat => "stat",
            Op::Readdir => "readdir",
            Op::Ioctl => "ioctl",
            Op::Ioctl1H => "ioctl_1h",
            Op::Ioctl2H => "ioctl_2h",
            Op::Unlink => "unlink",
            Op::ReadAt => "read_at",
            Op::WriteAt => "write_at",
            Op::Truncate => "truncate",
            Op::Rename => "rename",
            Op::Setattr => "setattr",
            Op::Sync => "sync",
            Op::Link => "link",
            Op::Mmap => "mmap",
            Op::Fcntl => "fcntl",
            Op::OnOpen => "on_open",
        }
    }
}

impl From<Op> for u32 {
    fn from(op: Op) -> Self {
        op.raw()
    }
}

/// Returns a human-readable name for a raw op code.
pub fn op_name(raw: u32) -> &'static str {
    if let Some(op) = Op::from_raw(raw) {
        return op.name();
    }
    if raw & 0x8000_0000 != 0 {
        return "unknown";
    }
    ALL_OPS
        .iter()
        .find(|op| op.matches(raw))
        .map_or("unknown", |op| op.name())
}
