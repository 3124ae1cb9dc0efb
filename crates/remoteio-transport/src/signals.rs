use bitflags::bitflags;

bitflags! {
    /// Observable object state bits used by [`Handle::wait_one`](crate::Handle::wait_one).
    ///
    /// The low bits are object-defined; bits 24..=31 form the user band that
    /// servers assert on auxiliary event objects.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Signals: u32 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const PEER_CLOSED = 1 << 2;
        const SIGNALED = 1 << 3;

        const USER_0 = 1 << 24;
        const USER_1 = 1 << 25;
        const USER_2 = 1 << 26;
        const USER_3 = 1 << 27;
        const USER_4 = 1 << 28;
        const USER_5 = 1 << 29;
        const USER_6 = 1 << 30;
        const USER_7 = 1 << 31;

        const USER_ALL = 0xFF00_0000;
    }
}

/// Bit position of [`Signals::USER_0`].
pub const USER_SIGNAL_SHIFT: u32 = 24;
