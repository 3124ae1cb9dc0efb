//! Translation between poll events and object wait signals.
//!
//! The five shared event bits live in the user signal band; the hang-up
//! direction travels separately through the peer-closed signal.

use bitflags::bitflags;
use remoteio_transport::{Signals, USER_SIGNAL_SHIFT};

bitflags! {
    /// Readiness events, with POSIX `poll` bit values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PollEvents: u32 {
        const IN = 0x0001;
        const PRI = 0x0002;
        const OUT = 0x0004;
        const ERR = 0x0008;
        const HUP = 0x0010;
        const RDHUP = 0x2000;
    }
}

/// Shift applied to the shared event bits.
pub const POLL_SHIFT: u32 = USER_SIGNAL_SHIFT;

/// The event bits that map one-to-one onto signals.
pub const POLL_MASK: u32 = 0x1f;

/// Map the shared event bits into the signal band.
pub fn to_signals(events: PollEvents) -> Signals {
    Signals::from_bits_retain((events.bits() & POLL_MASK) << POLL_SHIFT)
}

/// Recover the shared event bits from a signal set.
pub fn from_signals(signals: Signals) -> PollEvents {
    PollEvents::from_bits_retain((signals.bits() >> POLL_SHIFT) & POLL_MASK)
}

/// Signals to wait for on a remote object's event handle.
///
/// `ERR` is always watched. A request for `RDHUP` adds the peer-closed
/// signal.
pub fn wait_begin(events: PollEvents) -> Signals {
    let mut signals = to_signals(events | PollEvents::ERR);
    if events.contains(PollEvents::RDHUP) {
        signals |= Signals::PEER_CLOSED;
    }
    signals
}

/// Events reported by an observed signal set.
pub fn wait_end(signals: Signals) -> PollEvents {
    let mut events = from_signals(signals);
    if signals.contains(Signals::PEER_CLOSED) {
        events |= PollEvents::RDHUP;
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_bits_round_trip_exactly() {
        for bits in 0..=POLL_MASK {
            let events = PollEvents::from_bits_retain(bits);
            assert_eq!(wait_end(to_signals(events)), events);
            assert_eq!(from_signals(to_signals(events)), events);
        }
    }

    #[test]
    fn wait_begin_always_watches_err() {
        for bits in 0..=POLL_MASK {
            let events = PollEvents::from_bits_retain(bits);
            let signals = wait_begin(events);
            assert_eq!(wait_end(signals), events | PollEvents::ERR);
            assert!(!signals.contains(Signals::PEER_CLOSED));
        }
    }

    #[test]
    fn hang_up_uses_peer_closed() {
        let signals = wait_begin(PollEvents::IN | PollEvents::RDHUP);
        assert!(signals.contains(Signals::PEER_CLOSED));
        assert!(signals.contains(Signals::USER_0));
        let events = wait_end(Signals::PEER_CLOSED);
        assert_eq!(events, PollEvents::RDHUP);
        assert_eq!(
            wait_end(signals),
            PollEvents::IN | PollEvents::ERR | PollEvents::RDHUP
        );
    }

    #[test]
    fn bit_positions() {
        assert_eq!(to_signals(PollEvents::IN), Signals::USER_0);
        assert_eq!(to_signals(PollEvents::HUP), Signals::USER_4);
        assert_eq!(to_signals(PollEvents::RDHUP), Signals::empty());
    }
}
