use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a client or server endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    New = 0,
    Init = 1,
    Available = 2,
    Unavailable = 3,
    Closed = 4,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::New,
            1 => ChannelState::Init,
            2 => ChannelState::Available,
            3 => ChannelState::Unavailable,
            _ => ChannelState::Closed,
        }
    }
}

/// A [`ChannelState`] that can be read and moved concurrently.
#[derive(Debug)]
pub struct AtomicChannelState(AtomicU8);

impl AtomicChannelState {
    pub fn new(state: ChannelState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> ChannelState {
        ChannelState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `state` unless the endpoint is already closed. Closed is final.
    pub fn set(&self, state: ChannelState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ChannelState::Closed as u8).then_some(state as u8)
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.get() == ChannelState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_is_final() {
        let state = AtomicChannelState::new(ChannelState::New);
        assert!(state.set(ChannelState::Available));
        assert!(state.set(ChannelState::Closed));
        assert!(!state.set(ChannelState::Available));
        assert!(state.is_closed());
    }
}
