//! Frame transport layer: the CAN frame value type, receive wait policy and
//! the abstraction traits used to plug a channel into asynchronous code.
//!
//! ## Timing constants
//!
//! A waiting receive polls the driver at a fixed interval. The native driver
//! offers no readiness notification, so the interval bounds the latency
//! between a frame landing in the hardware FIFO and the caller seeing it.

use embassy_time::Duration;

pub mod can_frame;
pub mod traits;

/// Interval between two driver polls while a receive is waiting.
pub const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Wait-time sentinel meaning "wait until a frame arrives or the channel stops".
pub const INFINITE_WAIT: i32 = -1;

/// How long a receive may wait when no frame is queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timeout {
    /// Return immediately with whatever is queued, possibly nothing.
    Poll,
    /// Wait at most this long for the first frame.
    After(Duration),
    /// Wait until at least one frame arrives or the channel is stopped.
    Infinite,
}

impl Timeout {
    /// Bounded wait expressed in milliseconds; `0` is a poll.
    pub fn millis(millis: u32) -> Self {
        if millis == 0 {
            Timeout::Poll
        } else {
            Timeout::After(Duration::from_millis(millis as u64))
        }
    }
}

/// Native wait-time convention: `0` polls, negative waits forever.
impl From<i32> for Timeout {
    fn from(wait_time: i32) -> Self {
        match wait_time {
            0 => Timeout::Poll,
            t if t < 0 => Timeout::Infinite,
            t => Timeout::After(Duration::from_millis(t as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_time_convention() {
        assert_eq!(Timeout::from(0), Timeout::Poll);
        assert_eq!(Timeout::from(INFINITE_WAIT), Timeout::Infinite);
        assert_eq!(Timeout::from(-42), Timeout::Infinite);
        assert_eq!(
            Timeout::from(1000),
            Timeout::After(Duration::from_millis(1000))
        );
        assert_eq!(Timeout::millis(0), Timeout::Poll);
    }
}
