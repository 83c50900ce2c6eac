//! Asynchronous timer abstraction providing the delays a waiting receive
//! needs (poll interval and deadline). Keeps the crate independent from any
//! particular executor.
use embassy_time::Duration;

/// Timer trait abstraction. Shared between the tasks driving a channel.
pub trait BusTimer: Send + Sync {
    /// Asynchronously wait for `duration`.
    fn delay(&self, duration: Duration) -> impl core::future::Future<Output = ()> + Send;
}
