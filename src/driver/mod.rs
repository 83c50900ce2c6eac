//! Driver backends. A [`Driver`] is the flat capability set of the adapter
//! library: every call names the device handle and the channel explicitly and
//! none of them blocks. Waiting, cancellation and error latching live one
//! level up, in [`Channel`](crate::device::channel::Channel).
use crate::device::config::ChannelConfig;
use crate::device::info::{DeviceInfo, DeviceType, ErrorInfo};
use crate::error::CanError;
use crate::transport::can_frame::CanFrame;

pub mod abi;
#[cfg(feature = "native")]
pub mod native;
pub mod sim;

/// Opaque device handle issued by a driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverHandle(pub u32);

/// Adapter library capability set.
pub trait Driver: Send + Sync {
    /// Acquire exclusive ownership of adapter `index` of model `device_type`.
    fn open(
        &self,
        device_type: DeviceType,
        index: u32,
        description: &str,
    ) -> Result<DriverHandle, CanError>;

    /// Release the adapter. A second close of the same handle fails.
    fn close(&self, handle: DriverHandle) -> Result<(), CanError>;

    fn device_info(&self, handle: DriverHandle) -> Result<DeviceInfo, CanError>;

    /// Apply `config` entirely or not at all.
    fn start_channel(
        &self,
        handle: DriverHandle,
        channel: u8,
        config: &ChannelConfig,
    ) -> Result<(), CanError>;

    fn stop_channel(&self, handle: DriverHandle, channel: u8) -> Result<(), CanError>;

    /// Queue frames for transmission; returns how many were accepted.
    fn transmit(
        &self,
        handle: DriverHandle,
        channel: u8,
        frames: &[CanFrame],
    ) -> Result<usize, CanError>;

    /// Move up to `max_frames` queued frames into `out` without waiting.
    fn receive(
        &self,
        handle: DriverHandle,
        channel: u8,
        out: &mut Vec<CanFrame>,
        max_frames: usize,
    ) -> Result<usize, CanError>;

    fn pending_count(&self, handle: DriverHandle, channel: u8) -> Result<usize, CanError>;

    fn clear_receive_buffer(&self, handle: DriverHandle, channel: u8) -> Result<(), CanError>;

    /// Controller diagnostics. Whether this resets the controller state is
    /// up to the driver.
    fn error_info(&self, handle: DriverHandle, channel: u8) -> Result<ErrorInfo, CanError>;

    fn read_register(
        &self,
        handle: DriverHandle,
        channel: u8,
        address: u32,
        buf: &mut [u8],
    ) -> Result<(), CanError>;

    fn write_register(
        &self,
        handle: DriverHandle,
        channel: u8,
        address: u32,
        data: &[u8],
    ) -> Result<(), CanError>;
}
