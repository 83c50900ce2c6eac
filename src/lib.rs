//! `cancmd` library: channel/device transport for CanCmd-family USB and PCI
//! CAN adapters. The crate exposes the frame model, the device and channel
//! handles, and the driver backends (an in-memory simulation and, behind the
//! `native` feature, the vendor library binding).
//!
//! ```rust, ignore
//! let registry = DeviceRegistry::new(SimDriver::loopback().with_adapter(DeviceType::UsbCan1Ch), timer);
//! let device = registry.open(DeviceType::UsbCan1Ch, 0, "bench")?;
//! let channel = device.start_channel(0, ChannelConfig::new(Bitrate::Kbps500))?;
//!
//! channel.send(&CanFrame::from_raw_id(0x123, false, &[1, 2, 3])?)?;
//! for frame in channel.receive(1, 1000).await? {
//!     // ...
//! }
//! ```
//==================================================================================
/// Fixed-capacity byte storage shared by frames and native layouts.
pub mod core;
/// Error codes reported by adapters and the errors returned by this crate.
pub mod error;
/// Frame value type, receive wait policy and async seams.
pub mod transport;
/// Registry, devices, channels and their configuration.
pub mod device;
/// Driver backends.
pub mod driver;
//==================================================================================
pub use device::channel::{Channel, Received};
pub use device::config::{BitTiming, Bitrate, ChannelConfig, Filter, WorkMode};
pub use device::info::{DeviceInfo, DeviceType, ErrorInfo};
pub use device::{Device, DeviceRegistry};
pub use driver::sim::SimDriver;
pub use driver::{Driver, DriverHandle};
pub use error::{CanError, ErrorCode, FrameError};
pub use transport::can_frame::{CanFrame, SendType};
pub use transport::traits::bus_timer::BusTimer;
pub use transport::traits::can_bus::CanBus;
pub use transport::{Timeout, INFINITE_WAIT, RECEIVE_POLL_INTERVAL};

#[cfg(feature = "native")]
pub use driver::native::NativeDriver;
