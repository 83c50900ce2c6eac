//! Error definitions shared across library modules.
//!
//! [`ErrorCode`] is the bitset reported by the adapter (several bits may be
//! raised at once). [`CanError`] is what every fallible operation returns;
//! [`FrameError`] covers frame construction constraints.
use bitflags::bitflags;
use thiserror_no_std::Error;

bitflags! {
    /// Error bits reported by the CAN controller and the driver.
    ///
    /// The low byte carries controller (bus-level) conditions, which are
    /// asynchronous and only observed through diagnostics queries. The high
    /// byte carries command failures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ErrorCode: u32 {
        /// Controller receive FIFO overflowed.
        const OVERFLOW = 0x0001;
        /// Controller crossed the error-warning threshold.
        const ERROR_ALARM = 0x0002;
        /// Controller entered the error-passive state.
        const PASSIVE = 0x0004;
        /// Controller lost bus arbitration.
        const ARBITRATION_LOST = 0x0008;
        /// Generic bus error.
        const BUS_ERROR = 0x0010;

        const DEVICE_ALREADY_OPEN = 0x0100;
        const DEVICE_OPEN_FAILED = 0x0200;
        const DEVICE_NOT_OPEN = 0x0400;
        const BUFFER_OVERFLOW = 0x0800;
        const DEVICE_NOT_EXIST = 0x1000;
        const DRIVER_LOAD_FAILED = 0x2000;
        const COMMAND_FAILED = 0x4000;
        const BUFFER_CREATE_FAILED = 0x8000;
    }
}

impl ErrorCode {
    /// No error bit set.
    pub const NO_ERROR: Self = Self::empty();

    /// Conditions raised by the controller itself, independent of any command.
    pub const BUS_LEVEL: Self = Self::OVERFLOW
        .union(Self::ERROR_ALARM)
        .union(Self::PASSIVE)
        .union(Self::ARBITRATION_LOST)
        .union(Self::BUS_ERROR);

    /// Bus-level bits only.
    pub fn bus_level(self) -> Self {
        self.intersection(Self::BUS_LEVEL)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Constraint violations while building a frame.
pub enum FrameError {
    /// Classic CAN frames carry at most eight bytes.
    #[error("Data length {len} exceeds 8 bytes")]
    DataTooLong { len: usize },
    /// Identifier does not fit in 11 bits (standard) or 29 bits (extended).
    #[error("Identifier {id:#X} out of range (extended: {extended})")]
    IdOutOfRange { id: u32, extended: bool },
    /// Unknown send type tag.
    #[error("Invalid send type {0}")]
    InvalidSendType(u8),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Result error of every device, channel and registry operation.
pub enum CanError {
    /// Open attempted on an adapter that is already held.
    #[error("Device already open")]
    DeviceAlreadyOpen,
    /// Open failed for a device or hardware reason.
    #[error("Device open failed")]
    DeviceOpenFailed,
    /// Operation on a closed device or a stopped channel.
    #[error("Device or channel not open")]
    DeviceNotOpen,
    /// Transmit buffer has no room left.
    #[error("Transmit buffer full")]
    BufferFull,
    /// No hardware matches the requested type and index.
    #[error("Device does not exist")]
    DeviceNotExist,
    /// Numeric model identifier not recognised.
    #[error("Unknown device type {0}")]
    UnknownDeviceType(u32),
    /// The native driver module could not be loaded.
    #[error("Driver load failed")]
    DriverLoadFailed,
    /// Command rejected by the hardware (timing, filter, register access...).
    #[error("Command failed")]
    CommandFailed,
    /// Driver could not allocate a buffer.
    #[error("Buffer allocation failed")]
    BufferCreateFailed,
    /// Channel index beyond the channel count reported by the device.
    #[error("Invalid channel {channel}, device has {count}")]
    InvalidChannel { channel: u8, count: u8 },
    /// The channel must be stopped before it can be started again.
    #[error("Channel {0} already started")]
    ChannelAlreadyStarted(u8),
    /// Transmission attempted on a listen-only channel.
    #[error("Channel is listen-only")]
    ListenOnly,
    /// Another receive is already waiting on this channel.
    #[error("Receive already in progress")]
    ReceiverBusy,
    /// The wait was interrupted because the channel was stopped.
    #[error("Receive cancelled")]
    Cancelled,
    /// Frame constraint violation.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Bits reported by the driver that have no dedicated variant.
    #[error("Driver error {0:?}")]
    Driver(ErrorCode),
}

impl CanError {
    /// Translate a driver error word into the most specific error.
    ///
    /// Command failure bits take precedence over bus-level bits.
    pub fn from_code(code: ErrorCode) -> Self {
        const ORDERED: [(ErrorCode, CanError); 8] = [
            (ErrorCode::DRIVER_LOAD_FAILED, CanError::DriverLoadFailed),
            (ErrorCode::DEVICE_NOT_EXIST, CanError::DeviceNotExist),
            (ErrorCode::DEVICE_ALREADY_OPEN, CanError::DeviceAlreadyOpen),
            (ErrorCode::DEVICE_OPEN_FAILED, CanError::DeviceOpenFailed),
            (ErrorCode::DEVICE_NOT_OPEN, CanError::DeviceNotOpen),
            (ErrorCode::BUFFER_OVERFLOW, CanError::BufferFull),
            (ErrorCode::BUFFER_CREATE_FAILED, CanError::BufferCreateFailed),
            (ErrorCode::COMMAND_FAILED, CanError::CommandFailed),
        ];

        ORDERED
            .iter()
            .find(|(bit, _)| code.contains(*bit))
            .map(|(_, err)| *err)
            .unwrap_or(if code.is_empty() {
                CanError::CommandFailed
            } else {
                CanError::Driver(code)
            })
    }

    /// Error word equivalent of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CanError::DeviceAlreadyOpen => ErrorCode::DEVICE_ALREADY_OPEN,
            CanError::DeviceOpenFailed => ErrorCode::DEVICE_OPEN_FAILED,
            CanError::DeviceNotOpen | CanError::Cancelled => ErrorCode::DEVICE_NOT_OPEN,
            CanError::BufferFull => ErrorCode::BUFFER_OVERFLOW,
            CanError::DeviceNotExist | CanError::UnknownDeviceType(_) => {
                ErrorCode::DEVICE_NOT_EXIST
            }
            CanError::DriverLoadFailed => ErrorCode::DRIVER_LOAD_FAILED,
            CanError::BufferCreateFailed => ErrorCode::BUFFER_CREATE_FAILED,
            CanError::CommandFailed
            | CanError::InvalidChannel { .. }
            | CanError::ChannelAlreadyStarted(_)
            | CanError::ListenOnly
            | CanError::ReceiverBusy
            | CanError::Frame(_) => ErrorCode::COMMAND_FAILED,
            CanError::Driver(code) => *code,
        }
    }

    /// The open attempt cannot succeed by retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CanError::DriverLoadFailed | CanError::DeviceNotExist | CanError::UnknownDeviceType(_)
        )
    }

    /// The caller may retry or back off.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CanError::BufferFull | CanError::ReceiverBusy => true,
            CanError::Driver(code) => code.contains(ErrorCode::OVERFLOW),
            _ => false,
        }
    }
}
