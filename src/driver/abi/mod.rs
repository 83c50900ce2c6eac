//! Binary layouts exchanged with the vendor `CanCmd` library.
//!
//! Field order, widths and inline array sizes mirror the native structures
//! exactly (`#[repr(C)]`, sequential, natural alignment). The conversions
//! below are the only place where raw flags and lengths are trusted or
//! rejected; everything above works with the checked model types.

use crate::core::{FixedBytes, DESCRIPTION_LEN, HARDWARE_TYPE_LEN, MAX_DATA_LEN, SERIAL_NUMBER_LEN};
use crate::device::config::ChannelConfig;
use crate::device::info::{DeviceInfo, ErrorInfo};
use crate::error::{ErrorCode, FrameError};
use crate::transport::can_frame::{raw_to_id, CanFrame, SendType};

/// Native success result.
pub const CAN_RESULT_OK: u32 = 1;
/// Native failure result.
pub const CAN_RESULT_ERROR: u32 = 0;

//==================================================================================DATA_FRAME
/// `CAN_DataFrame`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawDataFrame {
    pub time_flag: u32,
    pub send_type: u8,
    pub remote_flag: u8,
    pub extern_flag: u8,
    pub data_len: u8,
    pub id: u32,
    pub data: [u8; MAX_DATA_LEN],
}

impl From<&CanFrame> for RawDataFrame {
    fn from(frame: &CanFrame) -> Self {
        let mut data = [0u8; MAX_DATA_LEN];
        data[..frame.data().len()].copy_from_slice(frame.data());
        Self {
            time_flag: frame.timestamp(),
            send_type: frame.send_type().raw(),
            remote_flag: frame.is_remote() as u8,
            extern_flag: frame.is_extended() as u8,
            data_len: frame.dlc() as u8,
            id: frame.raw_id(),
            data,
        }
    }
}

impl TryFrom<RawDataFrame> for CanFrame {
    type Error = FrameError;

    fn try_from(raw: RawDataFrame) -> Result<Self, Self::Error> {
        let len = raw.data_len as usize;
        if len > MAX_DATA_LEN {
            return Err(FrameError::DataTooLong { len });
        }
        let id = raw_to_id(raw.id, raw.extern_flag != 0)?;
        let frame = if raw.remote_flag != 0 {
            CanFrame::new_remote(id, len)?
        } else {
            CanFrame::new(id, &raw.data[..len])?
        };
        Ok(frame
            .with_send_type(SendType::try_from(raw.send_type)?)
            .with_timestamp(raw.time_flag))
    }
}

//==================================================================================DEVICE_INFORMATION
/// `CAN_DeviceInformation`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawDeviceInformation {
    pub hardware_version: u16,
    pub firmware_version: u16,
    pub driver_version: u16,
    pub interface_version: u16,
    pub interrupt_number: u16,
    pub channel_number: u8,
    pub serial_number: [u8; SERIAL_NUMBER_LEN],
    pub hardware_type: [u8; HARDWARE_TYPE_LEN],
    pub description: [u8; DESCRIPTION_LEN],
}

impl Default for RawDeviceInformation {
    fn default() -> Self {
        Self {
            hardware_version: 0,
            firmware_version: 0,
            driver_version: 0,
            interface_version: 0,
            interrupt_number: 0,
            channel_number: 0,
            serial_number: [0; SERIAL_NUMBER_LEN],
            hardware_type: [0; HARDWARE_TYPE_LEN],
            description: [0; DESCRIPTION_LEN],
        }
    }
}

impl From<&RawDeviceInformation> for DeviceInfo {
    fn from(raw: &RawDeviceInformation) -> Self {
        DeviceInfo::builder(raw.channel_number)
            .versions(
                raw.hardware_version,
                raw.firmware_version,
                raw.driver_version,
                raw.interface_version,
            )
            .interrupt_number(raw.interrupt_number)
            .serial_number(FixedBytes::from_nul_padded(&raw.serial_number).as_slice())
            .hardware_type(FixedBytes::from_nul_padded(&raw.hardware_type).as_slice())
            .description(FixedBytes::from_nul_padded(&raw.description).as_slice())
            .build()
    }
}

impl From<&DeviceInfo> for RawDeviceInformation {
    fn from(info: &DeviceInfo) -> Self {
        Self {
            hardware_version: info.hardware_version(),
            firmware_version: info.firmware_version(),
            driver_version: info.driver_version(),
            interface_version: info.interface_version(),
            interrupt_number: info.interrupt_number(),
            channel_number: info.channel_count(),
            serial_number: info.serial_number().to_padded(),
            hardware_type: info.hardware_type().to_padded(),
            description: info.description().to_padded(),
        }
    }
}

//==================================================================================ERROR_INFORMATION
/// `CAN_ErrorInformation`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawErrorInformation {
    pub error_code: u32,
    pub passive_err_data: [u8; 3],
    pub ar_lost_err_data: u8,
}

impl From<RawErrorInformation> for ErrorInfo {
    fn from(raw: RawErrorInformation) -> Self {
        ErrorInfo {
            // Undocumented bits are kept rather than dropped.
            code: ErrorCode::from_bits_retain(raw.error_code),
            passive: raw.passive_err_data,
            arbitration_lost: raw.ar_lost_err_data,
        }
    }
}

impl From<&ErrorInfo> for RawErrorInformation {
    fn from(info: &ErrorInfo) -> Self {
        Self {
            error_code: info.code.bits(),
            passive_err_data: info.passive,
            ar_lost_err_data: info.arbitration_lost,
        }
    }
}

//==================================================================================INIT_CONFIG
/// `CAN_InitConfig`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawInitConfig {
    /// 0 normal, 1 listen-only.
    pub mode: u8,
    /// 1 SJA1000, 0 LPC21xx.
    pub btr_type: u8,
    pub btr: [u8; 4],
    pub acc_code: u32,
    pub acc_mask: u32,
    /// 0 none, 1 dual, 2 single.
    pub filter: u8,
    pub reserved: u8,
}

impl From<&ChannelConfig> for RawInitConfig {
    fn from(config: &ChannelConfig) -> Self {
        let (btr_type, btr) = config.timing.to_registers();
        let (filter, acc_code, acc_mask) = config.filter.to_raw();
        Self {
            mode: config.mode.raw(),
            btr_type,
            btr,
            acc_code,
            acc_mask,
            filter,
            reserved: 0,
        }
    }
}

impl TryFrom<&RawInitConfig> for ChannelConfig {
    type Error = crate::error::CanError;

    fn try_from(raw: &RawInitConfig) -> Result<Self, Self::Error> {
        use crate::device::config::{BitTiming, Filter, WorkMode};
        use crate::error::CanError;

        let mode = WorkMode::from_raw(raw.mode).ok_or(CanError::CommandFailed)?;
        let timing =
            BitTiming::from_registers(raw.btr_type, raw.btr).ok_or(CanError::CommandFailed)?;
        let filter =
            Filter::from_raw(raw.filter, raw.acc_code, raw.acc_mask).ok_or(CanError::CommandFailed)?;
        Ok(ChannelConfig {
            mode,
            timing,
            filter,
        })
    }
}

//==================================================================================TESTS
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
