//! Static adapter description: model identifiers, the information block
//! captured at open time, and the controller diagnostics snapshot.
use core::fmt;

use crate::core::{FixedBytes, DESCRIPTION_LEN, HARDWARE_TYPE_LEN, SERIAL_NUMBER_LEN};
use crate::error::{CanError, ErrorCode};

//==================================================================================DEVICE_TYPE
/// Adapter models recognised by the driver.
///
/// The USB and Mini-PCIe variants of the 1xx/4xx series share numeric codes
/// 1 and 2; decoding a shared code yields the USB model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceType {
    Lcusb131b,
    Lcusb132b,
    Lcpci252,
    LcMiniPcie431,
    LcMiniPcie432,
    UsbCan1Ch,
    UsbCanC1Ch,
    UsbCanE1Ch,
    UsbCanE2Ch,
    MpcieCan1Ch,
    MpcieCan2Ch,
}

impl DeviceType {
    pub const ALL: [DeviceType; 11] = [
        DeviceType::Lcusb131b,
        DeviceType::Lcusb132b,
        DeviceType::Lcpci252,
        DeviceType::LcMiniPcie431,
        DeviceType::LcMiniPcie432,
        DeviceType::UsbCan1Ch,
        DeviceType::UsbCanC1Ch,
        DeviceType::UsbCanE1Ch,
        DeviceType::UsbCanE2Ch,
        DeviceType::MpcieCan1Ch,
        DeviceType::MpcieCan2Ch,
    ];

    /// Numeric model identifier passed to the driver.
    pub fn code(self) -> u32 {
        match self {
            DeviceType::Lcusb131b | DeviceType::LcMiniPcie431 => 1,
            DeviceType::Lcusb132b | DeviceType::LcMiniPcie432 => 2,
            DeviceType::Lcpci252 => 4,
            DeviceType::UsbCan1Ch => 13,
            DeviceType::UsbCanC1Ch => 14,
            DeviceType::UsbCanE1Ch => 15,
            DeviceType::UsbCanE2Ch => 16,
            DeviceType::MpcieCan1Ch => 17,
            DeviceType::MpcieCan2Ch => 18,
        }
    }

    /// Number of CAN channels the model provides.
    pub fn channel_count(self) -> u8 {
        match self {
            DeviceType::Lcusb131b
            | DeviceType::LcMiniPcie431
            | DeviceType::UsbCan1Ch
            | DeviceType::UsbCanC1Ch
            | DeviceType::UsbCanE1Ch
            | DeviceType::MpcieCan1Ch => 1,
            DeviceType::Lcusb132b
            | DeviceType::LcMiniPcie432
            | DeviceType::Lcpci252
            | DeviceType::UsbCanE2Ch
            | DeviceType::MpcieCan2Ch => 2,
        }
    }

    /// Model name as printed on the adapter.
    pub fn name(self) -> &'static str {
        match self {
            DeviceType::Lcusb131b => "LCUSB-131B",
            DeviceType::Lcusb132b => "LCUSB-132B",
            DeviceType::Lcpci252 => "LCPCI-252",
            DeviceType::LcMiniPcie431 => "LCMiniPcie-431",
            DeviceType::LcMiniPcie432 => "LCMiniPcie-432",
            DeviceType::UsbCan1Ch => "USBCAN-1CH",
            DeviceType::UsbCanC1Ch => "USBCAN-C-1CH",
            DeviceType::UsbCanE1Ch => "USBCAN-E-1CH",
            DeviceType::UsbCanE2Ch => "USBCAN-E-2CH",
            DeviceType::MpcieCan1Ch => "MPCIeCAN-1CH",
            DeviceType::MpcieCan2Ch => "MPCIeCAN-2CH",
        }
    }
}

impl TryFrom<u32> for DeviceType {
    type Error = CanError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        DeviceType::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or(CanError::UnknownDeviceType(code))
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//==================================================================================DEVICE_INFO
/// Adapter information, captured once when the device is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    hardware_version: u16,
    firmware_version: u16,
    driver_version: u16,
    interface_version: u16,
    interrupt_number: u16,
    channel_count: u8,
    serial_number: FixedBytes<SERIAL_NUMBER_LEN>,
    hardware_type: FixedBytes<HARDWARE_TYPE_LEN>,
    description: FixedBytes<DESCRIPTION_LEN>,
}

impl DeviceInfo {
    pub fn builder(channel_count: u8) -> DeviceInfoBuilder {
        DeviceInfoBuilder {
            info: DeviceInfo {
                hardware_version: 0,
                firmware_version: 0,
                driver_version: 0,
                interface_version: 0,
                interrupt_number: 0,
                channel_count,
                serial_number: FixedBytes::new(),
                hardware_type: FixedBytes::new(),
                description: FixedBytes::new(),
            },
        }
    }

    pub fn hardware_version(&self) -> u16 {
        self.hardware_version
    }

    pub fn firmware_version(&self) -> u16 {
        self.firmware_version
    }

    pub fn driver_version(&self) -> u16 {
        self.driver_version
    }

    pub fn interface_version(&self) -> u16 {
        self.interface_version
    }

    pub fn interrupt_number(&self) -> u16 {
        self.interrupt_number
    }

    pub fn channel_count(&self) -> u8 {
        self.channel_count
    }

    pub fn serial_number(&self) -> &FixedBytes<SERIAL_NUMBER_LEN> {
        &self.serial_number
    }

    pub fn hardware_type(&self) -> &FixedBytes<HARDWARE_TYPE_LEN> {
        &self.hardware_type
    }

    pub fn description(&self) -> &FixedBytes<DESCRIPTION_LEN> {
        &self.description
    }
}

/// Fluent builder used by driver implementations.
#[derive(Debug)]
pub struct DeviceInfoBuilder {
    info: DeviceInfo,
}

impl DeviceInfoBuilder {
    /// Hardware, firmware, driver and interface version words.
    pub fn versions(mut self, hardware: u16, firmware: u16, driver: u16, interface: u16) -> Self {
        self.info.hardware_version = hardware;
        self.info.firmware_version = firmware;
        self.info.driver_version = driver;
        self.info.interface_version = interface;
        self
    }

    pub fn interrupt_number(mut self, irq: u16) -> Self {
        self.info.interrupt_number = irq;
        self
    }

    /// Text fields are clamped to their fixed sizes (20/40/20 bytes).
    pub fn serial_number(mut self, serial: &[u8]) -> Self {
        self.info.serial_number.copy_from_slice(serial);
        self
    }

    pub fn hardware_type(mut self, hardware_type: &[u8]) -> Self {
        self.info.hardware_type.copy_from_slice(hardware_type);
        self
    }

    pub fn description(mut self, description: &[u8]) -> Self {
        self.info.description.copy_from_slice(description);
        self
    }

    pub fn build(self) -> DeviceInfo {
        self.info
    }
}

/// Render a version word the way the vendor tools do: 0x0102 → `V1.02`.
pub fn format_version(version: u16) -> String {
    format!("V{}.{:02X}", version >> 8, version & 0xFF)
}

//==================================================================================ERROR_INFO
/// Controller diagnostics snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    /// Error code capture, receive error counter, transmit error counter.
    pub passive: [u8; 3],
    /// Arbitration-lost capture; bits 4..0 hold the bit position.
    pub arbitration_lost: u8,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    /// No error bit raised.
    pub fn is_clear(&self) -> bool {
        self.code.is_empty()
    }

    pub fn error_code_capture(&self) -> u8 {
        self.passive[0]
    }

    pub fn rx_error_counter(&self) -> u8 {
        self.passive[1]
    }

    pub fn tx_error_counter(&self) -> u8 {
        self.passive[2]
    }

    /// Bit position at which arbitration was lost, when it was.
    pub fn arbitration_lost_bit(&self) -> Option<u8> {
        self.code
            .contains(ErrorCode::ARBITRATION_LOST)
            .then_some(self.arbitration_lost & 0x1F)
    }

    /// Fold a newer snapshot into this one.
    ///
    /// Error bits accumulate. Counters follow the newer snapshot; capture
    /// bytes are only replaced by non-zero captures.
    pub fn merge(&mut self, newer: &ErrorInfo) {
        self.code |= newer.code;
        self.passive[1] = newer.passive[1];
        self.passive[2] = newer.passive[2];
        if newer.passive[0] != 0 {
            self.passive[0] = newer.passive[0];
        }
        if newer.arbitration_lost != 0 {
            self.arbitration_lost = newer.arbitration_lost;
        }
    }
}
