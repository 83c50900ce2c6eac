//! In-memory representation of a classic CAN frame.
use embedded_can::{ExtendedId, Id, StandardId};

use crate::core::{FixedBytes, MAX_DATA_LEN};
use crate::error::FrameError;

/// Transmission strategy requested from the controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendType {
    /// Regular transmission with automatic retransmission on error.
    #[default]
    Normal,
    /// Transmit once, no retransmission.
    SingleShot,
    /// Transmit and receive the frame back on the same channel.
    SelfReceive,
}

impl SendType {
    /// Numeric tag used by the driver.
    pub fn raw(self) -> u8 {
        match self {
            SendType::Normal => 0,
            SendType::SingleShot => 1,
            SendType::SelfReceive => 2,
        }
    }
}

impl TryFrom<u8> for SendType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SendType::Normal),
            1 => Ok(SendType::SingleShot),
            2 => Ok(SendType::SelfReceive),
            other => Err(FrameError::InvalidSendType(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// One CAN message: identifier, up to eight data bytes and flags.
///
/// A remote frame carries a data length code but no payload bytes.
pub struct CanFrame {
    id: Id,
    remote: bool,
    send_type: SendType,
    /// Capture time in 0.1 ms units, set by the driver on reception.
    timestamp: u32,
    payload: FixedBytes<MAX_DATA_LEN>,
}

impl CanFrame {
    /// Build a data frame. Fails when `data` is longer than eight bytes.
    pub fn new(id: impl Into<Id>, data: &[u8]) -> Result<Self, FrameError> {
        let payload = FixedBytes::try_from_slice(data)
            .map_err(|e| FrameError::DataTooLong { len: e.len })?;
        Ok(Self {
            id: id.into(),
            remote: false,
            send_type: SendType::Normal,
            timestamp: 0,
            payload,
        })
    }

    /// Build a remote (request) frame asking for `dlc` bytes.
    pub fn new_remote(id: impl Into<Id>, dlc: usize) -> Result<Self, FrameError> {
        let payload =
            FixedBytes::zeroed(dlc).map_err(|e| FrameError::DataTooLong { len: e.len })?;
        Ok(Self {
            id: id.into(),
            remote: true,
            send_type: SendType::Normal,
            timestamp: 0,
            payload,
        })
    }

    /// Build a data frame from a raw identifier and its format flag.
    pub fn from_raw_id(raw_id: u32, extended: bool, data: &[u8]) -> Result<Self, FrameError> {
        Self::new(raw_to_id(raw_id, extended)?, data)
    }

    /// Same frame with another transmission strategy.
    pub fn with_send_type(mut self, send_type: SendType) -> Self {
        self.send_type = send_type;
        self
    }

    /// Same frame stamped with a capture time (0.1 ms units).
    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Identifier without its format flag.
    pub fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(id) => id.as_raw() as u32,
            Id::Extended(id) => id.as_raw(),
        }
    }

    #[inline]
    pub fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    #[inline]
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    #[inline]
    pub fn send_type(&self) -> SendType {
        self.send_type
    }

    #[inline]
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Data length code (0 to 8).
    #[inline]
    pub fn dlc(&self) -> usize {
        self.payload.len()
    }

    /// Payload bytes; always empty for remote frames.
    pub fn data(&self) -> &[u8] {
        if self.remote {
            &[]
        } else {
            self.payload.as_slice()
        }
    }

    /// Compare identifier, flags and payload, ignoring capture time and send type.
    pub fn same_content(&self, other: &CanFrame) -> bool {
        self.id == other.id
            && self.remote == other.remote
            && self.dlc() == other.dlc()
            && self.data() == other.data()
    }
}

/// Validate a raw identifier against the 11-bit or 29-bit range.
pub fn raw_to_id(raw_id: u32, extended: bool) -> Result<Id, FrameError> {
    let id = if extended {
        ExtendedId::new(raw_id).map(Id::Extended)
    } else {
        u16::try_from(raw_id)
            .ok()
            .and_then(StandardId::new)
            .map(Id::Standard)
    };
    id.ok_or(FrameError::IdOutOfRange {
        id: raw_id,
        extended,
    })
}

impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        CanFrame::new(id, data).ok()
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        CanFrame::new_remote(id, dlc).ok()
    }

    fn is_extended(&self) -> bool {
        CanFrame::is_extended(self)
    }

    fn is_remote_frame(&self) -> bool {
        self.remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        CanFrame::dlc(self)
    }

    fn data(&self) -> &[u8] {
        CanFrame::data(self)
    }
}

//==================================================================================TESTS
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
