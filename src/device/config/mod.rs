//! Channel start-up configuration: work mode, bit timing and hardware
//! acceptance filter.
//!
//! Filter matching follows the SJA1000 PeliCAN acceptance filter. The 32-bit
//! code/mask words hold ACR0..ACR3 / AMR0..AMR3 with ACR0 in bits 31..24; a
//! mask bit set to `1` marks the corresponding code bit as "don't care".
use embedded_can::{ExtendedId, Id, StandardId};

use crate::transport::can_frame::CanFrame;

/// Oscillator frequency of the SJA1000 controllers fitted on the adapters.
pub const SJA1000_CLOCK_HZ: u32 = 16_000_000;

//==================================================================================WORK_MODE
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WorkMode {
    #[default]
    Normal,
    /// Receive only: the controller never transmits nor acknowledges.
    ListenOnly,
}

impl WorkMode {
    pub fn raw(self) -> u8 {
        match self {
            WorkMode::Normal => 0,
            WorkMode::ListenOnly => 1,
        }
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(WorkMode::Normal),
            1 => Some(WorkMode::ListenOnly),
            _ => None,
        }
    }
}

//==================================================================================BIT_TIMING
/// Standard bitrates with SJA1000 register presets (16 MHz crystal).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bitrate {
    Kbps5,
    Kbps10,
    Kbps20,
    Kbps50,
    Kbps100,
    Kbps125,
    Kbps250,
    Kbps500,
    Kbps800,
    Kbps1000,
}

impl Bitrate {
    pub fn bits_per_second(self) -> u32 {
        match self {
            Bitrate::Kbps5 => 5_000,
            Bitrate::Kbps10 => 10_000,
            Bitrate::Kbps20 => 20_000,
            Bitrate::Kbps50 => 50_000,
            Bitrate::Kbps100 => 100_000,
            Bitrate::Kbps125 => 125_000,
            Bitrate::Kbps250 => 250_000,
            Bitrate::Kbps500 => 500_000,
            Bitrate::Kbps800 => 800_000,
            Bitrate::Kbps1000 => 1_000_000,
        }
    }

    /// BTR0/BTR1 register pair.
    pub fn sja1000_registers(self) -> (u8, u8) {
        match self {
            Bitrate::Kbps5 => (0xBF, 0xFF),
            Bitrate::Kbps10 => (0x31, 0x1C),
            Bitrate::Kbps20 => (0x18, 0x1C),
            Bitrate::Kbps50 => (0x09, 0x1C),
            Bitrate::Kbps100 => (0x04, 0x1C),
            Bitrate::Kbps125 => (0x03, 0x1C),
            Bitrate::Kbps250 => (0x01, 0x1C),
            Bitrate::Kbps500 => (0x00, 0x1C),
            Bitrate::Kbps800 => (0x00, 0x16),
            Bitrate::Kbps1000 => (0x00, 0x14),
        }
    }
}

/// Bit-timing register set, in the layout of the controller variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BitTiming {
    /// SJA1000 BTR0/BTR1.
    Sja1000 { btr0: u8, btr1: u8 },
    /// LPC21xx CANxBTR register.
    Lpc21xx(u32),
}

impl From<Bitrate> for BitTiming {
    fn from(bitrate: Bitrate) -> Self {
        let (btr0, btr1) = bitrate.sja1000_registers();
        BitTiming::Sja1000 { btr0, btr1 }
    }
}

/// Decoded timing fields, all in time quanta except the prescaler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingSegments {
    pub prescaler: u16,
    pub sjw: u8,
    pub tseg1: u8,
    pub tseg2: u8,
    pub triple_sampling: bool,
    /// Extra clock division applied before the prescaler.
    clock_divider: u8,
}

impl TimingSegments {
    /// Quanta per bit, including the synchronisation segment.
    pub fn quanta_per_bit(&self) -> u32 {
        1 + self.tseg1 as u32 + self.tseg2 as u32
    }

    /// Nominal bitrate for a controller clocked at `clock_hz`.
    pub fn bitrate(&self, clock_hz: u32) -> u32 {
        clock_hz / (self.clock_divider as u32 * self.prescaler as u32 * self.quanta_per_bit())
    }

    /// Sample point in per mille of the bit time.
    pub fn sample_point_permille(&self) -> u32 {
        (1 + self.tseg1 as u32) * 1000 / self.quanta_per_bit()
    }

    /// Controllers require SJW ≤ TSEG2 ≤ TSEG1.
    pub fn is_valid(&self) -> bool {
        self.sjw <= self.tseg2 && self.tseg2 <= self.tseg1
    }
}

impl BitTiming {
    pub fn segments(&self) -> TimingSegments {
        match *self {
            BitTiming::Sja1000 { btr0, btr1 } => TimingSegments {
                prescaler: (btr0 & 0x3F) as u16 + 1,
                sjw: (btr0 >> 6) + 1,
                tseg1: (btr1 & 0x0F) + 1,
                tseg2: ((btr1 >> 4) & 0x07) + 1,
                triple_sampling: btr1 & 0x80 != 0,
                clock_divider: 2,
            },
            BitTiming::Lpc21xx(btr) => TimingSegments {
                prescaler: (btr & 0x3FF) as u16 + 1,
                sjw: ((btr >> 14) & 0x03) as u8 + 1,
                tseg1: ((btr >> 16) & 0x0F) as u8 + 1,
                tseg2: ((btr >> 20) & 0x07) as u8 + 1,
                triple_sampling: btr & (1 << 23) != 0,
                clock_divider: 1,
            },
        }
    }

    /// Controller variant tag and the four timing register bytes.
    pub fn to_registers(&self) -> (u8, [u8; 4]) {
        match *self {
            BitTiming::Sja1000 { btr0, btr1 } => (1, [btr0, btr1, 0, 0]),
            BitTiming::Lpc21xx(btr) => (0, btr.to_le_bytes()),
        }
    }

    pub fn from_registers(btr_type: u8, registers: [u8; 4]) -> Option<Self> {
        match btr_type {
            1 => Some(BitTiming::Sja1000 {
                btr0: registers[0],
                btr1: registers[1],
            }),
            0 => Some(BitTiming::Lpc21xx(u32::from_le_bytes(registers))),
            _ => None,
        }
    }
}

//==================================================================================FILTER
/// Hardware acceptance filter. The mode and its code/mask pair travel
/// together so an inconsistent combination cannot be expressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Every frame is accepted.
    #[default]
    None,
    /// One long filter over the identifier, RTR bit and first data bytes.
    Single { code: u32, mask: u32 },
    /// Two short filters; a frame passes when either matches.
    Dual { code: u32, mask: u32 },
}

impl Filter {
    /// Single filter passing exactly one standard identifier.
    pub fn standard_id(id: StandardId) -> Self {
        Filter::Single {
            code: (id.as_raw() as u32) << 21,
            mask: !(0x7FF << 21),
        }
    }

    /// Single filter passing exactly one extended identifier.
    pub fn extended_id(id: ExtendedId) -> Self {
        Filter::Single {
            code: id.as_raw() << 3,
            mask: 0x0000_0007,
        }
    }

    /// Driver encoding: filter mode, acceptance code, acceptance mask.
    pub fn to_raw(&self) -> (u8, u32, u32) {
        match *self {
            Filter::None => (0, 0, 0xFFFF_FFFF),
            Filter::Dual { code, mask } => (1, code, mask),
            Filter::Single { code, mask } => (2, code, mask),
        }
    }

    pub fn from_raw(mode: u8, code: u32, mask: u32) -> Option<Self> {
        match mode {
            0 => Some(Filter::None),
            1 => Some(Filter::Dual { code, mask }),
            2 => Some(Filter::Single { code, mask }),
            _ => None,
        }
    }

    /// Whether the controller would store `frame` in its receive FIFO.
    pub fn accepts(&self, frame: &CanFrame) -> bool {
        let rtr = frame.is_remote() as u32;
        let data = frame.data();

        match (*self, frame.id()) {
            (Filter::None, _) => true,

            (Filter::Single { code, mask }, Id::Standard(id)) => {
                let mut word = ((id.as_raw() as u32) << 21) | (rtr << 20);
                let mut present = 0xFFF0_0000;
                if let Some(d0) = data.first() {
                    word |= (*d0 as u32) << 8;
                    present |= 0x0000_FF00;
                }
                if let Some(d1) = data.get(1) {
                    word |= *d1 as u32;
                    present |= 0x0000_00FF;
                }
                matches(word, present, code, mask)
            }

            (Filter::Single { code, mask }, Id::Extended(id)) => {
                let word = (id.as_raw() << 3) | (rtr << 2);
                matches(word, 0xFFFF_FFFC, code, mask)
            }

            (Filter::Dual { code, mask }, Id::Standard(id)) => {
                let id = id.as_raw() as u32;
                let mut first = (id << 21) | (rtr << 20);
                let mut first_present = 0xFFF0_0000;
                if let Some(d0) = data.first() {
                    first |= (((*d0 as u32) >> 4) << 16) | (*d0 as u32 & 0x0F);
                    first_present |= 0x000F_000F;
                }
                let second = (id << 5) | (rtr << 4);

                matches(first, first_present, code, mask)
                    || matches(second, 0x0000_FFF0, code, mask)
            }

            (Filter::Dual { code, mask }, Id::Extended(id)) => {
                let high = id.as_raw() >> 13;
                matches(high << 16, 0xFFFF_0000, code, mask)
                    || matches(high, 0x0000_FFFF, code, mask)
            }
        }
    }
}

/// Compare the bits of `word` covered by `present` and not masked out.
#[inline]
fn matches(word: u32, present: u32, code: u32, mask: u32) -> bool {
    ((word ^ code) & !mask & present) == 0
}

//==================================================================================CHANNEL_CONFIG
/// Everything needed to start a channel. Applied atomically by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelConfig {
    pub mode: WorkMode,
    pub timing: BitTiming,
    pub filter: Filter,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(Bitrate::Kbps250)
    }
}

impl ChannelConfig {
    /// Normal mode, no filtering.
    pub fn new(timing: impl Into<BitTiming>) -> Self {
        Self {
            mode: WorkMode::Normal,
            timing: timing.into(),
            filter: Filter::None,
        }
    }

    pub fn with_mode(mut self, mode: WorkMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn listen_only(self) -> Self {
        self.with_mode(WorkMode::ListenOnly)
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

//==================================================================================TESTS
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
