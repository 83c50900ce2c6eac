//! In-memory adapter library used for tests and host-side demos.
//!
//! Every adapter attached to a [`SimDriver`] hangs on one shared wire: a frame
//! transmitted by a started channel reaches every other started channel whose
//! acceptance filter lets it through. The transmitting channel receives its own
//! frame back when the frame asks for self-reception, or for every frame when
//! the driver was built with [`SimDriver::loopback`].
//!
//! Each channel models the controller FIFOs: a bounded receive FIFO (overflow
//! drops the frame and raises [`ErrorCode::OVERFLOW`]) and a bounded transmit
//! queue that can be held to emulate a bus that never frees the transmitter.
use core::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::device::config::{ChannelConfig, WorkMode};
use crate::device::info::{DeviceInfo, DeviceType, ErrorInfo};
use crate::driver::{Driver, DriverHandle};
use crate::error::{CanError, ErrorCode};
use crate::transport::can_frame::{CanFrame, SendType};

/// Default receive FIFO depth per channel.
pub const DEFAULT_RX_CAPACITY: usize = 1024;
/// Default transmit queue depth per channel.
pub const DEFAULT_TX_CAPACITY: usize = 64;
/// Size of the per-channel register file.
pub const REGISTER_FILE_LEN: usize = 128;

type AdapterKey = (DeviceType, u32);

struct SimChannel {
    config: Option<ChannelConfig>,
    rx: VecDeque<CanFrame>,
    tx: VecDeque<CanFrame>,
    hold_tx: bool,
    errors: ErrorInfo,
    registers: [u8; REGISTER_FILE_LEN],
}

impl SimChannel {
    fn new() -> Self {
        Self {
            config: None,
            rx: VecDeque::new(),
            tx: VecDeque::new(),
            hold_tx: false,
            errors: ErrorInfo::default(),
            registers: [0; REGISTER_FILE_LEN],
        }
    }

    fn reset(&mut self) {
        self.config = None;
        self.rx.clear();
        self.tx.clear();
        self.hold_tx = false;
    }
}

struct SimAdapter {
    info: DeviceInfo,
    channels: Vec<SimChannel>,
    handle: Option<DriverHandle>,
}

struct SimState {
    loopback: bool,
    load_failure: bool,
    reset_errors_on_read: bool,
    rx_capacity: usize,
    tx_capacity: usize,
    next_handle: u32,
    adapters: BTreeMap<AdapterKey, SimAdapter>,
    open: BTreeMap<DriverHandle, AdapterKey>,
}

impl SimState {
    fn adapter_mut(&mut self, handle: DriverHandle) -> Result<&mut SimAdapter, CanError> {
        let key = *self.open.get(&handle).ok_or(CanError::DeviceNotOpen)?;
        self.adapters.get_mut(&key).ok_or(CanError::DeviceNotOpen)
    }

    fn channel_mut(
        &mut self,
        handle: DriverHandle,
        channel: u8,
    ) -> Result<&mut SimChannel, CanError> {
        self.adapter_mut(handle)?
            .channels
            .get_mut(channel as usize)
            .ok_or(CanError::CommandFailed)
    }

    fn started_channel_mut(
        &mut self,
        handle: DriverHandle,
        channel: u8,
    ) -> Result<&mut SimChannel, CanError> {
        let sim = self.channel_mut(handle, channel)?;
        if sim.config.is_none() {
            return Err(CanError::DeviceNotOpen);
        }
        Ok(sim)
    }

    /// Push everything waiting in a transmit queue onto the wire.
    fn flush(&mut self, source: AdapterKey, channel: u8, now: u32) {
        let pending: Vec<CanFrame> = self
            .adapters
            .get_mut(&source)
            .and_then(|adapter| adapter.channels.get_mut(channel as usize))
            .map(|sim| sim.tx.drain(..).collect())
            .unwrap_or_default();
        for frame in pending {
            self.deliver(Some((source, channel)), &frame, now);
        }
    }

    /// Hand a frame to every started channel that accepts it.
    fn deliver(&mut self, source: Option<(AdapterKey, u8)>, frame: &CanFrame, now: u32) {
        let echo = self.loopback || frame.send_type() == SendType::SelfReceive;
        let rx_capacity = self.rx_capacity;

        for (key, adapter) in self.adapters.iter_mut() {
            for (index, sim) in adapter.channels.iter_mut().enumerate() {
                let Some(config) = sim.config else {
                    continue;
                };
                if source == Some((*key, index as u8)) && !echo {
                    continue;
                }
                if !config.filter.accepts(frame) {
                    continue;
                }
                if sim.rx.len() >= rx_capacity {
                    sim.errors.code |= ErrorCode::OVERFLOW;
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Simulated RX FIFO overflow on channel {}", index);
                    continue;
                }
                sim.rx.push_back(frame.with_timestamp(now));
            }
        }
    }
}

/// Simulated adapter library.
pub struct SimDriver {
    state: Mutex<CriticalSectionRawMutex, RefCell<SimState>>,
    epoch: Instant,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    /// Empty library: no adapter attached, no self-reception of normal frames.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(SimState {
                loopback: false,
                load_failure: false,
                reset_errors_on_read: true,
                rx_capacity: DEFAULT_RX_CAPACITY,
                tx_capacity: DEFAULT_TX_CAPACITY,
                next_handle: 1,
                adapters: BTreeMap::new(),
                open: BTreeMap::new(),
            })),
            epoch: Instant::now(),
        }
    }

    /// Library in which every transmitted frame is also received by its sender.
    pub fn loopback() -> Self {
        let driver = Self::new();
        driver.with_state(|state| state.loopback = true);
        driver
    }

    /// Library whose kernel module cannot be loaded: every open fails.
    pub fn failing_load() -> Self {
        let driver = Self::new();
        driver.with_state(|state| state.load_failure = true);
        driver
    }

    /// Attach one more adapter of `device_type` (builder form).
    pub fn with_adapter(self, device_type: DeviceType) -> Self {
        self.attach(device_type);
        self
    }

    pub fn with_rx_capacity(self, capacity: usize) -> Self {
        self.with_state(|state| state.rx_capacity = capacity);
        self
    }

    pub fn with_tx_capacity(self, capacity: usize) -> Self {
        self.with_state(|state| state.tx_capacity = capacity);
        self
    }

    /// Whether reading diagnostics clears the controller error state.
    pub fn reset_errors_on_read(self, reset: bool) -> Self {
        self.with_state(|state| state.reset_errors_on_read = reset);
        self
    }

    /// Plug in an adapter and return its index among adapters of that model.
    pub fn attach(&self, device_type: DeviceType) -> u32 {
        self.with_state(|state| {
            let index = state
                .adapters
                .keys()
                .filter(|(t, _)| *t == device_type)
                .count() as u32;
            let serial = format!("SIM{:02}{:04}", device_type.code(), index);
            let info = DeviceInfo::builder(device_type.channel_count())
                .versions(0x0100, 0x0100, 0x0100, 0x0100)
                .serial_number(serial.as_bytes())
                .hardware_type(device_type.name().as_bytes())
                .build();
            let channels = (0..device_type.channel_count())
                .map(|_| SimChannel::new())
                .collect();
            state.adapters.insert(
                (device_type, index),
                SimAdapter {
                    info,
                    channels,
                    handle: None,
                },
            );
            index
        })
    }

    /// Frame coming from another node on the wire, as seen by one channel.
    ///
    /// Returns whether the frame landed in the receive FIFO.
    pub fn inject_frame(
        &self,
        device_type: DeviceType,
        index: u32,
        channel: u8,
        frame: &CanFrame,
    ) -> bool {
        let now = self.now();
        self.with_state(|state| {
            let rx_capacity = state.rx_capacity;
            let Some(sim) = state
                .adapters
                .get_mut(&(device_type, index))
                .and_then(|a| a.channels.get_mut(channel as usize))
            else {
                return false;
            };
            let Some(config) = sim.config else {
                return false;
            };
            if !config.filter.accepts(frame) {
                return false;
            }
            if sim.rx.len() >= rx_capacity {
                sim.errors.code |= ErrorCode::OVERFLOW;
                return false;
            }
            sim.rx.push_back(frame.with_timestamp(now));
            true
        })
    }

    /// Raise controller error conditions on a channel.
    pub fn inject_error(&self, device_type: DeviceType, index: u32, channel: u8, error: ErrorInfo) {
        self.with_state(|state| {
            if let Some(sim) = state
                .adapters
                .get_mut(&(device_type, index))
                .and_then(|a| a.channels.get_mut(channel as usize))
            {
                sim.errors.merge(&error);
            }
        })
    }

    /// Keep transmitted frames queued (`true`) or release them onto the wire.
    pub fn hold_transmit(&self, device_type: DeviceType, index: u32, channel: u8, hold: bool) {
        let now = self.now();
        self.with_state(|state| {
            let key = (device_type, index);
            if let Some(sim) = state
                .adapters
                .get_mut(&key)
                .and_then(|a| a.channels.get_mut(channel as usize))
            {
                sim.hold_tx = hold;
                if !hold {
                    state.flush(key, channel, now);
                }
            }
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Capture time in 0.1 ms units.
    fn now(&self) -> u32 {
        (self.epoch.elapsed().as_micros() / 100) as u32
    }
}

impl Driver for SimDriver {
    fn open(
        &self,
        device_type: DeviceType,
        index: u32,
        description: &str,
    ) -> Result<DriverHandle, CanError> {
        self.with_state(|state| {
            if state.load_failure {
                return Err(CanError::DriverLoadFailed);
            }
            let handle = DriverHandle(state.next_handle);
            let adapter = state
                .adapters
                .get_mut(&(device_type, index))
                .ok_or(CanError::DeviceNotExist)?;
            if adapter.handle.is_some() {
                return Err(CanError::DeviceAlreadyOpen);
            }
            let info = adapter.info;
            adapter.info = DeviceInfo::builder(info.channel_count())
                .versions(
                    info.hardware_version(),
                    info.firmware_version(),
                    info.driver_version(),
                    info.interface_version(),
                )
                .interrupt_number(info.interrupt_number())
                .serial_number(info.serial_number().as_slice())
                .hardware_type(info.hardware_type().as_slice())
                .description(description.as_bytes())
                .build();
            adapter.handle = Some(handle);
            state.next_handle += 1;
            state.open.insert(handle, (device_type, index));
            Ok(handle)
        })
    }

    fn close(&self, handle: DriverHandle) -> Result<(), CanError> {
        self.with_state(|state| {
            let key = state.open.remove(&handle).ok_or(CanError::DeviceNotOpen)?;
            if let Some(adapter) = state.adapters.get_mut(&key) {
                adapter.handle = None;
                adapter.channels.iter_mut().for_each(SimChannel::reset);
            }
            Ok(())
        })
    }

    fn device_info(&self, handle: DriverHandle) -> Result<DeviceInfo, CanError> {
        self.with_state(|state| Ok(state.adapter_mut(handle)?.info))
    }

    fn start_channel(
        &self,
        handle: DriverHandle,
        channel: u8,
        config: &ChannelConfig,
    ) -> Result<(), CanError> {
        self.with_state(|state| {
            let sim = state.channel_mut(handle, channel)?;
            if sim.config.is_some() || !config.timing.segments().is_valid() {
                return Err(CanError::CommandFailed);
            }
            sim.reset();
            sim.errors = ErrorInfo::default();
            sim.config = Some(*config);
            Ok(())
        })
    }

    fn stop_channel(&self, handle: DriverHandle, channel: u8) -> Result<(), CanError> {
        self.with_state(|state| {
            state.started_channel_mut(handle, channel)?.reset();
            Ok(())
        })
    }

    fn transmit(
        &self,
        handle: DriverHandle,
        channel: u8,
        frames: &[CanFrame],
    ) -> Result<usize, CanError> {
        let now = self.now();
        self.with_state(|state| {
            let key = *state.open.get(&handle).ok_or(CanError::DeviceNotOpen)?;
            let tx_capacity = state.tx_capacity;
            let sim = state.started_channel_mut(handle, channel)?;
            if sim.config.map(|c| c.mode) == Some(WorkMode::ListenOnly) {
                return Err(CanError::CommandFailed);
            }

            let room = tx_capacity.saturating_sub(sim.tx.len());
            let accepted = frames.len().min(room);
            sim.tx.extend(frames[..accepted].iter().copied());

            if !sim.hold_tx {
                state.flush(key, channel, now);
            }
            Ok(accepted)
        })
    }

    fn receive(
        &self,
        handle: DriverHandle,
        channel: u8,
        out: &mut Vec<CanFrame>,
        max_frames: usize,
    ) -> Result<usize, CanError> {
        self.with_state(|state| {
            let sim = state.started_channel_mut(handle, channel)?;
            let count = max_frames.min(sim.rx.len());
            out.extend(sim.rx.drain(..count));
            Ok(count)
        })
    }

    fn pending_count(&self, handle: DriverHandle, channel: u8) -> Result<usize, CanError> {
        self.with_state(|state| Ok(state.started_channel_mut(handle, channel)?.rx.len()))
    }

    fn clear_receive_buffer(&self, handle: DriverHandle, channel: u8) -> Result<(), CanError> {
        self.with_state(|state| {
            state.started_channel_mut(handle, channel)?.rx.clear();
            Ok(())
        })
    }

    fn error_info(&self, handle: DriverHandle, channel: u8) -> Result<ErrorInfo, CanError> {
        self.with_state(|state| {
            let reset = state.reset_errors_on_read;
            let sim = state.channel_mut(handle, channel)?;
            let snapshot = sim.errors;
            if reset {
                sim.errors = ErrorInfo::default();
            }
            Ok(snapshot)
        })
    }

    fn read_register(
        &self,
        handle: DriverHandle,
        channel: u8,
        address: u32,
        buf: &mut [u8],
    ) -> Result<(), CanError> {
        self.with_state(|state| {
            let sim = state.channel_mut(handle, channel)?;
            let range = register_range(address, buf.len())?;
            buf.copy_from_slice(&sim.registers[range]);
            Ok(())
        })
    }

    fn write_register(
        &self,
        handle: DriverHandle,
        channel: u8,
        address: u32,
        data: &[u8],
    ) -> Result<(), CanError> {
        self.with_state(|state| {
            let sim = state.channel_mut(handle, channel)?;
            let range = register_range(address, data.len())?;
            sim.registers[range].copy_from_slice(data);
            Ok(())
        })
    }
}

fn register_range(address: u32, len: usize) -> Result<core::ops::Range<usize>, CanError> {
    let start = address as usize;
    let end = start.checked_add(len).ok_or(CanError::CommandFailed)?;
    if end > REGISTER_FILE_LEN {
        return Err(CanError::CommandFailed);
    }
    Ok(start..end)
}
