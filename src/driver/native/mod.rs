//! Binding to the vendor `CanCmd` library (`CanCmd.dll` / `libCanCmd.so`).
//!
//! The library is loaded at runtime, so a missing library or entry point is
//! reported as [`CanError::DriverLoadFailed`] instead of failing at link time.
//!
//! Every native call returns `1` on success and `0` on failure, except the
//! counting calls (send, receive, pending) which return a count. On failure
//! the cause is read back through `CAN_GetErrorInfo` and translated with
//! [`CanError::from_code`]. That read resets the controller error state, so
//! the bus-level bits it carries are stashed and handed out by the next
//! [`Driver::error_info`] call on the same channel.
//!
//! `CAN_DeviceOpen` is the exception: it returns a zero handle and nothing
//! to query the cause through, so every open failure is
//! [`CanError::DeviceOpenFailed`]. A second open of a held adapter is caught
//! by the registry before it reaches the library.
use core::cell::RefCell;
use std::collections::BTreeMap;
use std::ffi::{c_char, CString, OsStr};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use libloading::Library;

use crate::device::config::ChannelConfig;
use crate::device::info::{DeviceInfo, DeviceType, ErrorInfo};
use crate::driver::abi::{
    RawDataFrame, RawDeviceInformation, RawErrorInformation, RawInitConfig, CAN_RESULT_OK,
};
use crate::driver::{Driver, DriverHandle};
use crate::error::{CanError, ErrorCode};
use crate::transport::can_frame::CanFrame;


/// Most frames moved out of the library by one receive call.
pub const RECEIVE_BATCH: usize = 256;

type DeviceOpenFn = unsafe extern "system" fn(u32, u32, *const c_char) -> u32;
type DeviceCloseFn = unsafe extern "system" fn(u32) -> u32;
type ChannelStartFn = unsafe extern "system" fn(u32, u32, *const RawInitConfig) -> u32;
type ChannelFn = unsafe extern "system" fn(u32, u32) -> u32;
type DeviceInfoFn = unsafe extern "system" fn(u32, *mut RawDeviceInformation) -> u32;
type ReadRegisterFn = unsafe extern "system" fn(u32, u32, u32, *mut u8, u16) -> u32;
type WriteRegisterFn = unsafe extern "system" fn(u32, u32, u32, *const u8, u16) -> u32;
type ChannelSendFn = unsafe extern "system" fn(u32, u32, *const RawDataFrame, u32) -> u32;
type ChannelReceiveFn = unsafe extern "system" fn(u32, u32, *mut RawDataFrame, u32, i32) -> u32;
type ErrorInfoFn = unsafe extern "system" fn(u32, u32, *mut RawErrorInformation) -> u32;

/// Entry points resolved from the loaded library.
struct Api {
    device_open: DeviceOpenFn,
    device_close: DeviceCloseFn,
    channel_start: ChannelStartFn,
    channel_stop: ChannelFn,
    device_info: DeviceInfoFn,
    read_register: ReadRegisterFn,
    write_register: WriteRegisterFn,
    channel_send: ChannelSendFn,
    receive_count: ChannelFn,
    clear_receive_buffer: ChannelFn,
    channel_receive: ChannelReceiveFn,
    error_info: ErrorInfoFn,
}

/// Copy the entry point `name` (NUL terminated) out of `library`.
///
/// # Safety
/// `T` must match the native signature of `name`.
unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T, CanError> {
    match library.get::<T>(name) {
        Ok(symbol) => Ok(*symbol),
        Err(_e) => {
            #[cfg(feature = "defmt")]
            defmt::warn!("CanCmd entry point missing: {}", defmt::Debug2Format(&_e));
            Err(CanError::DriverLoadFailed)
        }
    }
}

impl Api {
    fn resolve(library: &Library) -> Result<Self, CanError> {
        // SAFETY: each type alias mirrors the exported `CanCmd` prototype.
        unsafe {
            Ok(Self {
                device_open: symbol(library, b"CAN_DeviceOpen\0")?,
                device_close: symbol(library, b"CAN_DeviceClose\0")?,
                channel_start: symbol(library, b"CAN_ChannelStart\0")?,
                channel_stop: symbol(library, b"CAN_ChannelStop\0")?,
                device_info: symbol(library, b"CAN_GetDeviceInfo\0")?,
                read_register: symbol(library, b"CAN_ReadRegister\0")?,
                write_register: symbol(library, b"CAN_WriteRegister\0")?,
                channel_send: symbol(library, b"CAN_ChannelSend\0")?,
                receive_count: symbol(library, b"CAN_GetReceiveCount\0")?,
                clear_receive_buffer: symbol(library, b"CAN_ClearReceiveBuffer\0")?,
                channel_receive: symbol(library, b"CAN_ChannelReceive\0")?,
                error_info: symbol(library, b"CAN_GetErrorInfo\0")?,
            })
        }
    }
}

type ErrorStash = BTreeMap<(DriverHandle, u8), ErrorInfo>;

/// Adapter library backed by the vendor shared object.
pub struct NativeDriver {
    api: Api,
    stashed: Mutex<CriticalSectionRawMutex, RefCell<ErrorStash>>,
    // Keeps the entry points in `api` mapped; dropped last.
    _library: Library,
}

impl NativeDriver {
    /// Load `CanCmd` from the platform library search path.
    pub fn new() -> Result<Self, CanError> {
        Self::from_path(libloading::library_filename("CanCmd"))
    }

    /// Load the library at `path`.
    pub fn from_path<P: AsRef<OsStr>>(path: P) -> Result<Self, CanError> {
        // SAFETY: loading runs the library initialisers; `CanCmd` has none
        // with preconditions on the caller.
        let library = unsafe { Library::new(path.as_ref()) }.map_err(|_e| {
            #[cfg(feature = "defmt")]
            defmt::warn!("Loading CanCmd failed: {}", defmt::Debug2Format(&_e));
            CanError::DriverLoadFailed
        })?;
        let api = Api::resolve(&library)?;
        #[cfg(feature = "defmt")]
        defmt::info!("CanCmd loaded");
        Ok(Self {
            api,
            stashed: Mutex::new(RefCell::new(BTreeMap::new())),
            _library: library,
        })
    }

    fn read_error_info(&self, handle: DriverHandle, channel: u8) -> Option<ErrorInfo> {
        let mut raw = RawErrorInformation::default();
        // SAFETY: `raw` is a valid, writable `CAN_ErrorInformation`.
        let result = unsafe { (self.api.error_info)(handle.0, channel as u32, &mut raw) };
        (result == CAN_RESULT_OK).then(|| ErrorInfo::from(raw))
    }

    /// Cause of the last failed call on `channel`.
    fn failure(&self, handle: DriverHandle, channel: u8) -> CanError {
        let Some(info) = self.read_error_info(handle, channel) else {
            return CanError::CommandFailed;
        };
        if !info.code.bus_level().is_empty() {
            self.stashed.lock(|stash| {
                stash
                    .borrow_mut()
                    .entry((handle, channel))
                    .or_default()
                    .merge(&info)
            });
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("CanCmd call failed, error word {=u32:#x}", info.code.bits());
        CanError::from_code(info.code - ErrorCode::BUS_LEVEL)
    }

    fn check(&self, result: u32, handle: DriverHandle, channel: u8) -> Result<(), CanError> {
        if result == CAN_RESULT_OK {
            Ok(())
        } else {
            Err(self.failure(handle, channel))
        }
    }
}

/// Frames to request from the library: what the caller has room for, bounded
/// by what is queued and by [`RECEIVE_BATCH`].
pub(crate) fn receive_batch(max_frames: usize, pending: usize) -> usize {
    max_frames.min(pending).min(RECEIVE_BATCH)
}

fn register_len(len: usize) -> Result<u16, CanError> {
    u16::try_from(len).map_err(|_| CanError::CommandFailed)
}

impl Driver for NativeDriver {
    fn open(
        &self,
        device_type: DeviceType,
        index: u32,
        description: &str,
    ) -> Result<DriverHandle, CanError> {
        let description = CString::new(description).map_err(|_| CanError::DeviceOpenFailed)?;
        // SAFETY: `description` outlives the call and is NUL terminated.
        let handle = unsafe { (self.api.device_open)(device_type.code(), index, description.as_ptr()) };
        if handle == 0 {
            return Err(CanError::DeviceOpenFailed);
        }
        #[cfg(feature = "defmt")]
        defmt::info!("Opened {} #{} as handle {}", device_type, index, handle);
        Ok(DriverHandle(handle))
    }

    fn close(&self, handle: DriverHandle) -> Result<(), CanError> {
        // SAFETY: plain value arguments.
        let result = unsafe { (self.api.device_close)(handle.0) };
        self.stashed
            .lock(|stash| stash.borrow_mut().retain(|(h, _), _| *h != handle));
        if result == CAN_RESULT_OK {
            Ok(())
        } else {
            Err(CanError::DeviceNotOpen)
        }
    }

    fn device_info(&self, handle: DriverHandle) -> Result<DeviceInfo, CanError> {
        let mut raw = RawDeviceInformation::default();
        // SAFETY: `raw` is a valid, writable `CAN_DeviceInformation`.
        let result = unsafe { (self.api.device_info)(handle.0, &mut raw) };
        self.check(result, handle, 0)?;
        Ok(DeviceInfo::from(&raw))
    }

    fn start_channel(
        &self,
        handle: DriverHandle,
        channel: u8,
        config: &ChannelConfig,
    ) -> Result<(), CanError> {
        let raw = RawInitConfig::from(config);
        // SAFETY: `raw` lives on the stack for the duration of the call.
        let result = unsafe { (self.api.channel_start)(handle.0, channel as u32, &raw) };
        self.check(result, handle, channel)
    }

    fn stop_channel(&self, handle: DriverHandle, channel: u8) -> Result<(), CanError> {
        // SAFETY: plain value arguments.
        let result = unsafe { (self.api.channel_stop)(handle.0, channel as u32) };
        self.check(result, handle, channel)
    }

    fn transmit(
        &self,
        handle: DriverHandle,
        channel: u8,
        frames: &[CanFrame],
    ) -> Result<usize, CanError> {
        let raw: Vec<RawDataFrame> = frames.iter().map(RawDataFrame::from).collect();
        let len = u32::try_from(raw.len()).map_err(|_| CanError::BufferFull)?;
        // SAFETY: `raw` holds exactly `len` initialised frames.
        let sent = unsafe { (self.api.channel_send)(handle.0, channel as u32, raw.as_ptr(), len) };
        Ok(sent as usize)
    }

    fn receive(
        &self,
        handle: DriverHandle,
        channel: u8,
        out: &mut Vec<CanFrame>,
        max_frames: usize,
    ) -> Result<usize, CanError> {
        let pending = self.pending_count(handle, channel)?;
        let batch = receive_batch(max_frames, pending);
        if batch == 0 {
            return Ok(0);
        }
        let mut raw = vec![RawDataFrame::default(); batch];
        let len = u32::try_from(batch).map_err(|_| CanError::CommandFailed)?;
        // SAFETY: the library writes at most `len` frames into `raw`.
        let count = unsafe {
            (self.api.channel_receive)(handle.0, channel as u32, raw.as_mut_ptr(), len, 0)
        } as usize;

        let before = out.len();
        for frame in raw.into_iter().take(count.min(batch)) {
            match CanFrame::try_from(frame) {
                Ok(frame) => out.push(frame),
                Err(_) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Dropping malformed frame from driver");
                }
            }
        }
        Ok(out.len() - before)
    }

    fn pending_count(&self, handle: DriverHandle, channel: u8) -> Result<usize, CanError> {
        // SAFETY: plain value arguments.
        Ok(unsafe { (self.api.receive_count)(handle.0, channel as u32) } as usize)
    }

    fn clear_receive_buffer(&self, handle: DriverHandle, channel: u8) -> Result<(), CanError> {
        // SAFETY: plain value arguments.
        let result = unsafe { (self.api.clear_receive_buffer)(handle.0, channel as u32) };
        self.check(result, handle, channel)
    }

    fn error_info(&self, handle: DriverHandle, channel: u8) -> Result<ErrorInfo, CanError> {
        let mut info = self
            .stashed
            .lock(|stash| stash.borrow_mut().remove(&(handle, channel)))
            .unwrap_or_default();
        let current = self
            .read_error_info(handle, channel)
            .ok_or(CanError::DeviceNotOpen)?;
        info.merge(&current);
        Ok(info)
    }

    fn read_register(
        &self,
        handle: DriverHandle,
        channel: u8,
        address: u32,
        buf: &mut [u8],
    ) -> Result<(), CanError> {
        let len = register_len(buf.len())?;
        // SAFETY: `buf` is writable for `len` bytes.
        let result =
            unsafe {
            (self.api.read_register)(handle.0, channel as u32, address, buf.as_mut_ptr(), len)
        };
        self.check(result, handle, channel)
    }

    fn write_register(
        &self,
        handle: DriverHandle,
        channel: u8,
        address: u32,
        data: &[u8],
    ) -> Result<(), CanError> {
        let len = register_len(data.len())?;
        // SAFETY: `data` is readable for `len` bytes.
        let result =
            unsafe {
            (self.api.write_register)(handle.0, channel as u32, address, data.as_ptr(), len)
        };
        self.check(result, handle, channel)
    }
}
