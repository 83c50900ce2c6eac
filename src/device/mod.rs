//! Opened adapters and their channels.
//!
//! A [`Device`] is obtained from a [`DeviceRegistry`] and owns the adapter
//! until it is closed (explicitly or on drop). Channels are started from the
//! device and handed out as [`Channel`] handles; they stop working as soon as
//! the channel is stopped or the device closed.
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::driver::{Driver, DriverHandle};
use crate::error::CanError;
use crate::transport::traits::bus_timer::BusTimer;

pub mod channel;
pub mod config;
pub mod info;
pub mod registry;

use channel::{Channel, ChannelCore, ChannelState};
use config::ChannelConfig;
use info::{DeviceInfo, DeviceType};
use registry::RegistryState;

pub use registry::DeviceRegistry;

//==================================================================================DEVICE_INNER
/// State shared by a device and all of its channel handles.
pub(crate) struct DeviceInner<D: Driver, T: BusTimer> {
    pub(crate) driver: Arc<D>,
    pub(crate) timer: T,
    registry: Arc<RegistryState>,
    device_type: DeviceType,
    index: u32,
    pub(crate) handle: DriverHandle,
    info: DeviceInfo,
    open: AtomicBool,
    pub(crate) channels: Vec<ChannelCore>,
}

impl<D: Driver, T: BusTimer> DeviceInner<D, T> {
    pub(crate) fn ensure_open(&self) -> Result<(), CanError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CanError::DeviceNotOpen)
        }
    }

    fn close(&self) -> Result<(), CanError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Err(CanError::DeviceNotOpen);
        }
        for (index, core) in self.channels.iter().enumerate() {
            if !core.halt() {
                continue;
            }
            // The adapter is released right after, whatever the outcome.
            if let Err(_e) = self.driver.stop_channel(self.handle, index as u8) {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "Stopping channel {} on close failed: {}",
                    index,
                    defmt::Debug2Format(&_e)
                );
            }
        }
        let result = self.driver.close(self.handle);
        self.registry.release(self.device_type, self.index);

        #[cfg(feature = "defmt")]
        defmt::info!("Closed {} #{}", self.device_type, self.index);
        result
    }
}

//==================================================================================DEVICE
/// One opened adapter.
pub struct Device<D: Driver, T: BusTimer> {
    inner: Arc<DeviceInner<D, T>>,
}

impl<D: Driver, T: BusTimer> core::fmt::Debug for Device<D, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Device")
            .field("device_type", &self.inner.device_type)
            .field("index", &self.inner.index)
            .field("handle", &self.inner.handle)
            .field("open", &self.is_open())
            .finish()
    }
}

impl<D: Driver, T: BusTimer> Device<D, T> {
    pub(crate) fn new(
        driver: Arc<D>,
        timer: T,
        registry: Arc<RegistryState>,
        device_type: DeviceType,
        index: u32,
        handle: DriverHandle,
        info: DeviceInfo,
    ) -> Self {
        let channels = (0..info.channel_count())
            .map(|_| ChannelCore::new())
            .collect();
        Self {
            inner: Arc::new(DeviceInner {
                driver,
                timer,
                registry,
                device_type,
                index,
                handle,
                info,
                open: AtomicBool::new(true),
                channels,
            }),
        }
    }

    pub fn device_type(&self) -> DeviceType {
        self.inner.device_type
    }

    /// Index among the adapters of the same model.
    pub fn index(&self) -> u32 {
        self.inner.index
    }

    /// Driver handle of the adapter.
    pub fn handle(&self) -> DriverHandle {
        self.inner.handle
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Static information captured at open time.
    pub fn info(&self) -> Result<DeviceInfo, CanError> {
        self.inner.ensure_open()?;
        Ok(self.inner.info)
    }

    fn channel_core(&self, channel: u8) -> Result<&ChannelCore, CanError> {
        self.inner
            .channels
            .get(channel as usize)
            .ok_or(CanError::InvalidChannel {
                channel,
                count: self.inner.info.channel_count(),
            })
    }

    /// Apply `config` to `channel` and start it.
    ///
    /// The configuration is applied entirely or rejected; a started channel
    /// has to be stopped before it can be started again.
    pub fn start_channel(
        &self,
        channel: u8,
        config: ChannelConfig,
    ) -> Result<Channel<D, T>, CanError> {
        self.inner.ensure_open()?;
        let core = self.channel_core(channel)?;
        if !core.reserve() {
            return Err(CanError::ChannelAlreadyStarted(channel));
        }

        if let Err(e) = self
            .inner
            .driver
            .start_channel(self.inner.handle, channel, &config)
        {
            core.release();
            #[cfg(feature = "defmt")]
            defmt::warn!("Channel {} rejected its configuration", channel);
            return Err(e);
        }
        core.started(config);

        #[cfg(feature = "defmt")]
        defmt::info!(
            "Started channel {} of {} #{}",
            channel,
            self.inner.device_type,
            self.inner.index
        );
        Ok(Channel::new(Arc::clone(&self.inner), channel))
    }

    /// Handle to an already started channel.
    pub fn channel(&self, channel: u8) -> Result<Channel<D, T>, CanError> {
        self.inner.ensure_open()?;
        match self.channel_core(channel)?.state() {
            ChannelState::Started(_) => Ok(Channel::new(Arc::clone(&self.inner), channel)),
            _ => Err(CanError::DeviceNotOpen),
        }
    }

    /// Stop `channel`. A receive waiting on it returns [`CanError::Cancelled`].
    pub fn stop_channel(&self, channel: u8) -> Result<(), CanError> {
        self.inner.ensure_open()?;
        if !self.channel_core(channel)?.halt() {
            return Err(CanError::DeviceNotOpen);
        }

        #[cfg(feature = "defmt")]
        defmt::info!("Stopping channel {}", channel);
        self.inner.driver.stop_channel(self.inner.handle, channel)
    }

    /// Stop every started channel and release the adapter.
    ///
    /// Closing an already closed device fails with [`CanError::DeviceNotOpen`].
    pub fn close(&self) -> Result<(), CanError> {
        self.inner.close()
    }
}

impl<D: Driver, T: BusTimer> Drop for Device<D, T> {
    fn drop(&mut self) {
        if self.is_open() {
            let _ = self.inner.close();
        }
    }
}
