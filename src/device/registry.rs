//! Entry point handing out exclusive [`Device`] handles.
use core::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::device::info::DeviceType;
use crate::device::Device;
use crate::driver::Driver;
use crate::error::CanError;
use crate::transport::traits::bus_timer::BusTimer;

/// Adapters currently held through this registry, keyed by native model code
/// so that models sharing a code share exclusivity.
pub(crate) struct RegistryState {
    open: Mutex<CriticalSectionRawMutex, RefCell<BTreeSet<(u32, u32)>>>,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            open: Mutex::new(RefCell::new(BTreeSet::new())),
        }
    }

    /// Returns `false` when the adapter is already held.
    fn acquire(&self, device_type: DeviceType, index: u32) -> bool {
        self.open
            .lock(|open| open.borrow_mut().insert((device_type.code(), index)))
    }

    pub(crate) fn release(&self, device_type: DeviceType, index: u32) {
        self.open
            .lock(|open| open.borrow_mut().remove(&(device_type.code(), index)));
    }

    fn is_held(&self, device_type: DeviceType, index: u32) -> bool {
        self.open
            .lock(|open| open.borrow().contains(&(device_type.code(), index)))
    }
}

/// Opens adapters through a [`Driver`] and gives every device the timer its
/// channels wait with.
pub struct DeviceRegistry<D: Driver, T: BusTimer + Clone> {
    driver: Arc<D>,
    timer: T,
    state: Arc<RegistryState>,
}

impl<D: Driver, T: BusTimer + Clone> DeviceRegistry<D, T> {
    pub fn new(driver: D, timer: T) -> Self {
        Self::with_shared_driver(Arc::new(driver), timer)
    }

    /// Registry over a driver that the caller keeps a handle to (for example
    /// to inject traffic into a simulated bus).
    pub fn with_shared_driver(driver: Arc<D>, timer: T) -> Self {
        Self {
            driver,
            timer,
            state: Arc::new(RegistryState::new()),
        }
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    /// Whether adapter `index` of `device_type` is held through this registry.
    pub fn is_open(&self, device_type: DeviceType, index: u32) -> bool {
        self.state.is_held(device_type, index)
    }

    /// Acquire exclusive ownership of adapter `index` of model `device_type`.
    pub fn open(
        &self,
        device_type: DeviceType,
        index: u32,
        description: &str,
    ) -> Result<Device<D, T>, CanError> {
        if !self.state.acquire(device_type, index) {
            return Err(CanError::DeviceAlreadyOpen);
        }

        let opened = self
            .driver
            .open(device_type, index, description)
            .and_then(|handle| match self.driver.device_info(handle) {
                Ok(info) => Ok((handle, info)),
                Err(e) => {
                    let _ = self.driver.close(handle);
                    Err(e)
                }
            });
        let (handle, info) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                self.state.release(device_type, index);
                #[cfg(feature = "defmt")]
                defmt::warn!("Opening {} #{} failed", device_type, index);
                return Err(e);
            }
        };

        #[cfg(feature = "defmt")]
        defmt::info!(
            "Opened {} #{} with {} channel(s)",
            device_type,
            index,
            info.channel_count()
        );
        Ok(Device::new(
            Arc::clone(&self.driver),
            self.timer.clone(),
            Arc::clone(&self.state),
            device_type,
            index,
            handle,
            info,
        ))
    }

    /// Release `device`. Fails with [`CanError::DeviceNotOpen`] when it was
    /// already closed.
    pub fn close(&self, device: &Device<D, T>) -> Result<(), CanError> {
        device.close()
    }
}
