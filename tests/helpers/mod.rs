/// Test doubles and fixtures shared by the integration tests.
use cancmd::{
    Bitrate, BusTimer, Channel, ChannelConfig, Device, DeviceRegistry, DeviceType, SimDriver,
};
use embassy_time::Duration;
use std::sync::Arc;
use tokio::time::sleep;

#[derive(Clone, Copy, Debug, Default)]
#[allow(dead_code)]
/// Timer based on `tokio::time::sleep` to drive the receive waits.
pub struct MockTimer;

impl BusTimer for MockTimer {
    async fn delay(&self, duration: Duration) {
        sleep(std::time::Duration::from_micros(duration.as_micros())).await;
    }
}

#[allow(dead_code)]
pub type SimRegistry = DeviceRegistry<SimDriver, MockTimer>;
#[allow(dead_code)]
pub type SimDevice = Device<SimDriver, MockTimer>;
#[allow(dead_code)]
pub type SimChannel = Channel<SimDriver, MockTimer>;

#[allow(dead_code)]
/// Registry over `driver`, keeping a handle to the driver for injection.
pub fn registry(driver: SimDriver) -> (SimRegistry, Arc<SimDriver>) {
    let driver = Arc::new(driver);
    (
        DeviceRegistry::with_shared_driver(Arc::clone(&driver), MockTimer),
        driver,
    )
}

#[allow(dead_code)]
/// Open a single-channel adapter and start channel 0 with `config`.
pub fn started_channel(
    driver: SimDriver,
    config: ChannelConfig,
) -> (SimRegistry, Arc<SimDriver>, SimDevice, SimChannel) {
    let (registry, driver) = registry(driver.with_adapter(DeviceType::UsbCan1Ch));
    let device = registry
        .open(DeviceType::UsbCan1Ch, 0, "test")
        .expect("open simulated adapter");
    let channel = device
        .start_channel(0, config)
        .expect("start simulated channel");
    (registry, driver, device, channel)
}

#[allow(dead_code)]
pub fn default_config() -> ChannelConfig {
    ChannelConfig::new(Bitrate::Kbps500)
}
