//! Registry and device lifecycle: exclusive open, close, channel state machine.
mod helpers {
    include!("helpers/mod.rs");
}

use cancmd::{BitTiming, CanError, ChannelConfig, DeviceType, SimDriver};
use helpers::{default_config, registry, started_channel};

#[test]
fn test_open_reports_missing_and_duplicate_adapters() {
    let (registry, _driver) = registry(SimDriver::new().with_adapter(DeviceType::UsbCanE2Ch));

    assert_eq!(
        registry.open(DeviceType::UsbCan1Ch, 0, "none").unwrap_err(),
        CanError::DeviceNotExist
    );
    assert_eq!(
        registry.open(DeviceType::UsbCanE2Ch, 1, "none").unwrap_err(),
        CanError::DeviceNotExist
    );

    let device = registry.open(DeviceType::UsbCanE2Ch, 0, "first").unwrap();
    assert!(registry.is_open(DeviceType::UsbCanE2Ch, 0));
    assert_eq!(
        registry.open(DeviceType::UsbCanE2Ch, 0, "second").unwrap_err(),
        CanError::DeviceAlreadyOpen
    );

    registry.close(&device).unwrap();
    assert!(!registry.is_open(DeviceType::UsbCanE2Ch, 0));
    let reopened = registry.open(DeviceType::UsbCanE2Ch, 0, "again");
    assert!(reopened.is_ok());
}

#[test]
fn test_driver_load_failure_is_fatal() {
    let (registry, _driver) = registry(SimDriver::failing_load());
    let err = registry.open(DeviceType::UsbCan1Ch, 0, "x").unwrap_err();
    assert_eq!(err, CanError::DriverLoadFailed);
    assert!(err.is_fatal());
    assert!(!registry.is_open(DeviceType::UsbCan1Ch, 0));
}

#[test]
fn test_second_close_signals_an_error() {
    let (registry, _driver) = registry(SimDriver::new().with_adapter(DeviceType::UsbCan1Ch));
    let device = registry.open(DeviceType::UsbCan1Ch, 0, "x").unwrap();

    assert!(registry.close(&device).is_ok());
    assert_eq!(registry.close(&device), Err(CanError::DeviceNotOpen));
    assert_eq!(device.close(), Err(CanError::DeviceNotOpen));
    assert_eq!(device.info().unwrap_err(), CanError::DeviceNotOpen);
}

#[test]
fn test_dropping_a_device_releases_the_adapter() {
    let (registry, _driver) = registry(SimDriver::new().with_adapter(DeviceType::UsbCan1Ch));
    {
        let _device = registry.open(DeviceType::UsbCan1Ch, 0, "scoped").unwrap();
        assert!(registry.is_open(DeviceType::UsbCan1Ch, 0));
    }
    assert!(!registry.is_open(DeviceType::UsbCan1Ch, 0));
    assert!(registry.open(DeviceType::UsbCan1Ch, 0, "again").is_ok());
}

#[test]
fn test_info_is_captured_at_open() {
    let (registry, _driver) = registry(SimDriver::new().with_adapter(DeviceType::UsbCanE2Ch));
    let device = registry.open(DeviceType::UsbCanE2Ch, 0, "bench-rig").unwrap();
    let info = device.info().unwrap();

    assert_eq!(info.channel_count(), 2);
    assert_eq!(info.description().as_str(), Some("bench-rig"));
    assert_eq!(info.hardware_type().as_str(), Some("USBCAN-E-2CH"));
    assert_eq!(device.device_type(), DeviceType::UsbCanE2Ch);
    assert_eq!(device.index(), 0);
}

#[test]
fn test_start_channel_validates_index_and_state() {
    let (registry, _driver) = registry(SimDriver::new().with_adapter(DeviceType::UsbCanE2Ch));
    let device = registry.open(DeviceType::UsbCanE2Ch, 0, "x").unwrap();

    assert_eq!(
        device.start_channel(2, default_config()).unwrap_err(),
        CanError::InvalidChannel {
            channel: 2,
            count: 2
        }
    );

    let channel = device.start_channel(1, default_config()).unwrap();
    assert_eq!(channel.index(), 1);
    assert_eq!(channel.config(), Some(default_config()));
    assert_eq!(
        device.start_channel(1, default_config()).unwrap_err(),
        CanError::ChannelAlreadyStarted(1)
    );

    device.stop_channel(1).unwrap();
    assert!(!channel.is_started());
    assert_eq!(device.stop_channel(1), Err(CanError::DeviceNotOpen));

    // Restart after stop is allowed.
    assert!(device.start_channel(1, default_config()).is_ok());
    assert!(device.channel(1).is_ok());
    assert_eq!(device.channel(0).unwrap_err(), CanError::DeviceNotOpen);
}

#[test]
/// A rejected configuration leaves the channel stopped and startable.
fn test_rejected_configuration_is_not_applied() {
    let (registry, _driver) = registry(SimDriver::new().with_adapter(DeviceType::UsbCan1Ch));
    let device = registry.open(DeviceType::UsbCan1Ch, 0, "x").unwrap();

    // SJW (4) larger than TSEG2 (1).
    let bad = ChannelConfig::new(BitTiming::Sja1000 {
        btr0: 0xC0,
        btr1: 0x00,
    });
    assert_eq!(
        device.start_channel(0, bad).unwrap_err(),
        CanError::CommandFailed
    );
    assert_eq!(device.channel(0).unwrap_err(), CanError::DeviceNotOpen);
    assert!(device.start_channel(0, default_config()).is_ok());
}

#[test]
fn test_operations_on_stopped_channel_fail() {
    let (_registry, _driver, device, channel) =
        started_channel(SimDriver::loopback(), default_config());
    device.stop_channel(0).unwrap();

    let frame = cancmd::CanFrame::from_raw_id(0x10, false, &[1]).unwrap();
    assert_eq!(channel.send(&frame), Err(CanError::DeviceNotOpen));
    assert_eq!(channel.pending_count(), Err(CanError::DeviceNotOpen));
    assert_eq!(channel.clear_receive_buffer(), Err(CanError::DeviceNotOpen));
}

#[test]
fn test_close_stops_every_channel() {
    let (_registry, _driver, device, channel) =
        started_channel(SimDriver::loopback(), default_config());
    device.close().unwrap();

    assert!(!channel.is_started());
    assert_eq!(channel.error_info(), Err(CanError::DeviceNotOpen));
    assert_eq!(
        device.start_channel(0, default_config()).unwrap_err(),
        CanError::DeviceNotOpen
    );
}

#[test]
/// Models sharing a native code name the same physical adapter.
fn test_shared_model_code_is_exclusive() {
    let (registry, _driver) = registry(
        SimDriver::new()
            .with_adapter(DeviceType::Lcusb131b)
            .with_adapter(DeviceType::LcMiniPcie431),
    );
    let device = registry.open(DeviceType::Lcusb131b, 0, "usb").unwrap();

    assert!(registry.is_open(DeviceType::LcMiniPcie431, 0));
    assert_eq!(
        registry.open(DeviceType::LcMiniPcie431, 0, "pcie").unwrap_err(),
        CanError::DeviceAlreadyOpen
    );

    registry.close(&device).unwrap();
    assert!(registry.open(DeviceType::LcMiniPcie431, 0, "pcie").is_ok());
}

#[test]
/// A channel the hardware refuses to stop does not keep the adapter held.
fn test_close_survives_failed_channel_stop() {
    use cancmd::Driver;

    let (registry, driver, device, channel) =
        started_channel(SimDriver::new(), default_config());
    // Stopped behind the device's back: the stop issued by close fails.
    driver.stop_channel(device.handle(), 0).unwrap();
    assert_eq!(
        driver.stop_channel(device.handle(), 0),
        Err(CanError::DeviceNotOpen)
    );

    assert!(device.close().is_ok());
    assert!(!channel.is_started());
    assert!(!registry.is_open(DeviceType::UsbCan1Ch, 0));
}
