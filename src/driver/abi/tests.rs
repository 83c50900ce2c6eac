//! Layout and conversion tests for the native structures.
use super::*;
use crate::device::config::{Bitrate, Filter};
use core::mem::{offset_of, size_of};

#[test]
/// Sizes follow the native sequential layout, tail padding included.
fn test_struct_sizes() {
    assert_eq!(size_of::<RawDataFrame>(), 20);
    assert_eq!(size_of::<RawDeviceInformation>(), 92);
    assert_eq!(size_of::<RawErrorInformation>(), 8);
    assert_eq!(size_of::<RawInitConfig>(), 20);
}

#[test]
fn test_field_offsets() {
    assert_eq!(offset_of!(RawDataFrame, data_len), 7);
    assert_eq!(offset_of!(RawDataFrame, id), 8);
    assert_eq!(offset_of!(RawDataFrame, data), 12);

    assert_eq!(offset_of!(RawDeviceInformation, channel_number), 10);
    assert_eq!(offset_of!(RawDeviceInformation, serial_number), 11);
    assert_eq!(offset_of!(RawDeviceInformation, hardware_type), 31);
    assert_eq!(offset_of!(RawDeviceInformation, description), 71);

    assert_eq!(offset_of!(RawErrorInformation, ar_lost_err_data), 7);

    assert_eq!(offset_of!(RawInitConfig, btr), 2);
    assert_eq!(offset_of!(RawInitConfig, acc_code), 8);
    assert_eq!(offset_of!(RawInitConfig, acc_mask), 12);
    assert_eq!(offset_of!(RawInitConfig, filter), 16);
}

#[test]
fn test_frame_to_raw() {
    let frame = CanFrame::from_raw_id(0x123, false, &[1, 2, 3])
        .unwrap()
        .with_send_type(SendType::SingleShot);
    let raw = RawDataFrame::from(&frame);

    assert_eq!(raw.id, 0x123);
    assert_eq!(raw.extern_flag, 0);
    assert_eq!(raw.remote_flag, 0);
    assert_eq!(raw.send_type, 1);
    assert_eq!(raw.data_len, 3);
    assert_eq!(raw.data, [1, 2, 3, 0, 0, 0, 0, 0]);
}

#[test]
fn test_raw_to_frame() {
    let raw = RawDataFrame {
        time_flag: 4242,
        send_type: 0,
        remote_flag: 0,
        extern_flag: 1,
        data_len: 2,
        id: 0x18FF_0001,
        data: [9, 8, 7, 6, 5, 4, 3, 2],
    };
    let frame = CanFrame::try_from(raw).unwrap();

    assert!(frame.is_extended());
    assert_eq!(frame.raw_id(), 0x18FF_0001);
    assert_eq!(frame.data(), &[9, 8]);
    assert_eq!(frame.timestamp(), 4242);
}

#[test]
/// Raw frames announcing more than eight bytes are rejected.
fn test_raw_frame_rejects_long_dlc() {
    let raw = RawDataFrame {
        data_len: 9,
        ..RawDataFrame::default()
    };
    assert_eq!(
        CanFrame::try_from(raw),
        Err(FrameError::DataTooLong { len: 9 })
    );

    let bad_id = RawDataFrame {
        id: 0x800,
        ..RawDataFrame::default()
    };
    assert!(matches!(
        CanFrame::try_from(bad_id),
        Err(FrameError::IdOutOfRange { .. })
    ));
}

#[test]
fn test_remote_frame_keeps_dlc() {
    let raw = RawDataFrame {
        remote_flag: 1,
        data_len: 8,
        id: 0x7FF,
        ..RawDataFrame::default()
    };
    let frame = CanFrame::try_from(raw).unwrap();
    assert!(frame.is_remote());
    assert_eq!(frame.dlc(), 8);
    assert_eq!(RawDataFrame::from(&frame).data_len, 8);
}

#[test]
fn test_device_information_strings() {
    let mut raw = RawDeviceInformation {
        hardware_version: 0x0201,
        channel_number: 2,
        ..RawDeviceInformation::default()
    };
    raw.serial_number[..4].copy_from_slice(b"A001");
    raw.hardware_type[..12].copy_from_slice(b"USBCAN-E-2CH");

    let info = DeviceInfo::from(&raw);
    assert_eq!(info.channel_count(), 2);
    assert_eq!(info.hardware_version(), 0x0201);
    assert_eq!(info.serial_number().as_str(), Some("A001"));
    assert_eq!(info.hardware_type().as_str(), Some("USBCAN-E-2CH"));
    assert_eq!(RawDeviceInformation::from(&info), raw);
}

#[test]
fn test_error_information_keeps_unknown_bits() {
    let raw = RawErrorInformation {
        error_code: 0x0004 | 0x0020,
        passive_err_data: [1, 2, 3],
        ar_lost_err_data: 4,
    };
    let info = ErrorInfo::from(raw);
    assert!(info.code.contains(ErrorCode::PASSIVE));
    assert_eq!(info.code.bits(), 0x0024);
    assert_eq!(RawErrorInformation::from(&info), raw);
}

#[test]
fn test_init_config_encoding() {
    let config = ChannelConfig::new(Bitrate::Kbps250)
        .listen_only()
        .with_filter(Filter::Single {
            code: 0x2460_0000,
            mask: 0x001F_FFFF,
        });
    let raw = RawInitConfig::from(&config);

    assert_eq!(raw.mode, 1);
    assert_eq!(raw.btr_type, 1);
    assert_eq!(raw.btr, [0x01, 0x1C, 0x00, 0x00]);
    assert_eq!(raw.filter, 2);
    assert_eq!(raw.acc_code, 0x2460_0000);
    assert_eq!(raw.acc_mask, 0x001F_FFFF);
    assert_eq!(ChannelConfig::try_from(&raw), Ok(config));

    let unfiltered = RawInitConfig::from(&ChannelConfig::default());
    assert_eq!((unfiltered.filter, unfiltered.acc_mask), (0, 0xFFFF_FFFF));
}
