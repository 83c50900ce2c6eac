//! Unit tests for frame construction and accessors.
use super::*;
use embedded_can::Frame;

#[test]
/// Payloads longer than eight bytes are rejected, never truncated.
fn test_data_too_long() {
    let id = StandardId::new(0x123).unwrap();
    let err = CanFrame::new(id, &[0u8; 9]).unwrap_err();
    assert_eq!(err, FrameError::DataTooLong { len: 9 });

    let err = CanFrame::new_remote(id, 12).unwrap_err();
    assert_eq!(err, FrameError::DataTooLong { len: 12 });
}

#[test]
/// Standard identifiers stop at 0x7FF, extended ones at 0x1FFF_FFFF.
fn test_identifier_ranges() {
    assert!(CanFrame::from_raw_id(0x7FF, false, &[]).is_ok());
    assert_eq!(
        CanFrame::from_raw_id(0x800, false, &[]).unwrap_err(),
        FrameError::IdOutOfRange {
            id: 0x800,
            extended: false
        }
    );
    assert!(CanFrame::from_raw_id(0x1FFF_FFFF, true, &[]).is_ok());
    assert!(CanFrame::from_raw_id(0x2000_0000, true, &[]).is_err());
    assert!(CanFrame::from_raw_id(0x1_0000, false, &[]).is_err());
}

#[test]
fn test_accessors() {
    let frame = CanFrame::from_raw_id(0x18FF_1234, true, &[1, 2, 3])
        .unwrap()
        .with_send_type(SendType::SingleShot);

    assert!(frame.is_extended());
    assert!(!frame.is_remote());
    assert_eq!(frame.raw_id(), 0x18FF_1234);
    assert_eq!(frame.dlc(), 3);
    assert_eq!(frame.data(), &[1, 2, 3]);
    assert_eq!(frame.send_type(), SendType::SingleShot);
    assert_eq!(frame.timestamp(), 0);
}

#[test]
/// Remote frames report their DLC but expose no payload.
fn test_remote_frame() {
    let frame = CanFrame::new_remote(StandardId::new(0x55).unwrap(), 4).unwrap();
    assert!(frame.is_remote());
    assert_eq!(frame.dlc(), 4);
    assert!(frame.data().is_empty());
}

#[test]
fn test_same_content_ignores_timestamp_and_send_type() {
    let sent = CanFrame::from_raw_id(0x123, false, &[1, 2, 3])
        .unwrap()
        .with_send_type(SendType::SelfReceive);
    let received = CanFrame::from_raw_id(0x123, false, &[1, 2, 3])
        .unwrap()
        .with_timestamp(9876);

    assert!(sent.same_content(&received));
    assert_ne!(sent, received);

    let other = CanFrame::from_raw_id(0x123, true, &[1, 2, 3]).unwrap();
    assert!(!sent.same_content(&other));
}

#[test]
/// The `embedded_can::Frame` implementation agrees with the inherent API.
fn test_embedded_can_frame() {
    let id = ExtendedId::new(0x1234).unwrap();
    let frame = <CanFrame as Frame>::new(id, &[0xAA]).expect("valid frame");
    assert!(Frame::is_extended(&frame));
    assert_eq!(Frame::id(&frame), Id::Extended(id));
    assert_eq!(Frame::data(&frame), &[0xAA]);

    assert!(<CanFrame as Frame>::new(id, &[0u8; 9]).is_none());
    assert!(<CanFrame as Frame>::new_remote(id, 9).is_none());
}

#[test]
fn test_send_type_tags() {
    for send_type in [SendType::Normal, SendType::SingleShot, SendType::SelfReceive] {
        assert_eq!(SendType::try_from(send_type.raw()), Ok(send_type));
    }
    assert_eq!(SendType::try_from(7), Err(FrameError::InvalidSendType(7)));
}
