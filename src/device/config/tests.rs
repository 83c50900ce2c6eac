//! Unit tests for bit timing decoding and acceptance filtering.
use super::*;

fn std_frame(id: u16, data: &[u8]) -> CanFrame {
    CanFrame::new(StandardId::new(id).unwrap(), data).unwrap()
}

fn ext_frame(id: u32, data: &[u8]) -> CanFrame {
    CanFrame::new(ExtendedId::new(id).unwrap(), data).unwrap()
}

//==================================================================================BIT_TIMING
#[test]
/// Every preset yields its nominal bitrate on a 16 MHz SJA1000.
fn test_presets_match_nominal_bitrate() {
    for bitrate in [
        Bitrate::Kbps5,
        Bitrate::Kbps10,
        Bitrate::Kbps20,
        Bitrate::Kbps50,
        Bitrate::Kbps100,
        Bitrate::Kbps125,
        Bitrate::Kbps250,
        Bitrate::Kbps500,
        Bitrate::Kbps800,
        Bitrate::Kbps1000,
    ] {
        let segments = BitTiming::from(bitrate).segments();
        assert!(segments.is_valid(), "{bitrate:?} must be a valid timing");
        assert_eq!(segments.bitrate(SJA1000_CLOCK_HZ), bitrate.bits_per_second());
    }
}

#[test]
fn test_sja1000_decoding() {
    let segments = BitTiming::from(Bitrate::Kbps250).segments();
    assert_eq!(segments.prescaler, 2);
    assert_eq!(segments.sjw, 1);
    assert_eq!(segments.tseg1, 13);
    assert_eq!(segments.tseg2, 2);
    assert!(!segments.triple_sampling);
    assert_eq!(segments.sample_point_permille(), 875);

    assert!(BitTiming::from(Bitrate::Kbps5).segments().triple_sampling);
}

#[test]
/// SJW larger than TSEG2, or TSEG2 larger than TSEG1, is rejected.
fn test_invalid_segments() {
    let sjw_too_wide = BitTiming::Sja1000 {
        btr0: 0xC0,
        btr1: 0x1C,
    };
    assert!(!sjw_too_wide.segments().is_valid());

    let tseg2_too_long = BitTiming::Sja1000 {
        btr0: 0x00,
        btr1: 0x70,
    };
    assert!(!tseg2_too_long.segments().is_valid());
}

#[test]
fn test_lpc21xx_register() {
    // BRP=15, TSEG1=13, TSEG2=2, SJW=1 → 250 kbit/s on a 60 MHz peripheral clock.
    let timing = BitTiming::Lpc21xx(0x001C_000E);
    let segments = timing.segments();
    assert!(segments.is_valid());
    assert_eq!(segments.bitrate(60_000_000), 250_000);

    let (btr_type, registers) = timing.to_registers();
    assert_eq!(btr_type, 0);
    assert_eq!(registers, [0x0E, 0x00, 0x1C, 0x00]);
    assert_eq!(BitTiming::from_registers(btr_type, registers), Some(timing));
    assert_eq!(BitTiming::from_registers(7, registers), None);
}

//==================================================================================FILTER
#[test]
/// Without filtering, any 11-bit or 29-bit identifier passes.
fn test_no_filter_accepts_everything() {
    let filter = Filter::None;
    for id in [0u16, 0x123, 0x7FF] {
        assert!(filter.accepts(&std_frame(id, &[1, 2, 3])));
    }
    for id in [0u32, 0x1234, 0x1FFF_FFFF] {
        assert!(filter.accepts(&ext_frame(id, &[])));
    }
    let remote = CanFrame::new_remote(StandardId::new(0x10).unwrap(), 2).unwrap();
    assert!(filter.accepts(&remote));
}

#[test]
fn test_single_filter_on_standard_id() {
    let filter = Filter::standard_id(StandardId::new(0x123).unwrap());
    assert!(filter.accepts(&std_frame(0x123, &[0xFF, 0xEE])));
    assert!(filter.accepts(&std_frame(0x123, &[])));
    assert!(!filter.accepts(&std_frame(0x124, &[])));
    assert!(!filter.accepts(&ext_frame(0x123, &[])));
}

#[test]
/// The single standard filter also covers RTR and the first two data bytes.
fn test_single_filter_on_standard_payload() {
    let filter = Filter::Single {
        code: (0x123 << 21) | (0xAB << 8),
        mask: 0x000F_00FF,
    };
    assert!(filter.accepts(&std_frame(0x123, &[0xAB, 0x01])));
    assert!(filter.accepts(&std_frame(0x123, &[])));
    assert!(!filter.accepts(&std_frame(0x123, &[0xAC])));

    let remote = CanFrame::new_remote(StandardId::new(0x123).unwrap(), 0).unwrap();
    assert!(!filter.accepts(&remote));
}

#[test]
fn test_single_filter_on_extended_id() {
    let filter = Filter::extended_id(ExtendedId::new(0x18FF_1234).unwrap());
    assert!(filter.accepts(&ext_frame(0x18FF_1234, &[1])));
    // RTR falls in the don't-care bits of this filter.
    let remote = CanFrame::new_remote(ExtendedId::new(0x18FF_1234).unwrap(), 8).unwrap();
    assert!(filter.accepts(&remote));
    assert!(!filter.accepts(&ext_frame(0x18FF_1235, &[])));
    assert!(!filter.accepts(&std_frame(0x123, &[])));
}

#[test]
/// Either short filter may accept a standard frame.
fn test_dual_filter_on_standard_ids() {
    let filter = Filter::Dual {
        code: (0x100 << 21) | (0x200 << 5),
        mask: 0x000F_000F,
    };
    assert!(filter.accepts(&std_frame(0x100, &[0x5A])));
    assert!(filter.accepts(&std_frame(0x200, &[])));
    assert!(!filter.accepts(&std_frame(0x300, &[])));
}

#[test]
/// Dual filtering of extended frames only looks at ID28..ID13.
fn test_dual_filter_on_extended_ids() {
    let filter = Filter::Dual {
        code: (0x91A0 << 16) | 0x2B3C,
        mask: 0,
    };
    assert!(filter.accepts(&ext_frame(0x1234_0000, &[])));
    assert!(filter.accepts(&ext_frame(0x1234_0001, &[])));
    assert!(filter.accepts(&ext_frame(0x0567_8000, &[])));
    assert!(!filter.accepts(&ext_frame(0x0000_2000, &[])));
}

#[test]
fn test_filter_raw_encoding() {
    assert_eq!(Filter::None.to_raw(), (0, 0, 0xFFFF_FFFF));
    let dual = Filter::Dual { code: 1, mask: 2 };
    assert_eq!(dual.to_raw(), (1, 1, 2));
    assert_eq!(Filter::from_raw(2, 5, 6), Some(Filter::Single { code: 5, mask: 6 }));
    assert_eq!(Filter::from_raw(3, 0, 0), None);
}

//==================================================================================CHANNEL_CONFIG
#[test]
fn test_channel_config_builder() {
    let config = ChannelConfig::new(Bitrate::Kbps500)
        .listen_only()
        .with_filter(Filter::Dual { code: 0, mask: 0 });

    assert_eq!(config.mode, WorkMode::ListenOnly);
    assert_eq!(
        config.timing,
        BitTiming::Sja1000 {
            btr0: 0x00,
            btr1: 0x1C
        }
    );
    assert_eq!(ChannelConfig::default().filter, Filter::None);
    assert_eq!(WorkMode::from_raw(config.mode.raw()), Some(WorkMode::ListenOnly));
}
