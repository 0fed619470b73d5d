//! Unit tests for status snapshot decoding.

use proptest::{
    collection::vec,
    prelude::{any, proptest},
};
use rstest::rstest;

use super::*;
use crate::{
    codec::{ChecksumScheme, Inbound, decode_frame, encode_push},
    frame::CMD_STATUS_PUSH,
};

fn payload(bytes: &[(usize, u8)]) -> [u8; MIN_STATUS_LEN] {
    let mut payload = [0_u8; MIN_STATUS_LEN];
    payload[11] = 0xFF;
    payload[12] = 0xFF;
    for (index, value) in bytes {
        payload[*index] = *value;
    }
    payload
}

#[test]
fn push_frame_with_power_and_cool_decodes() {
    // power on, mode 2 (cool) in bits 5..7, target nibble 8 -> 24 °C
    let body = payload(&[(1, 0x01), (2, (2 << 5) | 8)]);
    let wire = encode_push(CMD_STATUS_PUSH, &body, ChecksumScheme::TwosComplement)
        .expect("encode push");
    let Some(Inbound::Frame(frame)) = decode_frame(&wire, ChecksumScheme::TwosComplement) else {
        panic!("expected a frame");
    };
    assert!(frame.is_status_push());

    let values = ProtocolRevision::Classic
        .decode_status(&frame.payload)
        .expect("payload is long enough");
    assert_eq!(values.power, Some(true));
    assert_eq!(values.mode, Some(Mode::Cool));
    assert_eq!(values.target_temperature, Some(24.0));
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(MIN_STATUS_LEN - 1)]
fn undersized_payload_yields_none(#[case] len: usize) {
    let bytes = vec![0xFF; len];
    assert_eq!(ProtocolRevision::Classic.decode_status(&bytes), None);
    assert_eq!(ProtocolRevision::Extended.decode_status(&bytes), None);
}

#[rstest]
#[case(0x05, 21.0)]
#[case(0x15, 21.5)]
#[case(0x0F, 31.0)]
fn classic_target_uses_half_degree_bit(#[case] setting: u8, #[case] expected: f32) {
    let values = ClassicLayout.decode(&payload(&[(2, setting)]));
    assert_eq!(values.target_temperature, Some(expected));
}

#[rstest]
#[case(0x0C, 24.0)]
#[case(0x4C, 24.5)]
#[case(0x1F, 43.0)]
fn extended_target_uses_fixed_base(#[case] setting: u8, #[case] expected: f32) {
    let values = ExtendedLayout.decode(&payload(&[(2, setting)]));
    assert_eq!(values.target_temperature, Some(expected));
}

#[test]
fn extended_mode_lives_in_byte_one() {
    let values = ExtendedLayout.decode(&payload(&[(1, (4 << 1) | 0x01)]));
    assert_eq!(values.power, Some(true));
    assert_eq!(values.mode, Some(Mode::Heat));
}

#[rstest]
#[case(ProtocolRevision::Classic, 20, FanSpeed::Low)]
#[case(ProtocolRevision::Classic, 60, FanSpeed::Medium)]
#[case(ProtocolRevision::Classic, 102, FanSpeed::Auto)]
#[case(ProtocolRevision::Extended, 5, FanSpeed::Turbo)]
#[case(ProtocolRevision::Extended, 1, FanSpeed::Silent)]
fn fan_encoding_depends_on_revision(
    #[case] revision: ProtocolRevision,
    #[case] raw: u8,
    #[case] expected: FanSpeed,
) {
    let values = revision
        .decode_status(&payload(&[(3, raw)]))
        .expect("decodes");
    assert_eq!(values.fan_speed, Some(expected));
}

#[rstest]
#[case(0x00, SwingMode::Off)]
#[case(0x04, SwingMode::Vertical)]
#[case(0x01, SwingMode::Horizontal)]
#[case(0x05, SwingMode::Both)]
fn swing_combines_flags(#[case] raw: u8, #[case] expected: SwingMode) {
    assert_eq!(
        ClassicLayout.decode(&payload(&[(7, raw)])).swing_mode,
        Some(expected)
    );
}

#[rstest]
#[case(0x20, 0x00, true)]
#[case(0x00, 0x02, true)]
#[case(0x00, 0x00, false)]
fn classic_turbo_accepts_either_position(
    #[case] byte8: u8,
    #[case] byte10: u8,
    #[case] expected: bool,
) {
    let values = ClassicLayout.decode(&payload(&[(8, byte8), (10, byte10)]));
    assert_eq!(values.turbo_mode, Some(expected));
}

#[test]
fn extended_turbo_ignores_legacy_bit() {
    let values = ExtendedLayout.decode(&payload(&[(10, 0x03)]));
    assert_eq!(values.turbo_mode, Some(false));
    assert_eq!(values.sleep_mode, Some(true));
}

#[test]
fn eco_flag_is_decoded() {
    assert_eq!(
        ClassicLayout.decode(&payload(&[(9, 0x10)])).eco_mode,
        Some(true)
    );
}

#[rstest]
#[case(0xFF, None)]
#[case(50, Some(0.0))]
#[case(95, Some(22.5))]
#[case(0, Some(-25.0))]
#[case(250, None)]
fn classic_temperatures_are_biased_and_halved(#[case] raw: u8, #[case] expected: Option<f32>) {
    let values = ClassicLayout.decode(&payload(&[(11, raw)]));
    assert_eq!(values.indoor_temperature, expected);
}

#[test]
fn extended_temperatures_add_tenths() {
    // indoor raw 94 -> 22.0 + 0.3; outdoor raw 40 -> -5.0 - 0.7
    let values = ExtendedLayout.decode(&payload(&[(11, 94), (12, 40), (15, 0x73)]));
    let indoor = values.indoor_temperature.expect("indoor present");
    let outdoor = values.outdoor_temperature.expect("outdoor present");
    assert!((indoor - 22.3).abs() < 1e-4, "indoor {indoor}");
    assert!((outdoor + 5.7).abs() < 1e-4, "outdoor {outdoor}");
}

#[test]
fn iter_lists_reported_datapoints() {
    let values = StatusValues {
        power: Some(true),
        indoor_temperature: Some(21.5),
        ..StatusValues::default()
    };
    let ids: Vec<_> = values.iter().map(|(id, _)| id).collect();
    assert_eq!(
        ids,
        vec![DatapointId::Power, DatapointId::IndoorTemperature]
    );
}

proptest! {
    #[test]
    fn arbitrary_payloads_never_panic(bytes in vec(any::<u8>(), 0..64)) {
        for revision in [ProtocolRevision::Classic, ProtocolRevision::Extended] {
            let decoded = revision.decode_status(&bytes);
            assert_eq!(decoded.is_some(), bytes.len() >= MIN_STATUS_LEN);
            if let Some(values) = decoded {
                for celsius in [values.indoor_temperature, values.outdoor_temperature]
                    .into_iter()
                    .flatten()
                {
                    assert!((-40.0..=80.0).contains(&celsius));
                }
            }
        }
    }
}
