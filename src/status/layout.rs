//! Bit layouts of the supported protocol revisions.
//!
//! Byte offsets are relative to the start of the status payload.

use super::{MIN_STATUS_LEN, StatusLayout, StatusValues};
use crate::value::{FanSpeed, Mode, SwingMode};

type Payload = [u8; MIN_STATUS_LEN];

const POWER: (usize, u8) = (1, 0x01);
const SWING_UP_DOWN: (usize, u8) = (7, 0x04);
const SWING_LEFT_RIGHT: (usize, u8) = (7, 0x01);
const TURBO: (usize, u8) = (8, 0x20);
const ECO: (usize, u8) = (9, 0x10);
const SLEEP: (usize, u8) = (10, 0x01);
/// Older firmware reports turbo here instead.
const TURBO_LEGACY: (usize, u8) = (10, 0x02);
const INDOOR: usize = 11;
const OUTDOOR: usize = 12;
const TENTHS: usize = 15;

/// Raw temperature byte meaning "no sensor".
const ABSENT: u8 = 0xFF;
const TEMPERATURE_BIAS: f32 = 50.0;
const MIN_CELSIUS: f32 = -40.0;
const MAX_CELSIUS: f32 = 80.0;

fn flag(payload: &Payload, (index, mask): (usize, u8)) -> bool { payload[index] & mask != 0 }

fn swing(payload: &Payload) -> SwingMode {
    SwingMode::from_flags(
        flag(payload, SWING_UP_DOWN),
        flag(payload, SWING_LEFT_RIGHT),
    )
}

fn round_to(value: f32, step: f32) -> f32 { (value / step).round() * step }

/// `(raw - bias) / 2`, or `None` for the sentinel and out-of-range readings.
fn temperature(raw: u8, tenths: Option<u8>, step: f32) -> Option<f32> {
    if raw == ABSENT {
        return None;
    }
    let mut celsius = (f32::from(raw) - TEMPERATURE_BIAS) / 2.0;
    if let Some(tenths) = tenths.filter(|t| *t < 10) {
        let fraction = f32::from(tenths) / 10.0;
        celsius += if celsius < 0.0 { -fraction } else { fraction };
    }
    (MIN_CELSIUS..=MAX_CELSIUS)
        .contains(&celsius)
        .then(|| round_to(celsius, step))
}

/// Mode in bits 5..7 of byte 2, target `16 + low nibble (+0.5 on bit 4)`,
/// banded fan duty, half-degree sensor precision.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClassicLayout;

impl StatusLayout for ClassicLayout {
    fn decode(&self, payload: &Payload) -> StatusValues {
        let setting = payload[2];
        let half = if setting & 0x10 != 0 { 0.5 } else { 0.0 };
        StatusValues {
            power: Some(flag(payload, POWER)),
            mode: Mode::from_code((setting >> 5) & 0x07),
            target_temperature: Some(16.0 + f32::from(setting & 0x0F) + half),
            fan_speed: Some(FanSpeed::from_duty(payload[3] & 0x7F)),
            swing_mode: Some(swing(payload)),
            eco_mode: Some(flag(payload, ECO)),
            turbo_mode: Some(flag(payload, TURBO) || flag(payload, TURBO_LEGACY)),
            sleep_mode: Some(flag(payload, SLEEP)),
            indoor_temperature: temperature(payload[INDOOR], None, 0.5),
            outdoor_temperature: temperature(payload[OUTDOOR], None, 0.5),
        }
    }
}

/// Mode in bits 1..3 of byte 1, target `12 + 5-bit offset (+0.5 on bit 6)`,
/// direct fan codes, tenth-degree sensor precision from byte 15 nibbles.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtendedLayout;

impl StatusLayout for ExtendedLayout {
    fn decode(&self, payload: &Payload) -> StatusValues {
        let setting = payload[2];
        let half = if setting & 0x40 != 0 { 0.5 } else { 0.0 };
        StatusValues {
            power: Some(flag(payload, POWER)),
            mode: Mode::from_code((payload[1] >> 1) & 0x07),
            target_temperature: Some(12.0 + f32::from(setting & 0x1F) + half),
            fan_speed: FanSpeed::from_code(payload[3] & 0x0F),
            swing_mode: Some(swing(payload)),
            eco_mode: Some(flag(payload, ECO)),
            turbo_mode: Some(flag(payload, TURBO)),
            sleep_mode: Some(flag(payload, SLEEP)),
            indoor_temperature: temperature(payload[INDOOR], Some(payload[TENTHS] & 0x0F), 0.1),
            outdoor_temperature: temperature(payload[OUTDOOR], Some(payload[TENTHS] >> 4), 0.1),
        }
    }
}
