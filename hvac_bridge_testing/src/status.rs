//! Builder for classic-layout status payloads.

use bytes::Bytes;
use hvac_bridge::{
    ChecksumScheme,
    codec::encode_push,
    frame::CMD_STATUS_PUSH,
    status::MIN_STATUS_LEN,
};

/// Absent temperature marker.
const NO_READING: u8 = 0xFF;

/// Unit state rendered as a classic status payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusBuilder {
    pub power: bool,
    /// Mode code, `1..=5`.
    pub mode: u8,
    /// Target temperature in `16.0..=31.5`, half-degree steps.
    pub target: f32,
    /// Raw fan duty value.
    pub fan_duty: u8,
    pub swing_vertical: bool,
    pub swing_horizontal: bool,
    pub eco: bool,
    pub turbo: bool,
    pub sleep: bool,
    pub indoor: Option<f32>,
    pub outdoor: Option<f32>,
}

impl Default for StatusBuilder {
    fn default() -> Self {
        Self {
            power: false,
            mode: 1,
            target: 24.0,
            fan_duty: 102,
            swing_vertical: false,
            swing_horizontal: false,
            eco: false,
            turbo: false,
            sleep: false,
            indoor: Some(23.5),
            outdoor: None,
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "values are clamped into the byte range first"
)]
fn to_byte(value: f32) -> u8 { value.round().clamp(0.0, 254.0) as u8 }

fn temperature_byte(celsius: Option<f32>) -> u8 {
    celsius.map_or(NO_READING, |c| to_byte(c * 2.0 + 50.0))
}

impl StatusBuilder {
    /// Render the 16-byte payload.
    #[must_use]
    pub fn payload(&self) -> [u8; MIN_STATUS_LEN] {
        let mut payload = [0_u8; MIN_STATUS_LEN];
        payload[1] = u8::from(self.power);
        let offset = (self.target - 16.0).clamp(0.0, 15.5);
        let whole = to_byte(offset.floor());
        let half = if offset.fract() >= 0.5 { 0x10 } else { 0 };
        payload[2] = ((self.mode & 0x07) << 5) | half | (whole & 0x0F);
        payload[3] = self.fan_duty & 0x7F;
        payload[7] = (u8::from(self.swing_vertical) << 2) | u8::from(self.swing_horizontal);
        payload[8] = u8::from(self.turbo) << 5;
        payload[9] = u8::from(self.eco) << 4;
        payload[10] = u8::from(self.sleep);
        payload[11] = temperature_byte(self.indoor);
        payload[12] = temperature_byte(self.outdoor);
        payload
    }

    /// Render a complete push frame.
    #[must_use]
    pub fn push_frame(&self) -> Bytes {
        match encode_push(CMD_STATUS_PUSH, &self.payload(), ChecksumScheme::TwosComplement) {
            Ok(frame) => frame,
            Err(error) => unreachable!("a 16 byte payload always fits: {error}"),
        }
    }

    /// Apply a set command the way the unit would.
    ///
    /// Returns `false` for commands that do not change status.
    pub fn apply(&mut self, command: u8, code: u8) -> bool {
        match command {
            0x11 => self.power = code != 0,
            0x12 => self.mode = code,
            0x13 => self.target = f32::from(code),
            0x16 => {
                self.fan_duty = match code {
                    2 => 20,
                    3 => 50,
                    4 => 75,
                    _ => 102,
                }
            }
            0x17 => {
                self.swing_vertical = code & 0x01 != 0;
                self.swing_horizontal = code & 0x02 != 0;
            }
            0x18 => self.eco = code != 0,
            0x19 => self.turbo = code != 0,
            0x1a => self.sleep = code != 0,
            _ => return false,
        }
        true
    }

    /// Current value answered to a query command.
    #[must_use]
    pub fn query(&self, command: u8) -> Option<u8> {
        Some(match command {
            0x81 => u8::from(self.power),
            0x82 => self.mode,
            0x83 => to_byte(self.target),
            0x86 => match self.fan_duty {
                0..=30 => 2,
                31..=60 => 3,
                61..=80 => 4,
                _ => 0,
            },
            0x87 => u8::from(self.swing_vertical) | (u8::from(self.swing_horizontal) << 1),
            0x88 => u8::from(self.eco),
            0x89 => u8::from(self.turbo),
            0x8a => u8::from(self.sleep),
            _ => return None,
        })
    }
}
