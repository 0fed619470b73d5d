//! Status snapshot decoding.
//!
//! A status payload is a dense bit-packed snapshot of the unit. Its layout
//! differs between protocol revisions; each revision is a [`StatusLayout`]
//! and a bridge picks one per connection through [`ProtocolRevision`].
//! Decoding is pure and total: undersized input yields `None` and every
//! byte pattern of sufficient length decodes without panicking.

use serde::{Deserialize, Serialize};

use crate::{
    datapoint::{DatapointId, DatapointValue},
    value::{FanSpeed, Mode, SwingMode},
};

mod layout;

pub use layout::{ClassicLayout, ExtendedLayout};

/// Minimum payload length of a status snapshot.
pub const MIN_STATUS_LEN: usize = 16;

/// Decoded status snapshot. Fields the unit did not report are `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_speed: Option<FanSpeed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swing_mode: Option<SwingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eco_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turbo_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indoor_temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdoor_temperature: Option<f32>,
}

impl StatusValues {
    /// Value reported for `id`, if any.
    #[must_use]
    pub fn get(&self, id: DatapointId) -> Option<DatapointValue> {
        match id {
            DatapointId::Power => self.power.map(DatapointValue::Switch),
            DatapointId::Mode => self.mode.map(DatapointValue::Mode),
            DatapointId::TargetTemperature => {
                self.target_temperature.map(DatapointValue::Temperature)
            }
            DatapointId::FanSpeed => self.fan_speed.map(DatapointValue::FanSpeed),
            DatapointId::SwingMode => self.swing_mode.map(DatapointValue::Swing),
            DatapointId::EcoMode => self.eco_mode.map(DatapointValue::Switch),
            DatapointId::TurboMode => self.turbo_mode.map(DatapointValue::Switch),
            DatapointId::SleepMode => self.sleep_mode.map(DatapointValue::Switch),
            DatapointId::IndoorTemperature => {
                self.indoor_temperature.map(DatapointValue::Temperature)
            }
            DatapointId::OutdoorTemperature => {
                self.outdoor_temperature.map(DatapointValue::Temperature)
            }
        }
    }

    /// Every reported datapoint.
    pub fn iter(&self) -> impl Iterator<Item = (DatapointId, DatapointValue)> + '_ {
        DatapointId::ALL
            .into_iter()
            .filter_map(|id| self.get(id).map(|value| (id, value)))
    }
}

/// Bit layout of one protocol revision.
pub trait StatusLayout: Send + Sync {
    /// Decode a payload of at least [`MIN_STATUS_LEN`] bytes.
    fn decode(&self, payload: &[u8; MIN_STATUS_LEN]) -> StatusValues;
}

/// Protocol revision spoken by the unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolRevision {
    /// Integer plus half-degree target, banded fan duty, 0.5 °C temperatures.
    #[default]
    Classic,
    /// Base plus 5-bit offset target, direct fan codes, 0.1 °C temperatures.
    Extended,
}

impl ProtocolRevision {
    /// Layout strategy for this revision.
    #[must_use]
    pub fn layout(self) -> &'static dyn StatusLayout {
        match self {
            Self::Classic => &ClassicLayout,
            Self::Extended => &ExtendedLayout,
        }
    }

    /// Decode a status payload.
    ///
    /// Returns `None` for payloads shorter than [`MIN_STATUS_LEN`]. Bytes
    /// beyond the minimum length are ignored.
    #[must_use]
    pub fn decode_status(self, payload: &[u8]) -> Option<StatusValues> {
        let head: &[u8; MIN_STATUS_LEN] = payload.get(..MIN_STATUS_LEN)?.try_into().ok()?;
        Some(self.layout().decode(head))
    }
}

#[cfg(test)]
mod tests;
