//! Datapoint catalog.
//!
//! Each controllable or observable property of the unit is a datapoint with
//! a fixed set/query opcode pair. The catalog converts caller [`Value`]s into
//! typed [`DatapointValue`]s (validating them before any I/O happens) and
//! builds the command payloads written to the wire.

use std::{fmt, str::FromStr};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::value::{
    EnumRepresentation,
    FanSpeed,
    Mode,
    SwingMode,
    Value,
    ValueError,
    fan_from_value,
    mode_from_value,
    swing_from_value,
};

/// Lowest target temperature accepted by `set`.
pub const MIN_TARGET_TEMPERATURE: f64 = 16.0;
/// Highest target temperature accepted by `set`.
pub const MAX_TARGET_TEMPERATURE: f64 = 31.0;

/// Identifier of a datapoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatapointId {
    Power,
    Mode,
    TargetTemperature,
    FanSpeed,
    SwingMode,
    EcoMode,
    TurboMode,
    SleepMode,
    IndoorTemperature,
    OutdoorTemperature,
}

impl DatapointId {
    /// Every datapoint in catalog order.
    pub const ALL: [Self; 10] = [
        Self::Power,
        Self::Mode,
        Self::TargetTemperature,
        Self::FanSpeed,
        Self::SwingMode,
        Self::EcoMode,
        Self::TurboMode,
        Self::SleepMode,
        Self::IndoorTemperature,
        Self::OutdoorTemperature,
    ];

    /// Name used in logs, events and the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Mode => "mode",
            Self::TargetTemperature => "targetTemperature",
            Self::FanSpeed => "fanSpeed",
            Self::SwingMode => "swingMode",
            Self::EcoMode => "ecoMode",
            Self::TurboMode => "turboMode",
            Self::SleepMode => "sleepMode",
            Self::IndoorTemperature => "indoorTemperature",
            Self::OutdoorTemperature => "outdoorTemperature",
        }
    }

    /// Static definition of this datapoint.
    #[must_use]
    pub fn definition(self) -> &'static DatapointDefinition { &CATALOG[self as usize] }
}

impl fmt::Display for DatapointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for DatapointId {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ValueError::UnknownDatapoint(s.to_owned()))
    }
}

/// Shape of the values a datapoint holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Switch,
    Temperature,
    Mode,
    FanSpeed,
    Swing,
}

impl ValueKind {
    fn describe(self) -> &'static str {
        match self {
            Self::Switch => "a boolean",
            Self::Temperature => "a number",
            Self::Mode => "a mode name or code",
            Self::FanSpeed => "a fan speed name or code",
            Self::Swing => "a swing name or code",
        }
    }
}

/// Typed datapoint value as decoded from the unit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DatapointValue {
    Switch(bool),
    Temperature(f32),
    Mode(Mode),
    FanSpeed(FanSpeed),
    Swing(SwingMode),
}

impl DatapointValue {
    /// Present this value to callers.
    #[must_use]
    pub fn to_value(self, representation: EnumRepresentation) -> Value {
        match self {
            Self::Switch(on) => Value::Bool(on),
            Self::Temperature(celsius) => Value::Number(f64::from(celsius)),
            Self::Mode(mode) => representation.present(Mode::CATEGORY, mode.code(), mode.name()),
            Self::FanSpeed(speed) => {
                representation.present(FanSpeed::CATEGORY, speed.code(), speed.name())
            }
            Self::Swing(swing) => {
                representation.present(SwingMode::CATEGORY, swing.code(), swing.name())
            }
        }
    }

    /// Single byte written to the wire for this value.
    #[must_use]
    pub fn wire_code(self) -> u8 {
        match self {
            Self::Switch(on) => u8::from(on),
            Self::Temperature(celsius) => round_celsius(f64::from(celsius)),
            Self::Mode(mode) => mode.code(),
            Self::FanSpeed(speed) => speed.code(),
            Self::Swing(swing) => swing.code(),
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "clamped into the byte range before casting"
)]
fn round_celsius(celsius: f64) -> u8 { celsius.round().clamp(0.0, 255.0) as u8 }

/// Source of a command payload.
#[derive(Clone, Copy)]
pub enum Payload {
    /// No payload bytes.
    Empty,
    /// Fixed bytes.
    Static(&'static [u8]),
    /// Bytes computed from the value being written.
    Builder(fn(&DatapointValue) -> Vec<u8>),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Static(bytes) => f.debug_tuple("Static").field(bytes).finish(),
            Self::Builder(_) => f.write_str("Builder(..)"),
        }
    }
}

/// Opcode plus payload recipe for one command.
#[derive(Clone, Copy, Debug)]
pub struct CommandSpec {
    pub command: u8,
    pub payload: Payload,
}

impl CommandSpec {
    /// Build the payload for this command.
    ///
    /// A builder without a value yields an empty payload.
    #[must_use]
    pub fn build(&self, value: Option<&DatapointValue>) -> Bytes {
        match (self.payload, value) {
            (Payload::Empty, _) | (Payload::Builder(_), None) => Bytes::new(),
            (Payload::Static(bytes), _) => Bytes::from_static(bytes),
            (Payload::Builder(build), Some(value)) => Bytes::from(build(value)),
        }
    }
}

fn single_code(value: &DatapointValue) -> Vec<u8> { vec![value.wire_code()] }

/// Status poll request.
pub const STATUS_POLL: CommandSpec = CommandSpec {
    command: crate::frame::CMD_STATUS_POLL,
    payload: Payload::Empty,
};

/// Static description of a datapoint.
#[derive(Debug)]
pub struct DatapointDefinition {
    pub id: DatapointId,
    pub kind: ValueKind,
    pub set: Option<CommandSpec>,
    pub query: Option<CommandSpec>,
}

const fn writable(id: DatapointId, kind: ValueKind, set: u8, query: u8) -> DatapointDefinition {
    DatapointDefinition {
        id,
        kind,
        set: Some(CommandSpec {
            command: set,
            payload: Payload::Builder(single_code),
        }),
        query: Some(CommandSpec {
            command: query,
            payload: Payload::Empty,
        }),
    }
}

const fn observed(id: DatapointId) -> DatapointDefinition {
    DatapointDefinition {
        id,
        kind: ValueKind::Temperature,
        set: None,
        query: None,
    }
}

// Indexed by `DatapointId` discriminant.
static CATALOG: [DatapointDefinition; 10] = [
    writable(DatapointId::Power, ValueKind::Switch, 0x11, 0x81),
    writable(DatapointId::Mode, ValueKind::Mode, 0x12, 0x82),
    writable(
        DatapointId::TargetTemperature,
        ValueKind::Temperature,
        0x13,
        0x83,
    ),
    writable(DatapointId::FanSpeed, ValueKind::FanSpeed, 0x16, 0x86),
    writable(DatapointId::SwingMode, ValueKind::Swing, 0x17, 0x87),
    writable(DatapointId::EcoMode, ValueKind::Switch, 0x18, 0x88),
    writable(DatapointId::TurboMode, ValueKind::Switch, 0x19, 0x89),
    writable(DatapointId::SleepMode, ValueKind::Switch, 0x1a, 0x8a),
    observed(DatapointId::IndoorTemperature),
    observed(DatapointId::OutdoorTemperature),
];

impl DatapointDefinition {
    /// Whether the datapoint accepts writes.
    #[must_use]
    pub fn is_writable(&self) -> bool { self.set.is_some() }

    /// Validate and convert a caller value for writing.
    ///
    /// # Errors
    ///
    /// Returns a [`ValueError`] when the datapoint is read-only, the value has
    /// the wrong shape, names an unknown enum member or is out of range.
    pub fn parse_value(&self, value: &Value) -> Result<DatapointValue, ValueError> {
        if !self.is_writable() {
            return Err(ValueError::ReadOnly(self.id.as_str()));
        }
        let parsed = match self.kind {
            ValueKind::Switch => switch_from_value(value).map(DatapointValue::Switch),
            ValueKind::Temperature => match value {
                Value::Number(celsius) => {
                    if !(MIN_TARGET_TEMPERATURE..=MAX_TARGET_TEMPERATURE).contains(celsius) {
                        return Err(ValueError::OutOfRange {
                            datapoint: self.id.as_str(),
                            value: *celsius,
                            min: MIN_TARGET_TEMPERATURE,
                            max: MAX_TARGET_TEMPERATURE,
                        });
                    }
                    #[allow(clippy::cast_possible_truncation, reason = "range checked above")]
                    let celsius = *celsius as f32;
                    Some(DatapointValue::Temperature(celsius))
                }
                _ => None,
            },
            ValueKind::Mode => mode_from_value(value)?.map(DatapointValue::Mode),
            ValueKind::FanSpeed => fan_from_value(value)?.map(DatapointValue::FanSpeed),
            ValueKind::Swing => swing_from_value(value)?.map(DatapointValue::Swing),
        };
        parsed.ok_or_else(|| ValueError::WrongType {
            datapoint: self.id.as_str(),
            expected: self.kind.describe(),
            got: value.clone(),
        })
    }

    /// Interpret the first payload byte of a query response.
    #[must_use]
    pub fn parse_response(&self, payload: &[u8]) -> Option<DatapointValue> {
        let raw = *payload.first()?;
        match self.kind {
            ValueKind::Switch => Some(DatapointValue::Switch(raw & 0x01 != 0)),
            ValueKind::Temperature => Some(DatapointValue::Temperature(f32::from(raw))),
            ValueKind::Mode => Mode::from_code(raw).map(DatapointValue::Mode),
            ValueKind::FanSpeed => FanSpeed::from_code(raw).map(DatapointValue::FanSpeed),
            ValueKind::Swing => SwingMode::from_code(raw).map(DatapointValue::Swing),
        }
    }
}

fn switch_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(on) => Some(*on),
        Value::Number(number) if *number == 0.0 || *number == 1.0 => Some(*number == 1.0),
        Value::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Some(true),
            "off" | "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(_) => None,
    }
}
