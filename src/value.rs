//! Datapoint values and their external representation.
//!
//! Mode, fan speed and swing are enumerations on the wire. Callers may see
//! and supply them either as symbolic names (`"cool"`) or as numeric codes
//! (`2`), selected per category through [`EnumRepresentation`]. Parsing is
//! lenient about case, whitespace and common synonyms, but an unknown name
//! is an error for every category except swing, where it means "off".

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value as exchanged with callers of the bridge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Switch state.
    Bool(bool),
    /// Temperature or numeric enum code.
    Number(f64),
    /// Symbolic enum name.
    Text(String),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self { Self::Bool(value) }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self { Self::Number(value) }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self { Self::Number(f64::from(value)) }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self { Self::Text(value.to_owned()) }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Enumerated datapoint category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnumCategory {
    Mode,
    FanSpeed,
    Swing,
}

impl fmt::Display for EnumCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mode => "mode",
            Self::FanSpeed => "fan speed",
            Self::Swing => "swing mode",
        })
    }
}

/// Rejected caller input. Raised before any I/O is attempted.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValueError {
    /// Symbolic name not recognised for the category.
    #[error("unknown {category} {input:?}")]
    UnknownName {
        category: EnumCategory,
        input: String,
    },
    /// Numeric code not defined for the category.
    #[error("unknown {category} code {code}")]
    UnknownCode { category: EnumCategory, code: i64 },
    /// Value has the wrong shape for the datapoint.
    #[error("datapoint {datapoint} expects {expected}, got {got}")]
    WrongType {
        datapoint: &'static str,
        expected: &'static str,
        got: Value,
    },
    /// Datapoint cannot be written.
    #[error("datapoint {0} is read-only")]
    ReadOnly(&'static str),
    /// Numeric value outside the accepted range.
    #[error("{datapoint} value {value} outside {min}..={max}")]
    OutOfRange {
        datapoint: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// Datapoint name not in the catalog.
    #[error("unknown datapoint {0:?}")]
    UnknownDatapoint(String),
}

/// Lowercase, trim and strip separators so `"Fan Only"`, `"fan_only"` and
/// `"fan-only"` fold to the same key.
fn fold(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $category:expr, {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal, $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant in code order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Numeric code used on the wire and in numeric representation.
            #[must_use]
            pub const fn code(self) -> u8 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            /// Canonical symbolic name.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            /// Look up a variant by numeric code.
            #[must_use]
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Category this enumeration belongs to.
            pub const CATEGORY: EnumCategory = $category;
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
        }
    };
}

coded_enum!(
    /// Operating mode.
    Mode, EnumCategory::Mode, {
        Auto = 1, "auto",
        Cool = 2, "cool",
        Dry = 3, "dry",
        Heat = 4, "heat",
        FanOnly = 5, "fanonly",
    }
);

coded_enum!(
    /// Fan speed.
    FanSpeed, EnumCategory::FanSpeed, {
        Auto = 0, "auto",
        Silent = 1, "silent",
        Low = 2, "low",
        Medium = 3, "medium",
        High = 4, "high",
        Turbo = 5, "turbo",
    }
);

coded_enum!(
    /// Louvre swing.
    SwingMode, EnumCategory::Swing, {
        Off = 0, "off",
        Vertical = 1, "vertical",
        Horizontal = 2, "horizontal",
        Both = 3, "both",
    }
);

impl Mode {
    /// Parse a symbolic mode name.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::UnknownName`] for unrecognised input.
    pub fn parse(input: &str) -> Result<Self, ValueError> {
        match fold(input).as_str() {
            "auto" | "automatic" => Ok(Self::Auto),
            "cool" | "cooling" => Ok(Self::Cool),
            "dry" | "dehumidify" => Ok(Self::Dry),
            "heat" | "heating" => Ok(Self::Heat),
            "fanonly" | "fan" => Ok(Self::FanOnly),
            _ => Err(unknown_name(Self::CATEGORY, input)),
        }
    }
}

impl FanSpeed {
    /// Parse a symbolic fan speed.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::UnknownName`] for unrecognised input.
    pub fn parse(input: &str) -> Result<Self, ValueError> {
        match fold(input).as_str() {
            "auto" | "automatic" => Ok(Self::Auto),
            "silent" | "quiet" | "mute" => Ok(Self::Silent),
            "low" => Ok(Self::Low),
            "medium" | "mid" | "med" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "turbo" | "strong" | "boost" | "max" => Ok(Self::Turbo),
            _ => Err(unknown_name(Self::CATEGORY, input)),
        }
    }

    /// Map a raw fan duty value onto a speed band.
    #[must_use]
    pub fn from_duty(duty: u8) -> Self {
        match duty {
            0..=30 => Self::Low,
            31..=60 => Self::Medium,
            61..=80 => Self::High,
            _ => Self::Auto,
        }
    }
}

impl SwingMode {
    /// Parse a swing name. Empty or unrecognised input means [`SwingMode::Off`].
    #[must_use]
    pub fn parse(input: &str) -> Self {
        match fold(input).as_str() {
            "vertical" | "updown" | "ud" => Self::Vertical,
            "horizontal" | "leftright" | "lr" => Self::Horizontal,
            "both" | "all" | "3d" => Self::Both,
            _ => Self::Off,
        }
    }

    /// Combine the two louvre flags.
    #[must_use]
    pub fn from_flags(up_down: bool, left_right: bool) -> Self {
        match (up_down, left_right) {
            (false, false) => Self::Off,
            (true, false) => Self::Vertical,
            (false, true) => Self::Horizontal,
            (true, true) => Self::Both,
        }
    }
}

fn unknown_name(category: EnumCategory, input: &str) -> ValueError {
    ValueError::UnknownName {
        category,
        input: input.to_owned(),
    }
}

/// How enumerated values are presented to callers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// Lowercase names such as `"cool"`.
    #[default]
    Symbolic,
    /// Numeric wire codes.
    Numeric,
}

/// Per-category representation switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumRepresentation {
    pub mode: Representation,
    pub fan_speed: Representation,
    pub swing: Representation,
}

impl EnumRepresentation {
    /// Use numeric codes for every category.
    #[must_use]
    pub fn numeric() -> Self {
        Self {
            mode: Representation::Numeric,
            fan_speed: Representation::Numeric,
            swing: Representation::Numeric,
        }
    }

    fn for_category(self, category: EnumCategory) -> Representation {
        match category {
            EnumCategory::Mode => self.mode,
            EnumCategory::FanSpeed => self.fan_speed,
            EnumCategory::Swing => self.swing,
        }
    }

    pub(crate) fn present(self, category: EnumCategory, code: u8, name: &str) -> Value {
        match self.for_category(category) {
            Representation::Symbolic => Value::Text(name.to_owned()),
            Representation::Numeric => Value::Number(f64::from(code)),
        }
    }
}

/// Read a numeric enum code out of a caller-supplied number.
pub(crate) fn code_from_number(category: EnumCategory, number: f64) -> Result<u8, ValueError> {
    #[allow(clippy::cast_possible_truncation, reason = "saturating cast is intended")]
    let code = number as i64;
    if number.fract() != 0.0 || !(0..=255).contains(&code) {
        return Err(ValueError::UnknownCode { category, code });
    }
    u8::try_from(code).map_err(|_| ValueError::UnknownCode { category, code })
}

pub(crate) fn mode_from_value(value: &Value) -> Result<Option<Mode>, ValueError> {
    match value {
        Value::Text(text) => Mode::parse(text).map(Some),
        Value::Number(number) => {
            let code = code_from_number(Mode::CATEGORY, *number)?;
            Mode::from_code(code).map(Some).ok_or(ValueError::UnknownCode {
                category: Mode::CATEGORY,
                code: i64::from(code),
            })
        }
        Value::Bool(_) => Ok(None),
    }
}

pub(crate) fn fan_from_value(value: &Value) -> Result<Option<FanSpeed>, ValueError> {
    match value {
        Value::Text(text) => FanSpeed::parse(text).map(Some),
        Value::Number(number) => {
            let code = code_from_number(FanSpeed::CATEGORY, *number)?;
            FanSpeed::from_code(code)
                .map(Some)
                .ok_or(ValueError::UnknownCode {
                    category: FanSpeed::CATEGORY,
                    code: i64::from(code),
                })
        }
        Value::Bool(_) => Ok(None),
    }
}

pub(crate) fn swing_from_value(value: &Value) -> Result<Option<SwingMode>, ValueError> {
    match value {
        Value::Text(text) => Ok(Some(SwingMode::parse(text))),
        Value::Number(number) => {
            let code = code_from_number(SwingMode::CATEGORY, *number)?;
            SwingMode::from_code(code)
                .map(Some)
                .ok_or(ValueError::UnknownCode {
                    category: SwingMode::CATEGORY,
                    code: i64::from(code),
                })
        }
        Value::Bool(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn every_mode_round_trips_through_its_code() {
        for mode in Mode::ALL {
            assert_eq!(Mode::from_code(mode.code()), Some(*mode));
            assert_eq!(Mode::parse(mode.name()), Ok(*mode));
        }
    }

    #[test]
    fn every_fan_speed_round_trips_through_its_code() {
        for speed in FanSpeed::ALL {
            assert_eq!(FanSpeed::from_code(speed.code()), Some(*speed));
            assert_eq!(FanSpeed::parse(speed.name()), Ok(*speed));
        }
    }

    #[test]
    fn every_swing_mode_round_trips_through_its_code() {
        for swing in SwingMode::ALL {
            assert_eq!(SwingMode::from_code(swing.code()), Some(*swing));
            assert_eq!(SwingMode::parse(swing.name()), *swing);
        }
    }

    #[rstest]
    #[case("fan", Mode::FanOnly)]
    #[case("Fan Only", Mode::FanOnly)]
    #[case("  fan_only ", Mode::FanOnly)]
    #[case("COOL", Mode::Cool)]
    #[case("dehumidify", Mode::Dry)]
    fn mode_aliases_fold(#[case] input: &str, #[case] expected: Mode) {
        assert_eq!(Mode::parse(input), Ok(expected));
    }

    #[rstest]
    #[case("quiet", FanSpeed::Silent)]
    #[case("Mid", FanSpeed::Medium)]
    #[case("strong", FanSpeed::Turbo)]
    fn fan_aliases_fold(#[case] input: &str, #[case] expected: FanSpeed) {
        assert_eq!(FanSpeed::parse(input), Ok(expected));
    }

    #[rstest]
    #[case("warp")]
    #[case("")]
    fn unknown_mode_is_rejected(#[case] input: &str) {
        assert!(matches!(
            Mode::parse(input),
            Err(ValueError::UnknownName {
                category: EnumCategory::Mode,
                ..
            })
        ));
        assert!(FanSpeed::parse(input).is_err());
    }

    #[rstest]
    #[case("", SwingMode::Off)]
    #[case("sideways", SwingMode::Off)]
    #[case("Up-Down", SwingMode::Vertical)]
    #[case("all", SwingMode::Both)]
    fn swing_parse_defaults_to_off(#[case] input: &str, #[case] expected: SwingMode) {
        assert_eq!(SwingMode::parse(input), expected);
    }

    #[rstest]
    #[case(0, FanSpeed::Low)]
    #[case(30, FanSpeed::Low)]
    #[case(31, FanSpeed::Medium)]
    #[case(60, FanSpeed::Medium)]
    #[case(80, FanSpeed::High)]
    #[case(81, FanSpeed::Auto)]
    #[case(102, FanSpeed::Auto)]
    fn duty_bands(#[case] duty: u8, #[case] expected: FanSpeed) {
        assert_eq!(FanSpeed::from_duty(duty), expected);
    }

    #[test]
    fn numeric_input_is_checked() {
        assert_eq!(mode_from_value(&Value::Number(4.0)), Ok(Some(Mode::Heat)));
        assert!(mode_from_value(&Value::Number(9.0)).is_err());
        assert!(fan_from_value(&Value::Number(1.5)).is_err());
        assert_eq!(
            swing_from_value(&Value::Number(3.0)),
            Ok(Some(SwingMode::Both))
        );
    }

    #[test]
    fn representation_switch_is_per_category() {
        let repr = EnumRepresentation {
            mode: Representation::Numeric,
            ..EnumRepresentation::default()
        };
        assert_eq!(
            repr.present(EnumCategory::Mode, 2, "cool"),
            Value::Number(2.0)
        );
        assert_eq!(
            repr.present(EnumCategory::FanSpeed, 3, "medium"),
            Value::Text("medium".to_owned())
        );
    }

    #[test]
    fn value_deserializes_untagged() {
        let parsed: Vec<Value> = serde_json::from_str(r#"[true, 24.5, "cool"]"#).expect("parse");
        assert_eq!(
            parsed,
            vec![
                Value::Bool(true),
                Value::Number(24.5),
                Value::Text("cool".to_owned())
            ]
        );
    }
}
