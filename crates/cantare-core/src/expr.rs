//! Expression curve abbreviations and descriptors.

use serde::{Deserialize, Serialize};

/// Pitch curve in cents. Not an editable expression; derived from notes when absent.
pub const PITCH: &str = "pitch";
/// Dynamics in dB.
pub const DYN: &str = "dyn";
/// Pitch deviation.
pub const PITD: &str = "pitd";
/// Gender / formant shift.
pub const GENC: &str = "genc";
pub const CLR: &str = "clr";
/// Breathiness delta.
pub const BREC: &str = "brec";
/// Velocity (consonant speed), logarithmic.
pub const VELC: &str = "velc";
/// Energy delta.
pub const ENE: &str = "ene";
/// Pitch expressiveness.
pub const PEXP: &str = "pexp";
/// Prefix of per-sub-bank voice color curves (`cl01`, `cl02`, ...).
pub const VOICE_COLOR_PREFIX: &str = "cl";

/// Sub-bank index of a voice color abbreviation (`cl01` → 0).
///
/// Any integer suffix is a voice color curve, so `cl00` maps to -1 and matches
/// no sub-bank.
pub fn voice_color_index(abbr: &str) -> Option<i32> {
    let number: i32 = abbr.strip_prefix(VOICE_COLOR_PREFIX)?.parse().ok()?;
    Some(number.saturating_sub(1))
}

pub fn voice_color_abbr(index: usize) -> String {
    format!("{VOICE_COLOR_PREFIX}{:02}", index + 1)
}

/// A curve expression a renderer may understand, as shown to curve editors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionDescriptor {
    pub name: String,
    pub abbr: String,
    pub min: f32,
    pub max: f32,
    pub default_value: f32,
    pub is_flag: bool,
}

impl ExpressionDescriptor {
    pub fn curve(name: impl Into<String>, abbr: impl Into<String>, min: f32, max: f32, default_value: f32) -> Self {
        Self {
            name: name.into(),
            abbr: abbr.into(),
            min,
            max,
            default_value,
            is_flag: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_color_index() {
        assert_eq!(voice_color_index("cl01"), Some(0));
        assert_eq!(voice_color_index("cl12"), Some(11));
        assert_eq!(voice_color_index("cl00"), Some(-1));
        assert_eq!(voice_color_index("cl-1"), Some(-2));
        assert_eq!(voice_color_index("cl"), None);
        assert_eq!(voice_color_index("clr"), None);
        assert_eq!(voice_color_index("dyn"), None);
    }

    #[test]
    fn test_voice_color_abbr() {
        assert_eq!(voice_color_abbr(0), "cl01");
        assert_eq!(voice_color_abbr(10), "cl11");
    }
}
