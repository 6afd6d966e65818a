//! Setting group snapshots and the string-valued enums they carry.

use crate::DeviceError;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

macro_rules! value_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DeviceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| DeviceError::InvalidValue {
                        field: stringify!($name),
                        value: s.to_string(),
                    })
            }
        }

        impl TryFrom<String> for $name {
            type Error = DeviceError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.as_str().to_string()
            }
        }
    };
}

value_enum!(
    /// Structured-light pattern coding.
    CodingStrategy {
        Normal => "Normal",
        Interreflections => "Interreflections",
    }
);

value_enum!(CodingQuality {
    Fast => "Fast",
    High => "High",
    Ultra => "Ultra",
});

value_enum!(TextureSource {
    Computed => "Computed",
    Led => "LED",
    Laser => "Laser",
    Focus => "Focus",
    Color => "Color",
});

value_enum!(SurfaceSmoothness {
    Sharp => "Sharp",
    Normal => "Normal",
    Smooth => "Smooth",
});

value_enum!(PatternDecompositionReach {
    Local => "Local",
    Small => "Small",
    Medium => "Medium",
    Large => "Large",
});

/// Sensor exposure and timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapturingSettings {
    pub shutter_multiplier: i32,
    pub scan_multiplier: i32,
    pub camera_only_mode: bool,
    pub ambient_light_suppression: bool,
    pub coding_strategy: CodingStrategy,
    pub coding_quality: CodingQuality,
    pub texture_source: TextureSource,
    pub single_pattern_exposure: f64,
    pub maximum_fps: f64,
    pub laser_power: i32,
    pub projection_offset_left: i32,
    pub projection_offset_right: i32,
    pub led_power: i32,
}

impl Default for CapturingSettings {
    fn default() -> Self {
        Self {
            shutter_multiplier: 1,
            scan_multiplier: 1,
            camera_only_mode: false,
            ambient_light_suppression: false,
            coding_strategy: CodingStrategy::Interreflections,
            coding_quality: CodingQuality::High,
            texture_source: TextureSource::Led,
            single_pattern_exposure: 10.24,
            maximum_fps: 0.0,
            laser_power: 4095,
            projection_offset_left: 0,
            projection_offset_right: 0,
            led_power: 4095,
        }
    }
}

/// Point-cloud processing quality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Maximum inaccuracy accepted for a reconstructed point.
    pub confidence: f64,
    pub surface_smoothness: SurfaceSmoothness,
    pub normals_estimation_radius: i32,
    pub interreflections_filtering: bool,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            confidence: 2.0,
            surface_smoothness: SurfaceSmoothness::Normal,
            normals_estimation_radius: 2,
            interreflections_filtering: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalSettings {
    pub ambient_light_suppression_compatibility_mode: bool,
    pub pattern_decomposition_reach: PatternDecompositionReach,
    pub signal_contrast_threshold: f64,
    pub use_extended_logging: bool,
}

impl Default for ExperimentalSettings {
    fn default() -> Self {
        Self {
            ambient_light_suppression_compatibility_mode: false,
            pattern_decomposition_reach: PatternDecompositionReach::Local,
            signal_contrast_threshold: 0.032,
            use_extended_logging: false,
        }
    }
}
