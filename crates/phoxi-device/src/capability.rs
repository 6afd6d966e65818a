use crate::{ScannerDevice, SettingGroup};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Settings that not every device model supports and that must be checked before writing.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionalField {
    ProjectionOffsetLeft,
    ProjectionOffsetRight,
    LedPower,
    InterreflectionsFiltering,
    AmbientLightSuppressionCompatibilityMode,
    PatternDecompositionReach,
    SignalContrastThreshold,
    UseExtendedLogging,
}

impl OptionalField {
    pub const ALL: [OptionalField; 8] = [
        OptionalField::ProjectionOffsetLeft,
        OptionalField::ProjectionOffsetRight,
        OptionalField::LedPower,
        OptionalField::InterreflectionsFiltering,
        OptionalField::AmbientLightSuppressionCompatibilityMode,
        OptionalField::PatternDecompositionReach,
        OptionalField::SignalContrastThreshold,
        OptionalField::UseExtendedLogging,
    ];

    pub fn group(&self) -> SettingGroup {
        match self {
            OptionalField::ProjectionOffsetLeft
            | OptionalField::ProjectionOffsetRight
            | OptionalField::LedPower => SettingGroup::Capturing,
            OptionalField::InterreflectionsFiltering => SettingGroup::Processing,
            OptionalField::AmbientLightSuppressionCompatibilityMode
            | OptionalField::PatternDecompositionReach
            | OptionalField::SignalContrastThreshold
            | OptionalField::UseExtendedLogging => SettingGroup::Experimental,
        }
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            OptionalField::ProjectionOffsetLeft => "ProjectionOffsetLeft",
            OptionalField::ProjectionOffsetRight => "ProjectionOffsetRight",
            OptionalField::LedPower => "LedPower",
            OptionalField::InterreflectionsFiltering => "InterreflectionsFiltering",
            OptionalField::AmbientLightSuppressionCompatibilityMode => {
                "AmbientLightSuppressionCompatibilityMode"
            }
            OptionalField::PatternDecompositionReach => "PatternDecompositionReach",
            OptionalField::SignalContrastThreshold => "SignalContrastThreshold",
            OptionalField::UseExtendedLogging => "UseExtendedLogging",
        }
    }

    /// Name the vendor feature query expects, e.g. `CapturingSettings.LedPower`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.group().as_str(), self.field_name())
    }
}

impl fmt::Display for OptionalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group().as_str(), self.field_name())
    }
}

/// Support flags for every [`OptionalField`], fixed for the lifetime of a connection.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CapabilityRegistry {
    flags: BTreeMap<OptionalField, bool>,
}

impl CapabilityRegistry {
    /// Query the device once for each known optional field.
    pub fn probe<D: ScannerDevice + ?Sized>(device: &D) -> Self {
        let flags = OptionalField::ALL
            .iter()
            .map(|field| (*field, device.is_feature_supported(&field.qualified_name())))
            .collect();
        Self { flags }
    }

    pub fn from_supported(supported: impl IntoIterator<Item = OptionalField>) -> Self {
        let mut flags: BTreeMap<OptionalField, bool> =
            OptionalField::ALL.iter().map(|f| (*f, false)).collect();
        for field in supported {
            flags.insert(field, true);
        }
        Self { flags }
    }

    pub fn supports(&self, field: OptionalField) -> bool {
        self.flags.get(&field).copied().unwrap_or(false)
    }

    pub fn unsupported(&self) -> impl Iterator<Item = OptionalField> + '_ {
        self.flags
            .iter()
            .filter(|(_, supported)| !**supported)
            .map(|(field, _)| *field)
    }
}
