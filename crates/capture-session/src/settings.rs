//! Capability-negotiated application of the three setting groups.
//!
//! Each group is read from the device, patched field by field according to a rule table,
//! and written back in one call. Rules with a capability gate are only applied when the
//! connected device supports that field; otherwise the current value is kept and a
//! warning is recorded. Group gates (`enabled`, `can_get`, `can_set`) are advisory: the
//! device's own read/write result decides whether a failure is fatal.

use crate::warning::record;
use crate::{Error, Result, Warning};
use phoxi_device::{
    CapabilityRegistry, CapturingSettings, ExperimentalSettings, OptionalField,
    ProcessingSettings, ScannerDevice, SettingGroup,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Everything a capture asks of the device before triggering.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredSettings {
    pub capturing: CapturingSettings,
    /// Index into the device's supported capturing modes.
    pub resolution_index: usize,
    pub processing: ProcessingSettings,
    pub experimental: ExperimentalSettings,
}

struct FieldRule<S> {
    name: &'static str,
    gate: Option<OptionalField>,
    apply: fn(&mut S, &S),
}

trait GroupSnapshot: Sized + 'static {
    const GROUP: SettingGroup;
    const RULES: &'static [FieldRule<Self>];

    fn read<D: ScannerDevice + ?Sized>(device: &mut D) -> phoxi_device::Result<Self>;
    fn write<D: ScannerDevice + ?Sized>(device: &mut D, value: &Self) -> phoxi_device::Result<()>;
}

impl GroupSnapshot for CapturingSettings {
    const GROUP: SettingGroup = SettingGroup::Capturing;
    const RULES: &'static [FieldRule<Self>] = &[
        FieldRule {
            name: "ShutterMultiplier",
            gate: None,
            apply: |s, d| s.shutter_multiplier = d.shutter_multiplier,
        },
        FieldRule {
            name: "ScanMultiplier",
            gate: None,
            apply: |s, d| s.scan_multiplier = d.scan_multiplier,
        },
        FieldRule {
            name: "CameraOnlyMode",
            gate: None,
            apply: |s, d| s.camera_only_mode = d.camera_only_mode,
        },
        FieldRule {
            name: "AmbientLightSuppression",
            gate: None,
            apply: |s, d| s.ambient_light_suppression = d.ambient_light_suppression,
        },
        FieldRule {
            name: "CodingStrategy",
            gate: None,
            apply: |s, d| s.coding_strategy = d.coding_strategy,
        },
        FieldRule {
            name: "CodingQuality",
            gate: None,
            apply: |s, d| s.coding_quality = d.coding_quality,
        },
        FieldRule {
            name: "TextureSource",
            gate: None,
            apply: |s, d| s.texture_source = d.texture_source,
        },
        FieldRule {
            name: "SinglePatternExposure",
            gate: None,
            apply: |s, d| s.single_pattern_exposure = d.single_pattern_exposure,
        },
        FieldRule {
            name: "MaximumFPS",
            gate: None,
            apply: |s, d| s.maximum_fps = d.maximum_fps,
        },
        FieldRule {
            name: "LaserPower",
            gate: None,
            apply: |s, d| s.laser_power = d.laser_power,
        },
        FieldRule {
            name: "ProjectionOffsetLeft",
            gate: Some(OptionalField::ProjectionOffsetLeft),
            apply: |s, d| s.projection_offset_left = d.projection_offset_left,
        },
        FieldRule {
            name: "ProjectionOffsetRight",
            gate: Some(OptionalField::ProjectionOffsetRight),
            apply: |s, d| s.projection_offset_right = d.projection_offset_right,
        },
        FieldRule {
            name: "LedPower",
            gate: Some(OptionalField::LedPower),
            apply: |s, d| s.led_power = d.led_power,
        },
    ];

    fn read<D: ScannerDevice + ?Sized>(device: &mut D) -> phoxi_device::Result<Self> {
        device.capturing_settings()
    }

    fn write<D: ScannerDevice + ?Sized>(device: &mut D, value: &Self) -> phoxi_device::Result<()> {
        device.set_capturing_settings(value)
    }
}

impl GroupSnapshot for ProcessingSettings {
    const GROUP: SettingGroup = SettingGroup::Processing;
    const RULES: &'static [FieldRule<Self>] = &[
        FieldRule {
            name: "Confidence",
            gate: None,
            apply: |s, d| s.confidence = d.confidence,
        },
        FieldRule {
            name: "SurfaceSmoothness",
            gate: None,
            apply: |s, d| s.surface_smoothness = d.surface_smoothness,
        },
        FieldRule {
            name: "NormalsEstimationRadius",
            gate: None,
            apply: |s, d| s.normals_estimation_radius = d.normals_estimation_radius,
        },
        FieldRule {
            name: "InterreflectionsFiltering",
            gate: Some(OptionalField::InterreflectionsFiltering),
            apply: |s, d| s.interreflections_filtering = d.interreflections_filtering,
        },
    ];

    fn read<D: ScannerDevice + ?Sized>(device: &mut D) -> phoxi_device::Result<Self> {
        device.processing_settings()
    }

    fn write<D: ScannerDevice + ?Sized>(device: &mut D, value: &Self) -> phoxi_device::Result<()> {
        device.set_processing_settings(value)
    }
}

impl GroupSnapshot for ExperimentalSettings {
    const GROUP: SettingGroup = SettingGroup::Experimental;
    const RULES: &'static [FieldRule<Self>] = &[
        FieldRule {
            name: "AmbientLightSuppressionCompatibilityMode",
            gate: Some(OptionalField::AmbientLightSuppressionCompatibilityMode),
            apply: |s, d| {
                s.ambient_light_suppression_compatibility_mode =
                    d.ambient_light_suppression_compatibility_mode
            },
        },
        FieldRule {
            name: "PatternDecompositionReach",
            gate: Some(OptionalField::PatternDecompositionReach),
            apply: |s, d| s.pattern_decomposition_reach = d.pattern_decomposition_reach,
        },
        FieldRule {
            name: "SignalContrastThreshold",
            gate: Some(OptionalField::SignalContrastThreshold),
            apply: |s, d| s.signal_contrast_threshold = d.signal_contrast_threshold,
        },
        FieldRule {
            name: "UseExtendedLogging",
            gate: Some(OptionalField::UseExtendedLogging),
            apply: |s, d| s.use_extended_logging = d.use_extended_logging,
        },
    ];

    fn read<D: ScannerDevice + ?Sized>(device: &mut D) -> phoxi_device::Result<Self> {
        device.experimental_settings()
    }

    fn write<D: ScannerDevice + ?Sized>(device: &mut D, value: &Self) -> phoxi_device::Result<()> {
        device.set_experimental_settings(value)
    }
}

/// Apply all three groups plus the capturing mode.
///
/// Returns an error only for failures in the Capturing or Processing group (including
/// enumerating or selecting the capturing mode). Everything else lands in `warnings`.
pub fn apply<D: ScannerDevice + ?Sized>(
    device: &mut D,
    capabilities: &CapabilityRegistry,
    desired: &DesiredSettings,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    apply_group(device, capabilities, &desired.capturing, warnings)?;
    apply_capturing_mode(device, desired.resolution_index, warnings)?;
    apply_group(device, capabilities, &desired.processing, warnings)?;
    apply_group(device, capabilities, &desired.experimental, warnings)?;
    info!("settings applied");
    Ok(())
}

fn apply_group<S: GroupSnapshot, D: ScannerDevice + ?Sized>(
    device: &mut D,
    capabilities: &CapabilityRegistry,
    desired: &S,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    let group = S::GROUP;
    let gates = device.group_gates(group);
    if !gates.all_open() {
        record(warnings, Warning::GroupGatesClosed { group, gates });
    }

    let mut snapshot = match S::read(device) {
        Ok(current) => current,
        Err(e) => return group_failure(group, e, warnings),
    };

    for rule in S::RULES {
        match rule.gate {
            Some(field) if !capabilities.supports(field) => {
                record(warnings, Warning::CapabilityUnavailable { field });
            }
            _ => {
                (rule.apply)(&mut snapshot, desired);
                debug!(group = %group, field = rule.name, "field staged");
            }
        }
    }

    match S::write(device, &snapshot) {
        Ok(()) => {
            debug!(group = %group, "group written");
            Ok(())
        }
        Err(e) => group_failure(group, e, warnings),
    }
}

fn group_failure(
    group: SettingGroup,
    source: phoxi_device::DeviceError,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    if group.is_mandatory() {
        return Err(Error::SettingsApply { group, source });
    }
    record(
        warnings,
        Warning::GroupSkipped {
            group,
            message: source.to_string(),
        },
    );
    Ok(())
}

fn apply_capturing_mode<D: ScannerDevice + ?Sized>(
    device: &mut D,
    index: usize,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    let as_fatal = |source| Error::SettingsApply {
        group: SettingGroup::Capturing,
        source,
    };
    let modes = device.supported_capturing_modes().map_err(as_fatal)?;
    match modes.get(index) {
        Some(mode) => {
            device.set_capturing_mode(*mode).map_err(as_fatal)?;
            info!(index, resolution = %mode.resolution, "capturing mode selected");
        }
        None => record(
            warnings,
            Warning::InvalidResolutionIndex {
                requested: index,
                available: modes.len(),
            },
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoxi_device::{
        CodingStrategy, ConnectTarget, DeviceFactory, MockCall, MockConfig, MockFactory,
        MockFailures, PatternDecompositionReach, Resolution, Timeout,
    };

    fn desired() -> DesiredSettings {
        let mut d = DesiredSettings::default();
        d.capturing.shutter_multiplier = 3;
        d.capturing.coding_strategy = CodingStrategy::Normal;
        d.capturing.projection_offset_left = 40;
        d.capturing.led_power = 1000;
        d.processing.interreflections_filtering = true;
        d.processing.normals_estimation_radius = 4;
        d.experimental.pattern_decomposition_reach = PatternDecompositionReach::Large;
        d.experimental.signal_contrast_threshold = 0.1;
        d
    }

    fn run(config: MockConfig, desired: &DesiredSettings) -> (MockFactory, Result<()>, Vec<Warning>) {
        let factory = MockFactory::new(config);
        let mut dev = factory
            .create_and_connect(&ConnectTarget::by_serial("dev"), Timeout::Zero)
            .unwrap();
        let caps = CapabilityRegistry::probe(&dev);
        let mut warnings = Vec::new();
        let res = apply(&mut dev, &caps, desired, &mut warnings);
        (factory, res, warnings)
    }

    #[test]
    fn fully_capable_device_takes_every_field() {
        let (factory, res, warnings) = run(MockConfig::default(), &desired());
        res.unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
        let st = factory.state();
        assert_eq!(st.capturing, desired().capturing);
        assert_eq!(st.processing, desired().processing);
        assert_eq!(st.experimental, desired().experimental);
    }

    #[test]
    fn unsupported_optional_fields_keep_current_values() {
        let config = MockConfig {
            supported_features: vec![OptionalField::LedPower],
            ..MockConfig::default()
        };
        let (factory, res, warnings) = run(config, &desired());
        res.unwrap();
        let st = factory.state();
        assert_eq!(st.capturing.shutter_multiplier, 3);
        assert_eq!(st.capturing.led_power, 1000);
        assert_eq!(st.capturing.projection_offset_left, 0);
        assert!(!st.processing.interreflections_filtering);
        assert_eq!(st.processing.normals_estimation_radius, 4);
        assert_eq!(st.experimental, ExperimentalSettings::default());

        let skipped: Vec<_> = warnings
            .iter()
            .filter_map(|w| match w {
                Warning::CapabilityUnavailable { field } => Some(*field),
                _ => None,
            })
            .collect();
        assert_eq!(skipped.len(), OptionalField::ALL.len() - 1);
        assert!(!skipped.contains(&OptionalField::LedPower));
    }

    #[test]
    fn out_of_range_resolution_index_is_a_warning() {
        let config = MockConfig {
            capturing_modes: vec![Resolution::new(2064, 1544), Resolution::new(1032, 772)],
            ..MockConfig::default()
        };
        let mut d = desired();
        d.resolution_index = 5;
        let (factory, res, warnings) = run(config, &d);
        res.unwrap();
        assert!(warnings.contains(&Warning::InvalidResolutionIndex {
            requested: 5,
            available: 2
        }));
        assert_eq!(
            factory.state().capturing_mode.resolution,
            Resolution::new(2064, 1544)
        );
        assert_eq!(
            factory
                .journal()
                .iter()
                .filter(|c| matches!(c, MockCall::SetCapturingMode(_)))
                .count(),
            0
        );
    }

    #[test]
    fn valid_resolution_index_selects_mode() {
        let mut d = desired();
        d.resolution_index = 1;
        let (factory, res, _) = run(MockConfig::default(), &d);
        res.unwrap();
        assert_eq!(
            factory.state().capturing_mode.resolution,
            Resolution::new(1032, 772)
        );
    }

    #[test]
    fn mandatory_group_write_failure_is_fatal() {
        let config = MockConfig {
            failures: MockFailures {
                write_groups: vec![SettingGroup::Processing],
                ..MockFailures::default()
            },
            ..MockConfig::default()
        };
        let (factory, res, _) = run(config, &desired());
        assert!(matches!(
            res,
            Err(Error::SettingsApply {
                group: SettingGroup::Processing,
                ..
            })
        ));
        assert_eq!(
            factory.count(&MockCall::ReadGroup(SettingGroup::Experimental)),
            0
        );
    }

    #[test]
    fn experimental_write_failure_is_only_a_warning() {
        let config = MockConfig {
            failures: MockFailures {
                write_groups: vec![SettingGroup::Experimental],
                ..MockFailures::default()
            },
            ..MockConfig::default()
        };
        let (_, res, warnings) = run(config, &desired());
        res.unwrap();
        assert!(warnings.iter().any(|w| matches!(
            w,
            Warning::GroupSkipped {
                group: SettingGroup::Experimental,
                ..
            }
        )));
    }

    #[test]
    fn closed_gates_warn_but_still_write() {
        let config = MockConfig {
            closed_gates: vec![SettingGroup::Capturing],
            ..MockConfig::default()
        };
        let (factory, res, warnings) = run(config, &desired());
        res.unwrap();
        assert!(matches!(
            warnings.first(),
            Some(Warning::GroupGatesClosed {
                group: SettingGroup::Capturing,
                ..
            })
        ));
        assert_eq!(factory.count(&MockCall::WriteGroup(SettingGroup::Capturing)), 1);
    }

    #[test]
    fn failing_mode_enumeration_is_fatal() {
        let config = MockConfig {
            failures: MockFailures {
                enumerate_modes: true,
                ..MockFailures::default()
            },
            ..MockConfig::default()
        };
        let (_, res, _) = run(config, &desired());
        assert!(matches!(
            res,
            Err(Error::SettingsApply {
                group: SettingGroup::Capturing,
                ..
            })
        ));
    }
}
