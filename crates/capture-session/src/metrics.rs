use crate::{SessionResult, Warning};
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

#[derive(Clone)]
pub struct SessionCounters {
    pub sessions_started: IntCounter,
    pub sessions_failed: IntCounter,
    pub frames_captured: IntCounter,
    pub settings_warnings: IntCounter,
    pub save_failures: IntCounter,
}

#[derive(Clone)]
pub struct SessionMetrics {
    pub registry: Registry,
    pub counters: SessionCounters,
}

impl SessionMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let counters = SessionCounters {
            sessions_started: IntCounter::new(
                "phoxi_sessions_started",
                "Capture sessions started",
            )?,
            sessions_failed: IntCounter::new(
                "phoxi_sessions_failed",
                "Capture sessions that ended with a fatal error",
            )?,
            frames_captured: IntCounter::new(
                "phoxi_frames_captured",
                "Frames retrieved from the device",
            )?,
            settings_warnings: IntCounter::new(
                "phoxi_settings_warnings",
                "Settings that could not be applied as requested",
            )?,
            save_failures: IntCounter::new(
                "phoxi_save_failures",
                "Output formats that were skipped or failed to save",
            )?,
        };
        registry.register(Box::new(counters.sessions_started.clone()))?;
        registry.register(Box::new(counters.sessions_failed.clone()))?;
        registry.register(Box::new(counters.frames_captured.clone()))?;
        registry.register(Box::new(counters.settings_warnings.clone()))?;
        registry.register(Box::new(counters.save_failures.clone()))?;
        Ok(Self { registry, counters })
    }

    /// Count one finished session. `frames` is 1 for a single-shot capture that got a frame.
    pub fn observe(&self, result: &SessionResult, frames: usize) {
        let c = &self.counters;
        c.sessions_started.inc();
        if !result.is_success() {
            c.sessions_failed.inc();
        }
        c.frames_captured.inc_by(frames as u64);
        for w in &result.warnings {
            match w {
                Warning::GroupGatesClosed { .. }
                | Warning::CapabilityUnavailable { .. }
                | Warning::InvalidResolutionIndex { .. }
                | Warning::GroupSkipped { .. } => c.settings_warnings.inc(),
                Warning::SaveSkipped { .. } | Warning::SaveFailed { .. } => c.save_failures.inc(),
                Warning::StopAcquisition { .. } => {}
            }
        }
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AcquisitionError, Error, OutputFormat};
    use phoxi_device::{FrameId, OptionalField};

    #[test]
    fn counts_failures_and_warning_kinds() {
        let metrics = SessionMetrics::new().unwrap();
        let mut ok = SessionResult::new(uuid::Uuid::new_v4());
        ok.frame_id = Some(FrameId::new(0));
        ok.warnings = vec![
            Warning::CapabilityUnavailable {
                field: OptionalField::LedPower,
            },
            Warning::SaveSkipped {
                format: OutputFormat::Ply,
                reason: "frame has no point cloud",
            },
        ];
        metrics.observe(&ok, 1);

        let mut failed = SessionResult::new(uuid::Uuid::new_v4());
        failed.error = Some(Error::Acquisition(AcquisitionError::TriggerRejected(-1)));
        metrics.observe(&failed, 0);

        let c = &metrics.counters;
        assert_eq!(c.sessions_started.get(), 2);
        assert_eq!(c.sessions_failed.get(), 1);
        assert_eq!(c.frames_captured.get(), 1);
        assert_eq!(c.settings_warnings.get(), 1);
        assert_eq!(c.save_failures.get(), 1);
        assert!(metrics.encode_text().contains("phoxi_sessions_failed 1"));
    }
}
