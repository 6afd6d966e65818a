//! In-process scanner simulator.
//!
//! Every device call is appended to a shared journal so flows can be asserted without
//! hardware. Failures are injected through [`MockConfig::failures`].

use crate::{
    CapturingMode, CapturingSettings, ConnectTarget, DeviceError, DeviceFactory,
    ExperimentalSettings, Frame, FrameId, GroupGates, OptionalField, PointCloud,
    ProcessingSettings, Resolution, Result, ScannerDevice, SettingGroup, Texture, Timeout,
    TriggerMode,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use tracing::{debug, warn};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockFailures {
    pub read_groups: Vec<SettingGroup>,
    pub write_groups: Vec<SettingGroup>,
    pub enumerate_modes: bool,
    pub set_capturing_mode: bool,
    pub set_trigger_mode: bool,
    pub start_acquisition: bool,
    pub stop_acquisition: bool,
    /// `trigger_frame` returns -1.
    pub trigger_rejected: bool,
    /// `get_specific_frame` returns nothing.
    pub frame_missing: bool,
    /// Frames carry neither points nor texture.
    pub empty_frame: bool,
    /// Frames carry texture but an empty point cloud.
    pub no_point_cloud: bool,
    pub save_praw: bool,
    pub save_tif: bool,
}

/// Simulated scanner description, loadable from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Polls before the control service reports running; `None` never comes up.
    pub service_ready_after_polls: Option<u32>,
    /// Hardware ids that can be connected; empty accepts any id.
    pub known_devices: Vec<String>,
    pub device_type: String,
    pub supported_features: Vec<OptionalField>,
    pub capturing_modes: Vec<Resolution>,
    pub initial_trigger_mode: TriggerMode,
    pub initially_acquiring: bool,
    /// Stale frames sitting in the buffer at connect time.
    pub pending_frames: usize,
    pub closed_gates: Vec<SettingGroup>,
    /// Points generated per frame.
    pub point_count: usize,
    pub failures: MockFailures,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            service_ready_after_polls: Some(0),
            known_devices: Vec::new(),
            device_type: "PhoXi3DScanner".to_string(),
            supported_features: OptionalField::ALL.to_vec(),
            capturing_modes: vec![Resolution::new(2064, 1544), Resolution::new(1032, 772)],
            initial_trigger_mode: TriggerMode::Freerun,
            initially_acquiring: false,
            pending_frames: 0,
            closed_gates: Vec::new(),
            point_count: 16,
            failures: MockFailures::default(),
        }
    }
}

impl MockConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| DeviceError::InvalidValue {
            field: "MockConfig",
            value: e.to_string(),
        })
    }
}

/// One recorded device interaction.
#[derive(Clone, Debug, PartialEq)]
pub enum MockCall {
    ServicePoll,
    CreateAndConnect(String),
    ReadGroup(SettingGroup),
    WriteGroup(SettingGroup),
    SupportedModes,
    SetCapturingMode(Resolution),
    ReadTriggerMode,
    SetTriggerMode(TriggerMode),
    StartAcquisition,
    StopAcquisition,
    ClearBuffer,
    TriggerFrame,
    GetSpecificFrame(FrameId),
    GetFrame,
    SaveLastOutput(PathBuf),
    Disconnect { logout: bool },
}

impl MockCall {
    /// Calls that touch a connected device, as opposed to factory-level calls.
    pub fn is_device_call(&self) -> bool {
        !matches!(self, MockCall::ServicePoll | MockCall::CreateAndConnect(_))
    }
}

/// Observable device state after a run.
#[derive(Clone, Debug)]
pub struct MockState {
    pub config: MockConfig,
    pub journal: Vec<MockCall>,
    pub service_polls: u32,
    pub connected: bool,
    pub acquiring: bool,
    pub trigger_mode: TriggerMode,
    pub capturing_mode: CapturingMode,
    pub capturing: CapturingSettings,
    pub processing: ProcessingSettings,
    pub experimental: ExperimentalSettings,
    pub pending_frames: usize,
    pub next_frame_id: u32,
    pub last_frame: Option<Frame>,
}

impl MockState {
    fn new(config: MockConfig) -> Self {
        let resolution = config
            .capturing_modes
            .first()
            .copied()
            .unwrap_or(Resolution::new(2064, 1544));
        Self {
            acquiring: config.initially_acquiring,
            trigger_mode: config.initial_trigger_mode,
            pending_frames: config.pending_frames,
            capturing_mode: CapturingMode { resolution },
            capturing: CapturingSettings::default(),
            processing: ProcessingSettings::default(),
            experimental: ExperimentalSettings::default(),
            journal: Vec::new(),
            service_polls: 0,
            connected: false,
            next_frame_id: 0,
            last_frame: None,
            config,
        }
    }

    fn make_frame(&mut self) -> Frame {
        let id = FrameId::new(self.next_frame_id);
        self.next_frame_id += 1;
        let failures = &self.config.failures;
        let n = self.config.point_count;
        let (point_cloud, texture) = if failures.empty_frame {
            (None, None)
        } else {
            let points = if failures.no_point_cloud {
                Vec::new()
            } else {
                (0..n)
                    .map(|i| [i as f32, (i % 4) as f32, 1000.0 + i as f32])
                    .collect()
            };
            let texture = Texture {
                width: n as u32,
                height: 1,
                data: (0..n).map(|i| i as f32 / n.max(1) as f32).collect(),
            };
            (Some(PointCloud { points }), Some(texture))
        };
        Frame {
            id,
            resolution: self.capturing_mode.resolution,
            point_cloud,
            texture,
            ts: Some(OffsetDateTime::now_utc()),
        }
    }
}

fn lock(shared: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Factory handing out [`MockScanner`]s that share one simulated device.
#[derive(Clone)]
pub struct MockFactory {
    shared: Arc<Mutex<MockState>>,
}

impl MockFactory {
    pub fn new(config: MockConfig) -> Self {
        Self {
            shared: Arc::new(Mutex::new(MockState::new(config))),
        }
    }

    pub fn journal(&self) -> Vec<MockCall> {
        lock(&self.shared).journal.clone()
    }

    pub fn state(&self) -> MockState {
        lock(&self.shared).clone()
    }

    /// Mutate the simulated scanner mid-session, e.g. to inject a failure.
    pub fn state_mut<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut lock(&self.shared))
    }

    pub fn count(&self, call: &MockCall) -> usize {
        lock(&self.shared)
            .journal
            .iter()
            .filter(|c| *c == call)
            .count()
    }
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

impl DeviceFactory for MockFactory {
    type Device = MockScanner;

    fn is_control_service_running(&self) -> bool {
        let mut st = lock(&self.shared);
        st.journal.push(MockCall::ServicePoll);
        let polls = st.service_polls;
        st.service_polls += 1;
        match st.config.service_ready_after_polls {
            Some(after) => polls >= after,
            None => false,
        }
    }

    fn create_and_connect(&self, target: &ConnectTarget, _timeout: Timeout) -> Option<MockScanner> {
        let mut st = lock(&self.shared);
        st.journal
            .push(MockCall::CreateAndConnect(target.hardware_id.clone()));
        let known = &st.config.known_devices;
        if !known.is_empty() && !known.iter().any(|id| *id == target.hardware_id) {
            return None;
        }
        st.connected = true;
        Some(MockScanner {
            hardware_id: target.hardware_id.clone(),
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct MockScanner {
    hardware_id: String,
    shared: Arc<Mutex<MockState>>,
}

impl MockScanner {
    fn connected(&self, call: MockCall) -> Result<MutexGuard<'_, MockState>> {
        let mut st = lock(&self.shared);
        st.journal.push(call);
        if st.connected {
            Ok(st)
        } else {
            Err(DeviceError::NotConnected)
        }
    }
}

fn rejected(what: &str) -> DeviceError {
    warn!(call = what, "injected mock failure");
    DeviceError::Rejected(format!("{what} failed on mock device"))
}

impl ScannerDevice for MockScanner {
    fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    fn device_type(&self) -> String {
        lock(&self.shared).config.device_type.clone()
    }

    fn hardware_identification(&self) -> String {
        self.hardware_id.clone()
    }

    fn is_feature_supported(&self, qualified_name: &str) -> bool {
        lock(&self.shared)
            .config
            .supported_features
            .iter()
            .any(|f| f.qualified_name() == qualified_name)
    }

    fn group_gates(&self, group: SettingGroup) -> GroupGates {
        if lock(&self.shared).config.closed_gates.contains(&group) {
            GroupGates {
                enabled: false,
                can_get: true,
                can_set: false,
            }
        } else {
            GroupGates::OPEN
        }
    }

    fn capturing_settings(&mut self) -> Result<CapturingSettings> {
        let st = self.connected(MockCall::ReadGroup(SettingGroup::Capturing))?;
        if st.config.failures.read_groups.contains(&SettingGroup::Capturing) {
            return Err(rejected("CapturingSettings read"));
        }
        Ok(st.capturing.clone())
    }

    fn set_capturing_settings(&mut self, settings: &CapturingSettings) -> Result<()> {
        let mut st = self.connected(MockCall::WriteGroup(SettingGroup::Capturing))?;
        if st.config.failures.write_groups.contains(&SettingGroup::Capturing) {
            return Err(rejected("CapturingSettings write"));
        }
        st.capturing = settings.clone();
        Ok(())
    }

    fn processing_settings(&mut self) -> Result<ProcessingSettings> {
        let st = self.connected(MockCall::ReadGroup(SettingGroup::Processing))?;
        if st.config.failures.read_groups.contains(&SettingGroup::Processing) {
            return Err(rejected("ProcessingSettings read"));
        }
        Ok(st.processing.clone())
    }

    fn set_processing_settings(&mut self, settings: &ProcessingSettings) -> Result<()> {
        let mut st = self.connected(MockCall::WriteGroup(SettingGroup::Processing))?;
        if st.config.failures.write_groups.contains(&SettingGroup::Processing) {
            return Err(rejected("ProcessingSettings write"));
        }
        st.processing = settings.clone();
        Ok(())
    }

    fn experimental_settings(&mut self) -> Result<ExperimentalSettings> {
        let st = self.connected(MockCall::ReadGroup(SettingGroup::Experimental))?;
        if st.config.failures.read_groups.contains(&SettingGroup::Experimental) {
            return Err(rejected("ExperimentalSettings read"));
        }
        Ok(st.experimental.clone())
    }

    fn set_experimental_settings(&mut self, settings: &ExperimentalSettings) -> Result<()> {
        let mut st = self.connected(MockCall::WriteGroup(SettingGroup::Experimental))?;
        if st.config.failures.write_groups.contains(&SettingGroup::Experimental) {
            return Err(rejected("ExperimentalSettings write"));
        }
        st.experimental = settings.clone();
        Ok(())
    }

    fn supported_capturing_modes(&mut self) -> Result<Vec<CapturingMode>> {
        let st = self.connected(MockCall::SupportedModes)?;
        if st.config.failures.enumerate_modes {
            return Err(rejected("SupportedCapturingModes"));
        }
        Ok(st
            .config
            .capturing_modes
            .iter()
            .map(|r| CapturingMode { resolution: *r })
            .collect())
    }

    fn capturing_mode(&mut self) -> Result<CapturingMode> {
        let st = lock(&self.shared);
        if st.connected {
            Ok(st.capturing_mode)
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    fn set_capturing_mode(&mut self, mode: CapturingMode) -> Result<()> {
        let mut st = self.connected(MockCall::SetCapturingMode(mode.resolution))?;
        if st.config.failures.set_capturing_mode {
            return Err(rejected("CapturingMode"));
        }
        st.capturing_mode = mode;
        Ok(())
    }

    fn trigger_mode(&mut self) -> Result<TriggerMode> {
        let st = self.connected(MockCall::ReadTriggerMode)?;
        Ok(st.trigger_mode)
    }

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<()> {
        let mut st = self.connected(MockCall::SetTriggerMode(mode))?;
        if st.acquiring {
            return Err(DeviceError::Rejected(
                "trigger mode cannot change while acquiring".to_string(),
            ));
        }
        if st.config.failures.set_trigger_mode {
            return Err(rejected("TriggerMode"));
        }
        st.trigger_mode = mode;
        Ok(())
    }

    fn is_acquiring(&self) -> bool {
        let st = lock(&self.shared);
        st.connected && st.acquiring
    }

    fn start_acquisition(&mut self) -> Result<()> {
        let mut st = self.connected(MockCall::StartAcquisition)?;
        if st.config.failures.start_acquisition {
            return Err(rejected("StartAcquisition"));
        }
        st.acquiring = true;
        Ok(())
    }

    fn stop_acquisition(&mut self) -> Result<()> {
        let mut st = self.connected(MockCall::StopAcquisition)?;
        if st.config.failures.stop_acquisition {
            return Err(rejected("StopAcquisition"));
        }
        st.acquiring = false;
        Ok(())
    }

    fn clear_buffer(&mut self) -> usize {
        let mut st = lock(&self.shared);
        st.journal.push(MockCall::ClearBuffer);
        std::mem::take(&mut st.pending_frames)
    }

    fn trigger_frame(&mut self) -> i32 {
        let mut st = lock(&self.shared);
        st.journal.push(MockCall::TriggerFrame);
        let ready = st.connected
            && st.acquiring
            && st.trigger_mode == TriggerMode::Software
            && !st.config.failures.trigger_rejected;
        if !ready {
            debug!(
                acquiring = st.acquiring,
                mode = %st.trigger_mode,
                "mock trigger refused"
            );
            return -1;
        }
        let frame = st.make_frame();
        let raw = frame.id.raw() as i32;
        st.last_frame = Some(frame);
        raw
    }

    fn get_specific_frame(&mut self, id: FrameId, _timeout: Timeout) -> Option<Frame> {
        let mut st = lock(&self.shared);
        st.journal.push(MockCall::GetSpecificFrame(id));
        if st.config.failures.frame_missing {
            debug!(frame = %id, "mock frame withheld");
            return None;
        }
        st.last_frame.clone().filter(|f| f.id == id)
    }

    fn get_frame(&mut self, _timeout: Timeout) -> Option<Frame> {
        let mut st = lock(&self.shared);
        st.journal.push(MockCall::GetFrame);
        if !(st.connected && st.acquiring && st.trigger_mode == TriggerMode::Freerun) {
            return None;
        }
        let frame = st.make_frame();
        st.last_frame = Some(frame.clone());
        Some(frame)
    }

    fn save_last_output(&mut self, path: &Path, frame_id: Option<FrameId>) -> Result<()> {
        let st = self.connected(MockCall::SaveLastOutput(path.to_path_buf()))?;
        let frame = st
            .last_frame
            .as_ref()
            .filter(|f| frame_id.map_or(true, |id| f.id == id))
            .ok_or_else(|| DeviceError::Rejected("no frame to save".to_string()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let bytes = match ext.as_str() {
            "praw" => {
                if st.config.failures.save_praw {
                    return Err(rejected("praw save"));
                }
                let meta = serde_json::json!({
                    "frame_id": frame.id.raw(),
                    "resolution": frame.resolution,
                    "points": frame.point_cloud.as_ref().map_or(0, |pc| pc.points.len()),
                });
                meta.to_string().into_bytes()
            }
            "tif" | "tiff" => {
                if st.config.failures.save_tif {
                    return Err(rejected("tif save"));
                }
                frame
                    .texture
                    .as_ref()
                    .map(|t| t.data.iter().flat_map(|v| v.to_le_bytes()).collect())
                    .unwrap_or_default()
            }
            _ => return Err(DeviceError::Unsupported("output extension")),
        };
        std::fs::write(path, bytes).map_err(|e| DeviceError::Io(e.to_string()))
    }

    fn disconnect(&mut self, logout: bool) {
        let mut st = lock(&self.shared);
        st.journal.push(MockCall::Disconnect { logout });
        st.connected = false;
        st.acquiring = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_hardware_id_is_not_connected() {
        let factory = MockFactory::new(MockConfig {
            known_devices: vec!["1708011".to_string()],
            ..MockConfig::default()
        });
        let target = ConnectTarget::by_serial("InGaAsX-Y");
        assert!(factory.create_and_connect(&target, Timeout::Zero).is_none());
        let target = ConnectTarget::by_serial("1708011");
        assert!(factory.create_and_connect(&target, Timeout::Zero).is_some());
    }

    #[test]
    fn service_comes_up_after_configured_polls() {
        let factory = MockFactory::new(MockConfig {
            service_ready_after_polls: Some(2),
            ..MockConfig::default()
        });
        assert!(!factory.is_control_service_running());
        assert!(!factory.is_control_service_running());
        assert!(factory.is_control_service_running());
    }

    #[test]
    fn trigger_requires_software_mode_and_acquisition() {
        let factory = MockFactory::default();
        let mut dev = factory
            .create_and_connect(&ConnectTarget::by_serial("dev"), Timeout::Zero)
            .unwrap();
        assert_eq!(dev.trigger_frame(), -1);
        dev.set_trigger_mode(TriggerMode::Software).unwrap();
        dev.start_acquisition().unwrap();
        let id = dev.trigger_frame();
        assert_eq!(id, 0);
        let frame = dev
            .get_specific_frame(FrameId::from_raw(id).unwrap(), Timeout::Infinite)
            .unwrap();
        assert!(frame.has_point_cloud());
    }

    #[test]
    fn trigger_mode_change_is_refused_while_acquiring() {
        let factory = MockFactory::new(MockConfig {
            initially_acquiring: true,
            ..MockConfig::default()
        });
        let mut dev = factory
            .create_and_connect(&ConnectTarget::by_serial("dev"), Timeout::Zero)
            .unwrap();
        assert!(dev.set_trigger_mode(TriggerMode::Software).is_err());
    }

    #[test]
    fn config_parses_from_partial_json() {
        let cfg = MockConfig::from_json(
            r#"{"supported_features": ["LedPower"], "failures": {"save_tif": true}}"#,
        )
        .unwrap();
        assert_eq!(cfg.supported_features, vec![OptionalField::LedPower]);
        assert!(cfg.failures.save_tif);
        assert_eq!(cfg.capturing_modes.len(), 2);
    }

    #[test]
    fn injected_write_failure_is_rejected() {
        let factory = MockFactory::new(MockConfig {
            failures: MockFailures {
                write_groups: vec![SettingGroup::Processing],
                ..MockFailures::default()
            },
            ..MockConfig::default()
        });
        let mut dev = factory
            .create_and_connect(&ConnectTarget::by_serial("dev"), Timeout::Zero)
            .unwrap();
        let processing = dev.processing_settings().unwrap();
        let err = dev.set_processing_settings(&processing).unwrap_err();
        assert!(matches!(err, DeviceError::Rejected(msg) if msg.contains("ProcessingSettings")));
    }
}
