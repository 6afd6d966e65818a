use crate::{
    CapturingMode, CapturingSettings, ConnectTarget, ExperimentalSettings, Frame, FrameId,
    GroupGates, ProcessingSettings, Result, SettingGroup, Timeout, TriggerMode,
};
use std::path::Path;

/// Entry point into the vendor control service.
pub trait DeviceFactory {
    type Device: ScannerDevice;

    /// Whether the control service brokering device access is up.
    fn is_control_service_running(&self) -> bool;

    /// Resolve and open one device. `None` when no such device could be connected.
    fn create_and_connect(&self, target: &ConnectTarget, timeout: Timeout) -> Option<Self::Device>;
}

/// A connected structured-light scanner. All calls block.
pub trait ScannerDevice {
    fn is_connected(&self) -> bool;

    /// Model string, e.g. "PhoXi3DScanner".
    fn device_type(&self) -> String;

    fn hardware_identification(&self) -> String;

    /// Vendor feature query keyed by `Group.Field`.
    fn is_feature_supported(&self, qualified_name: &str) -> bool;

    fn group_gates(&self, group: SettingGroup) -> GroupGates;

    fn capturing_settings(&mut self) -> Result<CapturingSettings>;
    fn set_capturing_settings(&mut self, settings: &CapturingSettings) -> Result<()>;

    fn processing_settings(&mut self) -> Result<ProcessingSettings>;
    fn set_processing_settings(&mut self, settings: &ProcessingSettings) -> Result<()>;

    fn experimental_settings(&mut self) -> Result<ExperimentalSettings>;
    fn set_experimental_settings(&mut self, settings: &ExperimentalSettings) -> Result<()>;

    fn supported_capturing_modes(&mut self) -> Result<Vec<CapturingMode>>;
    fn capturing_mode(&mut self) -> Result<CapturingMode>;
    fn set_capturing_mode(&mut self, mode: CapturingMode) -> Result<()>;

    fn trigger_mode(&mut self) -> Result<TriggerMode>;
    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<()>;

    fn is_acquiring(&self) -> bool;
    fn start_acquisition(&mut self) -> Result<()>;
    fn stop_acquisition(&mut self) -> Result<()>;

    /// Drop frames waiting in the device buffer, returning how many were discarded.
    fn clear_buffer(&mut self) -> usize;

    /// Request one frame in software trigger mode. Negative ids signal rejection.
    fn trigger_frame(&mut self) -> i32;

    fn get_specific_frame(&mut self, id: FrameId, timeout: Timeout) -> Option<Frame>;

    /// Next frame in arrival order, used while streaming.
    fn get_frame(&mut self, timeout: Timeout) -> Option<Frame>;

    /// Serialize the given (or most recent) frame in the format implied by the extension.
    fn save_last_output(&mut self, path: &Path, frame_id: Option<FrameId>) -> Result<()>;

    fn disconnect(&mut self, logout: bool);
}
