//! The session value: owns one device handle from connect to teardown.

use crate::{
    acquisition, capture, connect, gate, persist, settings, trigger, AcquisitionError, CancelFlag,
    DesiredSettings, Error, FrameHandle, GatePolicy, OutputFormat, OutputRequest, Result,
    Warning,
};
use core::fmt;
use phoxi_device::{
    CapabilityRegistry, ConnectTarget, DeviceFactory, FrameId, Resolution, ScannerDevice,
    Timeout, TriggerMode,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum SessionState {
    Disconnected,
    Connected,
    Configured,
    Acquiring,
    FrameReady,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::Configured => "configured",
            SessionState::Acquiring => "acquiring",
            SessionState::FrameReady => "frame-ready",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionOptions {
    pub gate: GatePolicy,
    pub connect_timeout: Timeout,
    pub frame_timeout: Timeout,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            gate: GatePolicy::default(),
            connect_timeout: Timeout::Zero,
            frame_timeout: Timeout::Bounded(Duration::from_secs(10)),
        }
    }
}

/// Inputs of one single-shot capture.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturePlan {
    pub target: ConnectTarget,
    pub scene: String,
    pub settings: DesiredSettings,
    pub outputs: Vec<OutputRequest>,
}

#[derive(Debug)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub frame_id: Option<FrameId>,
    pub saved: Vec<OutputFormat>,
    pub warnings: Vec<Warning>,
    pub error: Option<Error>,
}

impl SessionResult {
    pub(crate) fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            frame_id: None,
            saved: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// What `connect` learns about a device.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub session_id: Uuid,
    pub hardware_id: String,
    pub device_type: String,
    pub capturing_modes: Vec<Resolution>,
    pub trigger_mode: Option<TriggerMode>,
    pub acquiring: bool,
    pub unsupported_features: Vec<String>,
}

/// One device, one logical thread, explicit states.
///
/// Teardown runs exactly once: either through [`Session::teardown`] or from `Drop` when a
/// caller unwinds without calling it.
pub struct Session<D: ScannerDevice> {
    id: Uuid,
    target: ConnectTarget,
    device: Option<D>,
    state: SessionState,
    capabilities: CapabilityRegistry,
    warnings: Vec<Warning>,
    current_frame: Option<FrameId>,
    torn_down: bool,
}

impl<D: ScannerDevice> Session<D> {
    pub fn new(target: ConnectTarget) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            device: None,
            state: SessionState::Disconnected,
            capabilities: CapabilityRegistry::default(),
            warnings: Vec::new(),
            current_frame: None,
            torn_down: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &ConnectTarget {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    fn require(&self, expected: &'static str, allowed: &[SessionState]) -> Result<()> {
        if self.torn_down || !allowed.contains(&self.state) {
            return Err(Error::InvalidState {
                expected,
                found: self.state,
            });
        }
        Ok(())
    }

    /// Device plus warning sink, borrowed together.
    fn parts(&mut self, expected: &'static str) -> Result<(&mut D, &mut Vec<Warning>)> {
        match self.device.as_mut() {
            Some(device) => Ok((device, &mut self.warnings)),
            None => Err(Error::InvalidState {
                expected,
                found: self.state,
            }),
        }
    }

    pub fn connect<F>(&mut self, factory: &F, timeout: Timeout) -> Result<()>
    where
        F: DeviceFactory<Device = D> + ?Sized,
    {
        self.require("a disconnected", &[SessionState::Disconnected])?;
        let device = connect::connect(factory, &self.target, timeout)?;
        self.capabilities = CapabilityRegistry::probe(&device);
        for field in self.capabilities.unsupported() {
            info!(field = %field, "optional field not supported by device");
        }
        self.device = Some(device);
        self.state = SessionState::Connected;
        Ok(())
    }

    pub fn configure(&mut self, desired: &DesiredSettings) -> Result<()> {
        self.require(
            "a connected",
            &[SessionState::Connected, SessionState::Configured],
        )?;
        let capabilities = self.capabilities.clone();
        let (device, warnings) = self.parts("a connected")?;
        settings::apply(device, &capabilities, desired, warnings)?;
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Switch trigger mode, start acquisition and drop stale buffered frames.
    ///
    /// Returns how many frames were cleared.
    pub fn begin_acquisition(&mut self, mode: TriggerMode) -> Result<usize> {
        self.require("a configured", &[SessionState::Configured])?;
        let (device, warnings) = self.parts("a configured")?;
        trigger::ensure_mode(device, mode, warnings)?;
        acquisition::start(device)?;
        let cleared = acquisition::clear_buffer(device);
        self.state = SessionState::Acquiring;
        Ok(cleared)
    }

    /// Trigger one frame. Any handle from an earlier trigger stops being current first.
    pub fn capture(&mut self, wait: Timeout) -> Result<FrameHandle> {
        self.require(
            "an acquiring",
            &[SessionState::Acquiring, SessionState::FrameReady],
        )?;
        self.current_frame = None;
        self.state = SessionState::Acquiring;
        let (device, _) = self.parts("an acquiring")?;
        let handle = capture::capture_one(device, wait)?;
        self.current_frame = Some(handle.id());
        self.state = SessionState::FrameReady;
        Ok(handle)
    }

    /// Pull the next frame produced in freerun mode.
    ///
    /// `Ok(None)` means nothing usable arrived within `wait`; empty frames are dropped.
    pub fn next_streamed_frame(&mut self, wait: Timeout) -> Result<Option<FrameHandle>> {
        self.require(
            "an acquiring",
            &[SessionState::Acquiring, SessionState::FrameReady],
        )?;
        self.current_frame = None;
        self.state = SessionState::Acquiring;
        let (device, _) = self.parts("an acquiring")?;
        let Some(frame) = device.get_frame(wait) else {
            debug!("no frame within timeout");
            return Ok(None);
        };
        if frame.is_empty() {
            debug!(frame = %frame.id, "dropping empty streamed frame");
            return Ok(None);
        }
        let handle = FrameHandle::new(frame);
        self.current_frame = Some(handle.id());
        self.state = SessionState::FrameReady;
        Ok(Some(handle))
    }

    pub fn is_current(&self, frame: &FrameHandle) -> bool {
        self.current_frame == Some(frame.id())
    }

    /// Save `frame` in every enabled format; only the current frame may be saved.
    ///
    /// This is the only way to write outputs from outside the crate:
    ///
    /// ```compile_fail
    /// use capture_session::persist::save;
    /// ```
    pub fn persist(
        &mut self,
        frame: &FrameHandle,
        scene: &str,
        requests: &[OutputRequest],
    ) -> Result<Vec<OutputFormat>> {
        if !self.is_current(frame) {
            return Err(AcquisitionError::StaleFrame { stale: frame.id() }.into());
        }
        self.require("a frame-ready", &[SessionState::FrameReady])?;
        let (device, warnings) = self.parts("a frame-ready")?;
        let outcome = persist::save(device, frame, scene, requests);
        warnings.extend(outcome.warnings);
        Ok(outcome.saved)
    }

    /// Stop acquisition if it is running; unlike teardown a failure here is fatal.
    pub fn stop_acquisition(&mut self) -> Result<()> {
        self.require(
            "a connected",
            &[
                SessionState::Connected,
                SessionState::Configured,
                SessionState::Acquiring,
                SessionState::FrameReady,
            ],
        )?;
        let (device, _) = self.parts("a connected")?;
        if device.is_acquiring() {
            device.stop_acquisition().map_err(AcquisitionError::Stop)?;
            info!("acquisition stopped");
        } else {
            info!("device was not acquiring");
        }
        self.current_frame = None;
        if matches!(
            self.state,
            SessionState::Acquiring | SessionState::FrameReady
        ) {
            self.state = SessionState::Configured;
        }
        Ok(())
    }

    /// Stop and disconnect. Safe to call more than once and on sessions that never connected.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.current_frame = None;
        if let Some(mut device) = self.device.take() {
            acquisition::stop(&mut device, &mut self.warnings);
            if device.is_connected() {
                device.disconnect(true);
                info!("device disconnected");
            }
        }
        self.state = SessionState::Disconnected;
    }

    pub(crate) fn device_mut(&mut self, expected: &'static str) -> Result<&mut D> {
        self.parts(expected).map(|(device, _)| device)
    }
}

impl<D: ScannerDevice> Drop for Session<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<D: ScannerDevice> fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("state", &self.state)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

/// Finish a run: tear down, collect warnings, log the outcome.
pub(crate) fn finish<D: ScannerDevice>(
    mut session: Session<D>,
    mut result: SessionResult,
    outcome: Result<()>,
) -> SessionResult {
    session.teardown();
    result.warnings = session.take_warnings();
    if let Err(e) = outcome {
        error!(error = %e, "session failed");
        result.error = Some(e);
    } else {
        info!(warnings = result.warnings.len(), "session finished");
    }
    result
}

/// Gate, connect, configure, trigger one frame in software mode and save it.
pub fn run_capture<F: DeviceFactory>(
    factory: &F,
    plan: &CapturePlan,
    options: &SessionOptions,
    cancel: &CancelFlag,
) -> SessionResult {
    let mut session = Session::<F::Device>::new(plan.target.clone());
    let span = info_span!("session", id = %session.id(), hardware_id = %plan.target.hardware_id);
    let _guard = span.enter();
    let mut result = SessionResult::new(session.id());

    let outcome = drive_capture(factory, plan, options, cancel, &mut session, &mut result);
    finish(session, result, outcome)
}

fn drive_capture<F: DeviceFactory>(
    factory: &F,
    plan: &CapturePlan,
    options: &SessionOptions,
    cancel: &CancelFlag,
    session: &mut Session<F::Device>,
    result: &mut SessionResult,
) -> Result<()> {
    gate::await_ready(factory, &options.gate, cancel)?;
    session.connect(factory, options.connect_timeout)?;
    cancel.checkpoint()?;
    session.configure(&plan.settings)?;
    cancel.checkpoint()?;
    session.begin_acquisition(TriggerMode::Software)?;
    cancel.checkpoint()?;
    let frame = session.capture(options.frame_timeout)?;
    result.frame_id = Some(frame.id());
    cancel.checkpoint()?;
    result.saved = session.persist(&frame, &plan.scene, &plan.outputs)?;
    Ok(())
}

/// Connect and stop a running acquisition.
pub fn run_stop<F: DeviceFactory>(
    factory: &F,
    target: &ConnectTarget,
    options: &SessionOptions,
    cancel: &CancelFlag,
) -> SessionResult {
    let mut session = Session::<F::Device>::new(target.clone());
    let span = info_span!("session", id = %session.id(), hardware_id = %target.hardware_id);
    let _guard = span.enter();
    let result = SessionResult::new(session.id());

    let outcome = gate::await_ready(factory, &options.gate, cancel)
        .and_then(|()| session.connect(factory, options.connect_timeout))
        .and_then(|()| cancel.checkpoint())
        .and_then(|()| session.stop_acquisition());
    finish(session, result, outcome)
}

/// Connect, describe the device and disconnect again.
pub fn run_connect<F: DeviceFactory>(
    factory: &F,
    target: &ConnectTarget,
    options: &SessionOptions,
    cancel: &CancelFlag,
) -> Result<DeviceSummary> {
    let mut session = Session::<F::Device>::new(target.clone());
    let span = info_span!("session", id = %session.id(), hardware_id = %target.hardware_id);
    let _guard = span.enter();

    gate::await_ready(factory, &options.gate, cancel)?;
    session.connect(factory, options.connect_timeout)?;
    cancel.checkpoint()?;
    let session_id = session.id();
    let unsupported_features = session
        .capabilities()
        .unsupported()
        .map(|f| f.qualified_name())
        .collect();
    let device = session.device_mut("a connected")?;
    let capturing_modes = match device.supported_capturing_modes() {
        Ok(modes) => modes.into_iter().map(|m| m.resolution).collect(),
        Err(e) => {
            error!(error = %e, "could not enumerate capturing modes");
            Vec::new()
        }
    };
    let summary = DeviceSummary {
        session_id,
        hardware_id: device.hardware_identification(),
        device_type: device.device_type(),
        capturing_modes,
        trigger_mode: device.trigger_mode().ok(),
        acquiring: device.is_acquiring(),
        unsupported_features,
    };
    session.teardown();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoxi_device::{MockCall, MockConfig, MockFactory, MockFailures, MockScanner};

    fn connected(config: MockConfig) -> (MockFactory, Session<MockScanner>) {
        let factory = MockFactory::new(config);
        let mut session = Session::new(ConnectTarget::by_serial("dev"));
        session.connect(&factory, Timeout::Zero).unwrap();
        (factory, session)
    }

    #[test]
    fn calls_out_of_order_are_invalid_state() {
        let mut session = Session::<MockScanner>::new(ConnectTarget::by_serial("dev"));
        assert!(matches!(
            session.configure(&DesiredSettings::default()),
            Err(Error::InvalidState {
                found: SessionState::Disconnected,
                ..
            })
        ));
        assert!(session.capture(Timeout::Zero).is_err());
        assert!(session.begin_acquisition(TriggerMode::Software).is_err());
    }

    #[test]
    fn states_advance_through_capture() {
        let (_, mut session) = connected(MockConfig {
            pending_frames: 2,
            ..MockConfig::default()
        });
        assert_eq!(session.state(), SessionState::Connected);
        session.configure(&DesiredSettings::default()).unwrap();
        assert_eq!(session.state(), SessionState::Configured);
        assert_eq!(session.begin_acquisition(TriggerMode::Software).unwrap(), 2);
        assert_eq!(session.state(), SessionState::Acquiring);
        session.capture(Timeout::Zero).unwrap();
        assert_eq!(session.state(), SessionState::FrameReady);
        session.teardown();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn retrigger_invalidates_previous_handle() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, mut session) = connected(MockConfig::default());
        session.configure(&DesiredSettings::default()).unwrap();
        session.begin_acquisition(TriggerMode::Software).unwrap();
        let first = session.capture(Timeout::Zero).unwrap();
        let second = session.capture(Timeout::Zero).unwrap();
        assert!(!session.is_current(&first));
        assert!(session.is_current(&second));

        let reqs = [OutputRequest::new(OutputFormat::Praw, true, dir.path())];
        assert!(matches!(
            session.persist(&first, "s", &reqs),
            Err(Error::Acquisition(AcquisitionError::StaleFrame { .. }))
        ));
        assert!(!factory
            .journal()
            .iter()
            .any(|c| matches!(c, MockCall::SaveLastOutput(_))));
        assert_eq!(
            session.persist(&second, "s", &reqs).unwrap(),
            vec![OutputFormat::Praw]
        );
    }

    #[test]
    fn failed_trigger_leaves_no_current_frame() {
        let (factory, mut session) = connected(MockConfig::default());
        session.configure(&DesiredSettings::default()).unwrap();
        session.begin_acquisition(TriggerMode::Software).unwrap();
        let first = session.capture(Timeout::Zero).unwrap();
        factory.state_mut(|st| st.config.failures.trigger_rejected = true);
        assert!(session.capture(Timeout::Zero).is_err());
        assert!(!session.is_current(&first));
        assert_eq!(session.state(), SessionState::Acquiring);
    }

    #[test]
    fn teardown_runs_once_even_with_drop() {
        let factory = MockFactory::new(MockConfig {
            initially_acquiring: true,
            ..MockConfig::default()
        });
        {
            let mut session = Session::new(ConnectTarget::by_serial("dev"));
            session.connect(&factory, Timeout::Zero).unwrap();
            session.teardown();
            session.teardown();
        }
        assert_eq!(factory.count(&MockCall::StopAcquisition), 1);
        assert_eq!(factory.count(&MockCall::Disconnect { logout: true }), 1);
    }

    #[test]
    fn dropped_session_still_disconnects() {
        let factory = MockFactory::default();
        {
            let mut session = Session::new(ConnectTarget::by_serial("dev"));
            session.connect(&factory, Timeout::Zero).unwrap();
        }
        assert_eq!(factory.count(&MockCall::Disconnect { logout: true }), 1);
    }

    #[test]
    fn stop_acquisition_failure_is_fatal_for_stop_runs() {
        let factory = MockFactory::new(MockConfig {
            initially_acquiring: true,
            failures: MockFailures {
                stop_acquisition: true,
                ..MockFailures::default()
            },
            ..MockConfig::default()
        });
        let result = run_stop(
            &factory,
            &ConnectTarget::by_serial("dev"),
            &SessionOptions::default(),
            &CancelFlag::new(),
        );
        assert!(matches!(
            result.error,
            Some(Error::Acquisition(AcquisitionError::Stop(_)))
        ));
        assert_eq!(factory.count(&MockCall::Disconnect { logout: true }), 1);
    }

    #[test]
    fn stop_run_on_idle_device_succeeds() {
        let factory = MockFactory::default();
        let result = run_stop(
            &factory,
            &ConnectTarget::by_serial("dev"),
            &SessionOptions::default(),
            &CancelFlag::new(),
        );
        assert!(result.is_success());
        assert_eq!(factory.count(&MockCall::StopAcquisition), 0);
    }

    #[test]
    fn connect_run_describes_device() {
        let factory = MockFactory::new(MockConfig {
            supported_features: vec![],
            ..MockConfig::default()
        });
        let summary = run_connect(
            &factory,
            &ConnectTarget::by_serial("1708011"),
            &SessionOptions::default(),
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(summary.hardware_id, "1708011");
        assert_eq!(summary.device_type, "PhoXi3DScanner");
        assert_eq!(summary.capturing_modes.len(), 2);
        assert_eq!(summary.unsupported_features.len(), 8);
        assert!(!factory.state().connected);
    }
}
