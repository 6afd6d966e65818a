use crate::{AcquisitionError, Error, Result};
use phoxi_device::{Frame, FrameId, Resolution, ScannerDevice, Timeout, TriggerMode};
use tracing::{debug, info};

/// The frame produced by the last successful trigger of a session.
///
/// Only a session hands these out, and it invalidates the previous handle on every new
/// trigger attempt, so at most one handle per session refers to a live frame.
#[derive(Clone, Debug)]
pub struct FrameHandle {
    frame: Frame,
}

impl FrameHandle {
    pub(crate) fn new(frame: Frame) -> Self {
        Self { frame }
    }

    pub fn id(&self) -> FrameId {
        self.frame.id
    }

    pub fn resolution(&self) -> Resolution {
        self.frame.resolution
    }

    pub fn has_point_cloud(&self) -> bool {
        self.frame.has_point_cloud()
    }

    pub fn has_texture(&self) -> bool {
        self.frame.has_texture()
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

/// Trigger one frame in software mode and wait for it.
pub fn capture_one<D: ScannerDevice + ?Sized>(device: &mut D, wait: Timeout) -> Result<FrameHandle> {
    let mode = device
        .trigger_mode()
        .map_err(|source| Error::TriggerMode {
            mode: TriggerMode::Software,
            source,
        })?;
    let acquiring = device.is_acquiring();
    if mode != TriggerMode::Software || !acquiring {
        return Err(AcquisitionError::NotReady { mode, acquiring }.into());
    }

    info!("triggering frame");
    let raw = device.trigger_frame();
    let Some(id) = FrameId::from_raw(raw) else {
        return Err(AcquisitionError::TriggerRejected(raw).into());
    };
    info!(frame = %id, "frame was triggered");

    debug!(frame = %id, ?wait, "waiting for frame");
    let frame = device
        .get_specific_frame(id, wait)
        .ok_or(AcquisitionError::FrameUnavailable(id))?;
    if frame.is_empty() {
        return Err(AcquisitionError::EmptyFrame(id).into());
    }
    info!(
        frame = %id,
        resolution = %frame.resolution,
        point_cloud = frame.has_point_cloud(),
        texture = frame.has_texture(),
        "frame retrieved"
    );
    Ok(FrameHandle::new(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoxi_device::{
        ConnectTarget, DeviceFactory, MockCall, MockConfig, MockFactory, MockFailures,
        MockScanner,
    };

    fn ready(failures: MockFailures) -> (MockFactory, MockScanner) {
        let factory = MockFactory::new(MockConfig {
            initial_trigger_mode: TriggerMode::Software,
            initially_acquiring: true,
            failures,
            ..MockConfig::default()
        });
        let dev = factory
            .create_and_connect(&ConnectTarget::by_serial("dev"), Timeout::Zero)
            .unwrap();
        (factory, dev)
    }

    #[test]
    fn captures_frame_with_cloud_and_texture() {
        let (_, mut dev) = ready(MockFailures::default());
        let handle = capture_one(&mut dev, Timeout::Infinite).unwrap();
        assert_eq!(handle.id(), FrameId::new(0));
        assert!(handle.has_point_cloud());
        assert!(handle.has_texture());
        assert_eq!(handle.resolution(), Resolution::new(2064, 1544));
    }

    #[test]
    fn not_acquiring_device_is_not_triggered() {
        let factory = MockFactory::new(MockConfig {
            initial_trigger_mode: TriggerMode::Software,
            ..MockConfig::default()
        });
        let mut dev = factory
            .create_and_connect(&ConnectTarget::by_serial("dev"), Timeout::Zero)
            .unwrap();
        let err = capture_one(&mut dev, Timeout::Zero).unwrap_err();
        assert!(matches!(
            err,
            Error::Acquisition(AcquisitionError::NotReady {
                acquiring: false,
                ..
            })
        ));
        assert_eq!(factory.count(&MockCall::TriggerFrame), 0);
    }

    #[test]
    fn negative_trigger_result_is_rejected() {
        let (factory, mut dev) = ready(MockFailures {
            trigger_rejected: true,
            ..MockFailures::default()
        });
        let err = capture_one(&mut dev, Timeout::Zero).unwrap_err();
        assert!(matches!(
            err,
            Error::Acquisition(AcquisitionError::TriggerRejected(-1))
        ));
        assert!(factory
            .journal()
            .iter()
            .all(|c| !matches!(c, MockCall::GetSpecificFrame(_))));
    }

    #[test]
    fn missing_frame_is_unavailable() {
        let (_, mut dev) = ready(MockFailures {
            frame_missing: true,
            ..MockFailures::default()
        });
        assert!(matches!(
            capture_one(&mut dev, Timeout::Zero),
            Err(Error::Acquisition(AcquisitionError::FrameUnavailable(_)))
        ));
    }

    #[test]
    fn frame_without_content_is_empty() {
        let (_, mut dev) = ready(MockFailures {
            empty_frame: true,
            ..MockFailures::default()
        });
        assert!(matches!(
            capture_one(&mut dev, Timeout::Zero),
            Err(Error::Acquisition(AcquisitionError::EmptyFrame(_)))
        ));
    }
}
