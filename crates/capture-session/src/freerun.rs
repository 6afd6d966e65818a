use crate::session::finish;
use crate::{
    gate, CancelFlag, DesiredSettings, OutputFormat, OutputRequest, Result, Session,
    SessionOptions, SessionResult,
};
use phoxi_device::{ConnectTarget, DeviceFactory, Timeout, TriggerMode};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, info_span};

/// Streaming capture: frames are pulled until one of the limits is reached.
#[derive(Clone, Debug, PartialEq)]
pub struct FreerunPlan {
    pub target: ConnectTarget,
    pub settings: DesiredSettings,
    pub max_frames: Option<usize>,
    pub max_duration: Option<Duration>,
    pub frame_timeout: Timeout,
    /// When set, every frame is saved as `{index}.tif` here.
    pub tif_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub struct FreerunReport {
    pub session: SessionResult,
    pub frames: usize,
    /// Pulls that returned nothing usable.
    pub missed: usize,
    pub files_saved: usize,
}

/// Stream frames in freerun mode until the budget, the duration or `cancel` ends it.
///
/// With neither `max_frames` nor `max_duration` the stream only ends on cancellation.
pub fn run_freerun<F: DeviceFactory>(
    factory: &F,
    plan: &FreerunPlan,
    options: &SessionOptions,
    cancel: &CancelFlag,
) -> FreerunReport {
    let mut session = Session::<F::Device>::new(plan.target.clone());
    let span = info_span!("session", id = %session.id(), hardware_id = %plan.target.hardware_id);
    let _guard = span.enter();
    let mut report = FreerunReport {
        session: SessionResult::new(session.id()),
        frames: 0,
        missed: 0,
        files_saved: 0,
    };

    let outcome = stream(factory, plan, options, cancel, &mut session, &mut report);
    info!(
        frames = report.frames,
        missed = report.missed,
        "freerun stream ended"
    );
    let placeholder = SessionResult::new(report.session.session_id);
    let result = std::mem::replace(&mut report.session, placeholder);
    report.session = finish(session, result, outcome);
    report
}

fn stream<F: DeviceFactory>(
    factory: &F,
    plan: &FreerunPlan,
    options: &SessionOptions,
    cancel: &CancelFlag,
    session: &mut Session<F::Device>,
    report: &mut FreerunReport,
) -> Result<()> {
    gate::await_ready(factory, &options.gate, cancel)?;
    session.connect(factory, options.connect_timeout)?;
    cancel.checkpoint()?;
    session.configure(&plan.settings)?;
    cancel.checkpoint()?;
    session.begin_acquisition(TriggerMode::Freerun)?;

    let tif = plan
        .tif_dir
        .as_ref()
        .map(|dir| [OutputRequest::new(OutputFormat::Tif, true, dir.clone())]);
    let started = Instant::now();
    loop {
        if cancel.is_cancelled() {
            info!("freerun cancelled");
            break;
        }
        if plan.max_frames.is_some_and(|max| report.frames >= max) {
            break;
        }
        if plan.max_duration.is_some_and(|max| started.elapsed() >= max) {
            info!("freerun duration elapsed");
            break;
        }
        let Some(frame) = session.next_streamed_frame(plan.frame_timeout)? else {
            report.missed += 1;
            continue;
        };
        let index = report.frames;
        report.frames += 1;
        report.session.frame_id = Some(frame.id());
        info!(index, frame = %frame.id(), "frame received");
        if let Some(requests) = &tif {
            let saved = session.persist(&frame, &index.to_string(), requests)?;
            report.files_saved += saved.len();
            for format in saved {
                if !report.session.saved.contains(&format) {
                    report.session.saved.push(format);
                }
            }
        }
    }
    Ok(())
}
