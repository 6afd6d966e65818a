use crate::{CancelFlag, Error, Result};
use phoxi_device::DeviceFactory;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How long and how often to wait for the control service.
#[derive(Clone, Debug, PartialEq)]
pub struct GatePolicy {
    pub poll_interval: Duration,
    /// `None` waits until the service comes up or the flag is cancelled.
    pub deadline: Option<Duration>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            deadline: Some(Duration::from_secs(30)),
        }
    }
}

/// Block until the control service reports running.
pub fn await_ready<F: DeviceFactory + ?Sized>(
    factory: &F,
    policy: &GatePolicy,
    cancel: &CancelFlag,
) -> Result<()> {
    let started = Instant::now();
    let mut polls: u32 = 0;
    loop {
        cancel.checkpoint()?;
        polls += 1;
        if factory.is_control_service_running() {
            info!(polls, "control service is running");
            return Ok(());
        }
        info!(polls, "control service is not running, waiting");

        let mut pause = policy.poll_interval;
        if let Some(limit) = policy.deadline {
            let elapsed = started.elapsed();
            if elapsed >= limit {
                return Err(Error::ServiceUnavailable(format!(
                    "not running after {} ms",
                    limit.as_millis()
                )));
            }
            pause = pause.min(limit - elapsed);
        }
        debug!(pause_ms = pause.as_millis() as u64, "sleeping before next poll");
        thread::sleep(pause);
    }
}
