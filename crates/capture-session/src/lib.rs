//! capture-session: drives one structured-light scanner from connect to teardown
//!
//! A session waits for the control service, connects one device, applies the three setting
//! groups with per-field capability checks, puts the device into the required trigger mode,
//! runs acquisition, retrieves a frame and saves it in the requested formats. Teardown runs
//! on every exit path. Recoverable problems are collected as [`Warning`]s; everything else
//! ends the session with an [`Error`].

mod error;
pub use error::{AcquisitionError, Error, Result};

mod cancel;
pub use cancel::CancelFlag;

mod warning;
pub use warning::Warning;

pub mod gate;
pub use gate::{await_ready, GatePolicy};

mod connect;
pub use connect::connect;

pub mod settings;
pub use settings::DesiredSettings;

pub mod trigger;
pub mod acquisition;

mod capture;
pub use capture::{capture_one, FrameHandle};

pub mod persist;
pub use persist::{OutputFormat, OutputRequest, PersistOutcome};

mod session;
pub use session::{
    run_capture, run_connect, run_stop, CapturePlan, DeviceSummary, Session, SessionOptions,
    SessionResult, SessionState,
};

mod freerun;
pub use freerun::{run_freerun, FreerunPlan, FreerunReport};

pub mod profile;
pub use profile::{default_profile_json, load_profile, profile_from_value};

mod metrics;
pub use metrics::{SessionCounters, SessionMetrics};
