//! phoxi-device: control surface of a structured-light 3D scanner
//!
//! This crate describes what the capture orchestration needs from the vendor control
//! service: a factory that connects devices, and a blocking device handle exposing setting
//! groups, trigger mode, acquisition and frame retrieval. The default build enables a
//! `mock` backend so that binaries and tests run on any host without the vendor runtime.

mod types;
pub use types::{
    CapturingMode, ConnectTarget, FrameId, GroupGates, Resolution, SettingGroup, Timeout,
    TriggerMode,
};

mod error;
pub use error::{DeviceError, Result};

pub mod settings;
pub use settings::{
    CapturingSettings, CodingQuality, CodingStrategy, ExperimentalSettings,
    PatternDecompositionReach, ProcessingSettings, SurfaceSmoothness, TextureSource,
};

mod capability;
pub use capability::{CapabilityRegistry, OptionalField};

mod frame;
pub use frame::{Frame, PointCloud, Texture};

mod traits;
pub use traits::{DeviceFactory, ScannerDevice};

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::{MockCall, MockConfig, MockFactory, MockFailures, MockScanner, MockState};
