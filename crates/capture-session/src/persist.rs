use crate::warning::record;
use crate::{FrameHandle, Warning};
use core::fmt;
use phoxi_device::ScannerDevice;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputFormat {
    Praw,
    Ply,
    Tif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Praw, OutputFormat::Ply, OutputFormat::Tif];

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Praw => "praw",
            OutputFormat::Ply => "ply",
            OutputFormat::Tif => "tif",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputFormat::Praw => "Praw",
            OutputFormat::Ply => "Ply",
            OutputFormat::Tif => "Tif",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputRequest {
    pub format: OutputFormat,
    pub enabled: bool,
    pub directory: PathBuf,
}

impl OutputRequest {
    pub fn new(format: OutputFormat, enabled: bool, directory: impl Into<PathBuf>) -> Self {
        Self {
            format,
            enabled,
            directory: directory.into(),
        }
    }

    /// `{directory}/{scene}.{ext}`, or just the file name when the directory is empty.
    pub fn target_path(&self, scene: &str) -> PathBuf {
        self.directory
            .join(format!("{scene}.{}", self.format.extension()))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PersistOutcome {
    pub saved: Vec<OutputFormat>,
    pub warnings: Vec<Warning>,
}

/// Write the frame in every enabled format. A failing format never stops the others.
pub(crate) fn save<D: ScannerDevice + ?Sized>(
    device: &mut D,
    frame: &FrameHandle,
    scene: &str,
    requests: &[OutputRequest],
) -> PersistOutcome {
    let mut outcome = PersistOutcome::default();
    for req in requests {
        if !req.enabled {
            debug!(format = %req.format, "output disabled");
            continue;
        }
        let path = req.target_path(scene);
        let result = match req.format {
            OutputFormat::Ply => {
                if !frame.has_point_cloud() {
                    record(
                        &mut outcome.warnings,
                        Warning::SaveSkipped {
                            format: req.format,
                            reason: "frame has no point cloud",
                        },
                    );
                    continue;
                }
                frame.frame().save_as_ply(&path, true, true)
            }
            OutputFormat::Praw | OutputFormat::Tif => {
                device.save_last_output(&path, Some(frame.id()))
            }
        };
        match result {
            Ok(()) => {
                info!(format = %req.format, path = %path.display(), "saved frame");
                outcome.saved.push(req.format);
            }
            Err(e) => record(
                &mut outcome.warnings,
                Warning::SaveFailed {
                    format: req.format,
                    path,
                    message: e.to_string(),
                },
            ),
        }
    }
    outcome
}
