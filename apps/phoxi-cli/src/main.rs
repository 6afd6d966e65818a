use anyhow::{Context, Result};
use capture_session::{
    default_profile_json, load_profile, run_capture, run_connect, run_freerun, run_stop,
    CancelFlag, CapturePlan, DesiredSettings, FreerunPlan, GatePolicy, OutputFormat,
    OutputRequest, SessionMetrics, SessionOptions, SessionResult,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use phoxi_device::{
    CapturingSettings, CodingQuality, CodingStrategy, ConnectTarget, ExperimentalSettings,
    MockConfig, MockFactory, PatternDecompositionReach, ProcessingSettings, SurfaceSmoothness,
    TextureSource, Timeout,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

const EXIT_USAGE: u8 = 1;
const EXIT_SESSION_FAILED: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "phoxi",
    version,
    about = "Structured-light scanner capture sessions",
    disable_help_subcommand = true
)]
struct Cli {
    /// JSON file describing the simulated scanner (defaults to a fully capable device)
    #[arg(long, global = true)]
    mock_config: Option<PathBuf>,

    /// Seconds to wait for the control service; 0 waits until interrupted
    #[arg(long, default_value_t = 30u64, global = true)]
    service_timeout: u64,

    /// Milliseconds to wait when opening the device
    #[arg(long, default_value_t = 0u64, global = true)]
    connect_timeout_ms: u64,

    /// Milliseconds to wait for a frame after triggering
    #[arg(long, default_value_t = 10_000u64, global = true)]
    frame_timeout_ms: u64,

    /// Print session counters in Prometheus text format when done
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture one frame with every setting given positionally
    Capture(CaptureArgs),
    /// Capture one frame using a JSON settings profile
    Scan {
        hardware_id: String,
        scene: String,
        /// Settings profile; missing or malformed files fall back to the defaults
        #[arg(long)]
        profile: Option<PathBuf>,
        #[arg(long)]
        praw: bool,
        #[arg(long)]
        ply: bool,
        #[arg(long)]
        tif: bool,
        /// Outputs go to {root}/praw, {root}/ply and {root}/tif
        #[arg(long, default_value = "scans")]
        scans_root: PathBuf,
        #[arg(long)]
        address: Option<String>,
    },
    /// Stream frames in freerun mode until a limit is hit or Ctrl-C
    Freerun {
        hardware_id: String,
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Stop after this many frames
        #[arg(long)]
        frames: Option<usize>,
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Save every frame as {index}.tif in this directory
        #[arg(long)]
        tif_dir: Option<PathBuf>,
        #[arg(long)]
        address: Option<String>,
    },
    /// Stop a running acquisition
    Stop {
        hardware_id: String,
        #[arg(long)]
        address: Option<String>,
    },
    /// Connect, describe the device as JSON and disconnect
    Connect {
        hardware_id: String,
        #[arg(long)]
        address: Option<String>,
    },
    /// Print the built-in settings profile
    Profile,
}

/// Positional contract of the single-shot capture, in order.
#[derive(Args, Debug)]
struct CaptureArgs {
    hardware_id: String,
    scene: String,
    #[arg(value_parser = parse_flag, action = ArgAction::Set)]
    praw: bool,
    #[arg(value_parser = parse_flag, action = ArgAction::Set)]
    ply: bool,
    #[arg(value_parser = parse_flag, action = ArgAction::Set)]
    tif: bool,
    shutter_multiplier: i32,
    scan_multiplier: i32,
    /// Index into the device's supported capturing modes
    resolution_index: usize,
    #[arg(value_parser = parse_flag, action = ArgAction::Set)]
    camera_only_mode: bool,
    #[arg(value_parser = parse_flag, action = ArgAction::Set)]
    ambient_light_suppression: bool,
    coding_strategy: CodingStrategy,
    coding_quality: CodingQuality,
    texture_source: TextureSource,
    single_pattern_exposure: f64,
    maximum_fps: f64,
    laser_power: i32,
    #[arg(allow_negative_numbers = true)]
    projection_offset_left: i32,
    #[arg(allow_negative_numbers = true)]
    projection_offset_right: i32,
    led_power: i32,
    /// Maximum inaccuracy
    confidence: f64,
    surface_smoothness: SurfaceSmoothness,
    normals_estimation_radius: i32,
    #[arg(value_parser = parse_flag, action = ArgAction::Set)]
    interreflections_filter: bool,
    #[arg(value_parser = parse_flag, action = ArgAction::Set)]
    ambient_light_suppression_compatibility_mode: bool,
    pattern_decomposition_reach: PatternDecompositionReach,
    signal_contrast_threshold: f64,
    #[arg(value_parser = parse_flag, action = ArgAction::Set)]
    use_extended_logging: bool,
    /// Output directories; an empty string writes next to the working directory
    praw_dir: String,
    ply_dir: String,
    tif_dir: String,
    /// Network address of the device
    address: String,
}

impl CaptureArgs {
    fn into_plan(self) -> CapturePlan {
        let settings = DesiredSettings {
            capturing: CapturingSettings {
                shutter_multiplier: self.shutter_multiplier,
                scan_multiplier: self.scan_multiplier,
                camera_only_mode: self.camera_only_mode,
                ambient_light_suppression: self.ambient_light_suppression,
                coding_strategy: self.coding_strategy,
                coding_quality: self.coding_quality,
                texture_source: self.texture_source,
                single_pattern_exposure: self.single_pattern_exposure,
                maximum_fps: self.maximum_fps,
                laser_power: self.laser_power,
                projection_offset_left: self.projection_offset_left,
                projection_offset_right: self.projection_offset_right,
                led_power: self.led_power,
            },
            resolution_index: self.resolution_index,
            processing: ProcessingSettings {
                confidence: self.confidence,
                surface_smoothness: self.surface_smoothness,
                normals_estimation_radius: self.normals_estimation_radius,
                interreflections_filtering: self.interreflections_filter,
            },
            experimental: ExperimentalSettings {
                ambient_light_suppression_compatibility_mode: self
                    .ambient_light_suppression_compatibility_mode,
                pattern_decomposition_reach: self.pattern_decomposition_reach,
                signal_contrast_threshold: self.signal_contrast_threshold,
                use_extended_logging: self.use_extended_logging,
            },
        };
        CapturePlan {
            target: ConnectTarget::by_serial(self.hardware_id).with_address(self.address),
            scene: self.scene,
            settings,
            outputs: vec![
                OutputRequest::new(OutputFormat::Praw, self.praw, self.praw_dir),
                OutputRequest::new(OutputFormat::Ply, self.ply, self.ply_dir),
                OutputRequest::new(OutputFormat::Tif, self.tif, self.tif_dir),
            ],
        }
    }
}

fn parse_flag(s: &str) -> Result<bool, String> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(format!("expected 0 or 1, got {other:?}")),
    }
}

fn main() -> ExitCode {
    setup_tracing();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_SESSION_FAILED)
        }
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let options = SessionOptions {
        gate: GatePolicy {
            deadline: (cli.service_timeout > 0).then(|| Duration::from_secs(cli.service_timeout)),
            ..GatePolicy::default()
        },
        connect_timeout: Timeout::from_millis(cli.connect_timeout_ms),
        frame_timeout: Timeout::from_millis(cli.frame_timeout_ms),
    };
    let metrics = if cli.metrics {
        Some(SessionMetrics::new().context("metrics init")?)
    } else {
        None
    };

    if let Commands::Profile = cli.command {
        println!("{}", serde_json::to_string_pretty(&default_profile_json())?);
        return Ok(ExitCode::SUCCESS);
    }

    let factory = load_factory(cli.mock_config.as_deref())?;
    let cancel = CancelFlag::new();
    spawn_ctrl_c(cancel.clone());

    let (result, frames) = match cli.command {
        Commands::Capture(args) => {
            let result = run_capture(&factory, &args.into_plan(), &options, &cancel);
            let frames = usize::from(result.frame_id.is_some());
            (result, frames)
        }
        Commands::Scan {
            hardware_id,
            scene,
            profile,
            praw,
            ply,
            tif,
            scans_root,
            address,
        } => {
            let plan = CapturePlan {
                target: target(hardware_id, address),
                scene,
                settings: settings_from(profile.as_deref()),
                outputs: scan_outputs(&scans_root, [praw, ply, tif])?,
            };
            let result = run_capture(&factory, &plan, &options, &cancel);
            let frames = usize::from(result.frame_id.is_some());
            (result, frames)
        }
        Commands::Freerun {
            hardware_id,
            profile,
            frames,
            duration_secs,
            tif_dir,
            address,
        } => {
            if let Some(dir) = &tif_dir {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
            let plan = FreerunPlan {
                target: target(hardware_id, address),
                settings: settings_from(profile.as_deref()),
                max_frames: frames,
                max_duration: duration_secs.map(Duration::from_secs),
                frame_timeout: options.frame_timeout,
                tif_dir,
            };
            let report = run_freerun(&factory, &plan, &options, &cancel);
            println!(
                "freerun: {} frames, {} missed, {} files saved",
                report.frames, report.missed, report.files_saved
            );
            (report.session, report.frames)
        }
        Commands::Stop {
            hardware_id,
            address,
        } => (
            run_stop(&factory, &target(hardware_id, address), &options, &cancel),
            0,
        ),
        Commands::Connect {
            hardware_id,
            address,
        } => {
            let summary = run_connect(&factory, &target(hardware_id, address), &options, &cancel)
                .context("connect")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Profile => return Ok(ExitCode::SUCCESS),
    };

    print_result(&result);
    if let Some(m) = &metrics {
        m.observe(&result, frames);
        print!("{}", m.encode_text());
    }
    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_SESSION_FAILED)
    })
}

fn target(hardware_id: String, address: Option<String>) -> ConnectTarget {
    let t = ConnectTarget::by_serial(hardware_id);
    match address {
        Some(addr) => t.with_address(addr),
        None => t,
    }
}

fn load_factory(path: Option<&Path>) -> Result<MockFactory> {
    let config = match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("reading mock config {}", p.display()))?;
            MockConfig::from_json(&raw)
                .with_context(|| format!("parsing mock config {}", p.display()))?
        }
        None => MockConfig::default(),
    };
    Ok(MockFactory::new(config))
}

fn settings_from(profile: Option<&Path>) -> DesiredSettings {
    match profile {
        Some(p) => load_profile(p),
        None => {
            info!("no profile given, using built-in defaults");
            DesiredSettings::default()
        }
    }
}

fn scan_outputs(root: &Path, flags: [bool; 3]) -> Result<Vec<OutputRequest>> {
    let formats = [OutputFormat::Praw, OutputFormat::Ply, OutputFormat::Tif];
    let mut outputs = Vec::with_capacity(formats.len());
    for (format, enabled) in formats.into_iter().zip(flags) {
        let dir = root.join(format.extension());
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        outputs.push(OutputRequest::new(format, enabled, dir));
    }
    Ok(outputs)
}

fn spawn_ctrl_c(cancel: CancelFlag) {
    let _ = std::thread::spawn(move || {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, cancelling session");
                    cancel.cancel();
                }
            }),
            Err(e) => warn!(error = %e, "could not install Ctrl-C handler"),
        }
    });
}

fn print_result(result: &SessionResult) {
    let saved: Vec<String> = result.saved.iter().map(ToString::to_string).collect();
    match result.frame_id {
        Some(id) => println!(
            "session {}: frame {id}, saved [{}]",
            result.session_id,
            saved.join(", ")
        ),
        None => println!("session {}: no frame", result.session_id),
    }
    for w in &result.warnings {
        println!("warning: {w}");
    }
    if let Some(e) = &result.error {
        eprintln!("error: {e}");
    }
}
