//! Command-line drivers: stereo calibration capture/processing and
//! structured-light point-cloud reconstruction.

mod detect;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use scan_calib::{CalibrationError, CalibrationFlags};
use scan_core::{logger, CalibrationTarget, MarkerDictionary};
use scan_graycode::DecodeError;
use scan_pipeline::{
    export_ply_file, load_detector_params, load_image_list, load_json, run_reconstruction,
    run_stereo_session, save_session_documents, FrameCollector, ImageDirSource,
    ReconstructionConfig, StereoParametersDoc, StereoSessionConfig, TargetDetector,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Stereo calibration and Gray-code reconstruction toolbox.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging (debug level).
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Calibrate a two-camera rig from captured target images.
    Calibrate(CalibrateArgs),
    /// Decode a Gray-code sequence into a colored PLY point cloud.
    Pointcloud(PointcloudArgs),
}

#[derive(Debug, clap::Args)]
struct CalibrateArgs {
    /// Number of board squares in X direction.
    #[arg(long)]
    squares_x: u32,

    /// Number of board squares in Y direction.
    #[arg(long)]
    squares_y: u32,

    /// Square side length (meters).
    #[arg(long)]
    square_len: f64,

    /// Marker side length (meters); selects ChArUco detection.
    #[arg(long)]
    marker_len: Option<f64>,

    /// Marker dictionary selector (requires --marker-len).
    #[arg(long)]
    dictionary: Option<u32>,

    /// Marker-detector parameter file (JSON).
    #[arg(long)]
    detector_params: Option<PathBuf>,

    /// Directory holding the captured frames.
    #[arg(long)]
    input_dir: PathBuf,

    /// Directory receiving the calibration documents.
    #[arg(long)]
    output_dir: PathBuf,

    /// Filename prefix of camera-A frames (`<prefix><index>.<ext>`).
    #[arg(long, default_value = "camA_im")]
    cam_a_prefix: String,

    /// Filename prefix of camera-B frames.
    #[arg(long, default_value = "camB_im")]
    cam_b_prefix: String,

    /// Frame file extension.
    #[arg(long, default_value = "png")]
    extension: String,

    /// Multiscale corner refinement during detection.
    #[arg(long)]
    refine: bool,

    /// Assume zero tangential distortion for camera A.
    #[arg(long)]
    zero_tangential_a: bool,

    /// Assume zero tangential distortion for camera B.
    #[arg(long)]
    zero_tangential_b: bool,

    /// Fix camera A's fx/fy ratio to this value.
    #[arg(long)]
    fix_aspect_a: Option<f64>,

    /// Fix camera B's fx/fy ratio to this value.
    #[arg(long)]
    fix_aspect_b: Option<f64>,

    /// Fix camera A's principal point at the image center.
    #[arg(long)]
    fix_principal_a: bool,

    /// Fix camera B's principal point at the image center.
    #[arg(long)]
    fix_principal_b: bool,

    /// Print per-frame detected corner counts.
    #[arg(long)]
    show_corners: bool,
}

#[derive(Debug, clap::Args)]
struct PointcloudArgs {
    /// Image-list document naming the captured pattern images.
    #[arg(long)]
    images: PathBuf,

    /// Consolidated stereo-parameters document.
    #[arg(long)]
    params: PathBuf,

    /// Projector width used during acquisition.
    #[arg(long)]
    proj_width: u32,

    /// Projector height used during acquisition.
    #[arg(long)]
    proj_height: u32,

    /// Reliability threshold on pattern/inverse differences.
    #[arg(long, default_value_t = 5)]
    white_thresh: u8,

    /// Shadow threshold on white/black differences.
    #[arg(long, default_value_t = 40)]
    black_thresh: u8,

    /// Output PLY path.
    #[arg(long, default_value = "pointcloud.ply")]
    output: PathBuf,
}

// Exit codes by error class.
const EXIT_CONFIG: u8 = 2;
const EXIT_IO: u8 = 3;
const EXIT_INSUFFICIENT_DATA: u8 = 4;
const EXIT_DECODE: u8 = 5;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let _ = logger::init_with_level(level);

    let result = match cli.command {
        Command::Calibrate(args) => run_calibrate(args),
        Command::Pointcloud(args) => run_pointcloud(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(classify_error(&err))
        }
    }
}

fn classify_error(err: &anyhow::Error) -> u8 {
    if let Some(cal) = err.downcast_ref::<CalibrationError>() {
        return match cal {
            CalibrationError::InsufficientFrames { .. } | CalibrationError::NotEnoughPoints { .. } => {
                EXIT_INSUFFICIENT_DATA
            }
            _ => EXIT_DECODE,
        };
    }
    if err.downcast_ref::<DecodeError>().is_some() {
        return EXIT_DECODE;
    }
    if err.downcast_ref::<std::io::Error>().is_some()
        || err.downcast_ref::<image::ImageError>().is_some()
    {
        return EXIT_IO;
    }
    EXIT_CONFIG
}

fn build_target(args: &CalibrateArgs) -> Result<CalibrationTarget> {
    match args.marker_len {
        Some(marker_len) => {
            let selector = args
                .dictionary
                .context("--marker-len requires --dictionary")?;
            let dictionary = MarkerDictionary::from_id(selector)
                .with_context(|| format!("unknown dictionary selector {}", selector))?;
            CalibrationTarget::charuco(
                args.squares_x,
                args.squares_y,
                args.square_len,
                marker_len,
                dictionary,
            )
        }
        None => CalibrationTarget::chessboard(args.squares_x, args.squares_y, args.square_len),
    }
}

fn run_calibrate(args: CalibrateArgs) -> Result<()> {
    let target = build_target(&args)?;
    info!(
        "board: {}x{} squares, square {:.4} m{}",
        target.squares_x,
        target.squares_y,
        target.square_len,
        if target.is_marker_based() {
            " (charuco)"
        } else {
            ""
        }
    );

    let detector_params = match &args.detector_params {
        Some(path) => Some(load_detector_params(path)?),
        None => None,
    };

    let detector: Box<dyn TargetDetector> = if target.is_marker_based() {
        Box::new(detect::CharucoDetector::new(
            &target,
            args.refine,
            detector_params.as_ref(),
        )?)
    } else {
        Box::new(detect::ChessboardDetector::new(&target, args.refine))
    };

    let source = ImageDirSource::from_prefixes(
        &args.input_dir,
        &[&args.cam_a_prefix, &args.cam_b_prefix],
        &args.extension,
    )?;
    info!("loaded {} frame pairs from {}", source.len(), args.input_dir.display());

    let mut collector = FrameCollector::new(source, BoxedDetector(detector), target, 2)?;
    collector.collect_all()?;
    let captures = collector.into_captures();
    info!("{} frame pairs accepted", captures.len());

    if args.show_corners {
        for frame in captures.frames() {
            println!(
                "frame {}: camA {} corners, camB {} corners",
                frame.index(),
                frame.detection(0).len(),
                frame.detection(1).len()
            );
        }
    }

    let image_size = first_frame_size(&args)?;
    let config = StereoSessionConfig {
        flags: vec![
            CalibrationFlags {
                fix_aspect_ratio: args.fix_aspect_a,
                zero_tangential: args.zero_tangential_a,
                fix_principal_point: args.fix_principal_a,
                ..Default::default()
            },
            CalibrationFlags {
                fix_aspect_ratio: args.fix_aspect_b,
                zero_tangential: args.zero_tangential_b,
                fix_principal_point: args.fix_principal_b,
                ..Default::default()
            },
        ],
    };

    let report = run_stereo_session(&captures, image_size, &config)?;
    for (idx, cal) in report.cameras.iter().enumerate() {
        println!(
            "camera {}: fx={:.3} fy={:.3} cx={:.3} cy={:.3} reproj={:.4} px",
            idx,
            cal.camera.intrinsics.fx,
            cal.camera.intrinsics.fy,
            cal.camera.intrinsics.cx,
            cal.camera.intrinsics.cy,
            cal.reproj_error()
        );
    }
    println!(
        "stereo: baseline={:.4} m, rms={:.4} px",
        report.stereo.geometry.baseline(),
        report.stereo.rms
    );

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    let written = save_session_documents(&args.output_dir, &report)?;
    println!("saved {} documents to {}", written.len(), args.output_dir.display());
    Ok(())
}

/// Image size of the first camera-A frame, used as the calibration size.
fn first_frame_size(args: &CalibrateArgs) -> Result<scan_core::ImageSize> {
    let path = args
        .input_dir
        .join(format!("{}0.{}", args.cam_a_prefix, args.extension));
    let img = image::ImageReader::open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(scan_core::ImageSize::new(img.width(), img.height()))
}

fn run_pointcloud(args: PointcloudArgs) -> Result<()> {
    let list = load_image_list(&args.images)?;
    let params: StereoParametersDoc = load_json(&args.params)?;
    let config = ReconstructionConfig {
        projector_width: args.proj_width,
        projector_height: args.proj_height,
        white_threshold: args.white_thresh,
        black_threshold: args.black_thresh,
    };

    let reconstruction = run_reconstruction(&list, &params, &config)?;
    println!(
        "decoded {} matched pixels into {} points",
        reconstruction.disparity.valid_count(),
        reconstruction.points.len()
    );

    export_ply_file(&args.output, &reconstruction.points)?;
    println!("point cloud written to {}", args.output.display());
    Ok(())
}

/// Trait-object wrapper so the collector can hold either detector.
struct BoxedDetector(Box<dyn TargetDetector>);

impl TargetDetector for BoxedDetector {
    fn detect(&self, image: &image::GrayImage) -> Result<scan_core::Detection> {
        self.0.detect(image)
    }
}
