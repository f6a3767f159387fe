//! High-level entry crate for the `stereoscan-rs` toolbox.
//!
//! Two pipelines share one geometric backbone:
//!
//! 1. **Calibration**: collect synchronized frame pairs of a planar
//!    target, calibrate both cameras, solve the rig geometry, rectify, and
//!    persist the parameter documents:
//!
//! ```no_run
//! use scan::pipeline::{run_stereo_session, save_session_documents, StereoSessionConfig};
//! # fn main() -> anyhow::Result<()> {
//! # let captures: scan::core::CaptureSet = unimplemented!();
//! # let image_size = scan::core::ImageSize::new(1280, 720);
//! let report = run_stereo_session(&captures, image_size, &StereoSessionConfig::default())?;
//! save_session_documents(std::path::Path::new("out"), &report)?;
//! # Ok(())
//! # }
//! ```
//!
//! 2. **Reconstruction**: load the persisted parameters plus a Gray-code
//!    capture sequence and export a colored point cloud:
//!
//! ```no_run
//! use scan::pipeline::{load_image_list, load_json, run_reconstruction, ReconstructionConfig};
//! use scan::pipeline::{export_ply_file, StereoParametersDoc};
//! # fn main() -> anyhow::Result<()> {
//! let list = load_image_list(std::path::Path::new("images.json"))?;
//! let params: StereoParametersDoc = load_json(std::path::Path::new("stereo_parameters.json"))?;
//! let config = ReconstructionConfig {
//!     projector_width: 1366,
//!     projector_height: 768,
//!     white_threshold: 5,
//!     black_threshold: 40,
//! };
//! let result = run_reconstruction(&list, &params, &config)?;
//! export_ply_file(std::path::Path::new("pointcloud.ply"), &result.points)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module organization
//!
//! - [`core`]: math types, camera models, targets, captures
//! - [`calib`]: per-camera and stereo-rig calibration
//! - [`rectify`]: rectification geometry and remap tables
//! - [`graycode`]: pattern generation, decoding, point clouds
//! - [`pipeline`]: end-to-end drivers and persistence
//! - [`prelude`]: convenient re-exports

/// Math types, camera models, and capture primitives.
pub mod core {
    pub use scan_core::*;
}

/// Closed-form camera and stereo-rig calibration.
pub mod calib {
    pub use scan_calib::*;
}

/// Stereo rectification and image remapping.
pub mod rectify {
    pub use scan_rectify::*;
}

/// Gray-code structured light and point-cloud export.
pub mod graycode {
    pub use scan_graycode::*;
}

/// End-to-end drivers, documents and the frame collector.
pub mod pipeline {
    pub use scan_pipeline::*;
}

/// Convenient re-exports for common use cases.
pub mod prelude {
    pub use crate::calib::{
        calibrate_camera, calibrate_stereo, CalibrationFlags, CameraCalibration,
        StereoCalibration, StereoGeometry,
    };
    pub use crate::core::{
        BrownConrady5, CalibrationTarget, CameraModel, CaptureSet, Detection, ImageSize,
        Intrinsics, Iso3, Observations, Pt2, Pt3, Real, Vec2, Vec3,
    };
    pub use crate::graycode::{DisparityMap, GrayCodePattern};
    pub use crate::pipeline::{
        run_reconstruction, run_stereo_session, FrameCollector, ReconstructionConfig,
        StereoSessionConfig,
    };
    pub use crate::rectify::{stereo_rectify, RectificationParams};
}
