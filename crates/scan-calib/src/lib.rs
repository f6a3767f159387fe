//! Closed-form calibration stack for `stereoscan-rs`.
//!
//! This crate estimates per-camera intrinsics/distortion and the rigid
//! stereo-rig geometry from planar target observations:
//!
//! - [`homography`]: DLT homography with Hartley normalization,
//! - [`zhang`]: closed-form intrinsics from plane homographies,
//! - [`distortion_fit`]: linear Brown-Conrady estimation from residuals,
//! - [`planar_pose`]: homography decomposition into a board pose,
//! - [`mono`]: the per-camera calibrator,
//! - [`stereo`]: the two-camera rig calibrator,
//! - [`epipolar`]: essential/fundamental matrix construction.

pub mod distortion_fit;
pub mod epipolar;
pub mod homography;
pub mod mono;
pub mod planar_pose;
pub mod stereo;
pub mod zhang;

pub use distortion_fit::{estimate_distortion, DistortionFitError, DistortionFitOptions};
pub use epipolar::{essential_from_rt, fundamental_from_essential};
pub use homography::{dlt_homography, HomographyError};
pub use mono::{
    calibrate_camera, reprojection_stats, CalibrationError, CalibrationFlags, CameraCalibration,
    MIN_CALIBRATION_FRAMES,
};
pub use planar_pose::pose_from_homography;
pub use stereo::{calibrate_stereo, StereoCalibration, StereoGeometry};
pub use zhang::{intrinsics_from_homographies, ZhangError};
