//! Two-camera rig calibration.
//!
//! Both cameras observe the same board at every accepted frame. Each frame
//! yields a board pose per camera by homography decomposition; the relative
//! transform between the cameras is constant across frames, so the per-frame
//! estimates are averaged in SE(3). The essential and fundamental matrices
//! follow from the averaged transform, and the stereo residual reprojects
//! every observation through the single rig model.

use crate::epipolar::{essential_from_rt, fundamental_from_essential};
use crate::homography::dlt_homography;
use crate::mono::{reprojection_stats, CalibrationError, MIN_CALIBRATION_FRAMES};
use crate::planar_pose::pose_from_homography;
use log::info;
use nalgebra::{Quaternion, Translation3, UnitQuaternion};
use scan_core::{
    CameraModel, DistortionModel, Iso3, Mat3, Observations, Pt2, Real, ReprojectionStats, Vec2,
    Vec3,
};
use serde::{Deserialize, Serialize};

/// Rigid geometry relating the two cameras of a stereo rig.
///
/// `rotation` and `translation` map camera-A coordinates into camera-B
/// coordinates: `x_B = R x_A + T`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StereoGeometry {
    pub rotation: Mat3,
    pub translation: Vec3,
    pub essential: Mat3,
    pub fundamental: Mat3,
}

impl StereoGeometry {
    /// Distance between the two camera centers.
    pub fn baseline(&self) -> Real {
        self.translation.norm()
    }

    /// The relative transform as an isometry.
    pub fn b_from_a(&self) -> Iso3 {
        let rot = UnitQuaternion::from_matrix(&self.rotation);
        Iso3::from_parts(Translation3::from(self.translation), rot)
    }
}

/// Result of a stereo rig calibration run.
#[derive(Debug, Clone)]
pub struct StereoCalibration {
    pub geometry: StereoGeometry,
    /// RMS reprojection error across both cameras and all frames (pixels).
    pub rms: Real,
    /// Per-frame board-to-camera-A poses under the rig model.
    pub cam_a_from_target: Vec<Iso3>,
}

/// Simple SE(3) averaging: arithmetic translation mean plus a quaternion
/// mean with hemisphere correction. Adequate here because the per-frame
/// estimates cluster tightly around the true rig transform.
fn average_isometries(poses: &[Iso3]) -> Iso3 {
    debug_assert!(!poses.is_empty());

    let mut t_sum = Vec3::zeros();
    for iso in poses {
        t_sum += iso.translation.vector;
    }
    let t_avg = Translation3::from(t_sum / (poses.len() as Real));

    let q0 = poses[0].rotation;
    let mut acc = nalgebra::Vector4::<Real>::zeros();
    for iso in poses {
        let coords = iso.rotation.coords;
        let sign = if q0.coords.dot(&coords) < 0.0 { -1.0 } else { 1.0 };
        acc += coords * sign;
    }

    if acc.norm_squared() == 0.0 {
        return Iso3::from_parts(t_avg, UnitQuaternion::identity());
    }

    let q = Quaternion::from_vector(acc / (poses.len() as Real)).normalize();
    Iso3::from_parts(t_avg, UnitQuaternion::from_quaternion(q))
}

/// Calibrate the rig transform from paired per-frame observations.
///
/// `frames[i]` holds the camera-A and camera-B observations of frame `i`,
/// built over the exact same 3D target points (see
/// `CaptureSet::paired_observations`). The camera models act as fixed
/// intrinsics; they are not refined here.
pub fn calibrate_stereo(
    frames: &[Vec<Observations>],
    cam_a: &CameraModel,
    cam_b: &CameraModel,
) -> Result<StereoCalibration, CalibrationError> {
    if frames.len() < MIN_CALIBRATION_FRAMES {
        return Err(CalibrationError::InsufficientFrames {
            got: frames.len(),
            need: MIN_CALIBRATION_FRAMES,
        });
    }
    for (idx, frame) in frames.iter().enumerate() {
        if frame.len() != 2 {
            return Err(CalibrationError::CameraCountMismatch {
                frame: idx,
                expected: 2,
                got: frame.len(),
            });
        }
        if frame[0].len() < 4 || frame[1].len() < 4 {
            return Err(CalibrationError::NotEnoughPoints {
                view: idx,
                points: frame[0].len().min(frame[1].len()),
            });
        }
    }

    let mut poses_a = Vec::with_capacity(frames.len());
    let mut relative = Vec::with_capacity(frames.len());
    for frame in frames {
        let pose_a = board_pose(&frame[0], cam_a)?;
        let pose_b = board_pose(&frame[1], cam_b)?;
        // T_BA = T_B<-target * (T_A<-target)^-1
        relative.push(pose_b * pose_a.inverse());
        poses_a.push(pose_a);
    }

    let b_from_a = average_isometries(&relative);
    let rotation = *b_from_a.rotation.to_rotation_matrix().matrix();
    let translation = b_from_a.translation.vector;

    let essential = essential_from_rt(&rotation, &translation);
    let fundamental = fundamental_from_essential(
        &essential,
        &cam_a.intrinsics.k_matrix(),
        &cam_b.intrinsics.k_matrix(),
    )?;

    // Residual under the single rig model: camera A sees the board through
    // its per-frame pose, camera B through the averaged relative transform.
    let views_a: Vec<Observations> = frames.iter().map(|f| f[0].clone()).collect();
    let views_b: Vec<Observations> = frames.iter().map(|f| f[1].clone()).collect();
    let poses_b: Vec<Iso3> = poses_a.iter().map(|p| b_from_a * p).collect();

    let stats_a = reprojection_stats(cam_a, &poses_a, &views_a);
    let stats_b = reprojection_stats(cam_b, &poses_b, &views_b);
    let rms = combined_rms(&stats_a, &stats_b);

    info!(
        "stereo calibration: baseline={:.4}, rms={:.4} px over {} frames",
        translation.norm(),
        rms,
        frames.len()
    );

    Ok(StereoCalibration {
        geometry: StereoGeometry {
            rotation,
            translation,
            essential,
            fundamental,
        },
        rms,
        cam_a_from_target: poses_a,
    })
}

fn board_pose(view: &Observations, camera: &CameraModel) -> Result<Iso3, CalibrationError> {
    let board = view.planar_points();
    let kmtx = camera.intrinsics.k_matrix();
    let undistorted: Vec<Pt2> = view
        .points_2d
        .iter()
        .map(|p| {
            let n_dist = camera.intrinsics.from_pixel(&Vec2::new(p.x, p.y));
            let n_undist = camera.distortion.undistort(&n_dist);
            let v = kmtx * Vec3::new(n_undist.x, n_undist.y, 1.0);
            Pt2::new(v.x / v.z, v.y / v.z)
        })
        .collect();
    let h = dlt_homography(&board, &undistorted)?;
    Ok(pose_from_homography(&kmtx, &h)?)
}

fn combined_rms(a: &ReprojectionStats, b: &ReprojectionStats) -> Real {
    let total = a.count + b.count;
    if total == 0 {
        return 0.0;
    }
    let sum_sq = a.rms * a.rms * a.count as Real + b.rms * b.rms * b.count as Real;
    (sum_sq / total as Real).sqrt()
}
