//! Synthetic planar-target helpers.
//!
//! The functions here build planar point grids (Z=0), generate simple camera
//! poses, and project targets through ground-truth cameras to produce
//! [`Detection`]s and [`Observations`]. They are deterministic and free of
//! external RNG state so synthetic datasets stay stable across platforms.

use crate::{CameraModel, Detection, Iso3, Observations, Pt2, Pt3, Real, Vec2};
use anyhow::Result;
use nalgebra::{Translation3, UnitQuaternion, Vector3};

/// Generate a planar grid of 3D points (Z=0) with `nx * ny` points.
///
/// Points are ordered deterministically in row-major order (Y major).
pub fn grid_points(nx: usize, ny: usize, spacing: Real) -> Vec<Pt3> {
    let mut points = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            points.push(Pt3::new(i as Real * spacing, j as Real * spacing, 0.0));
        }
    }
    points
}

/// Generate `n_views` poses with a yaw rotation around +Y and a Z ramp.
///
/// A convenient default for planar targets: the board stays in front of the
/// camera while varying viewpoint.
pub fn poses_yaw_y_z(
    n_views: usize,
    yaw_start_rad: Real,
    yaw_step_rad: Real,
    z_start: Real,
    z_step: Real,
) -> Vec<Iso3> {
    (0..n_views)
        .map(|view_idx| {
            let yaw = yaw_start_rad + yaw_step_rad * view_idx as Real;
            let rotation = UnitQuaternion::from_scaled_axis(Vector3::new(0.0, 1.0, 0.0) * yaw);
            let translation = Vector3::new(0.0, 0.0, z_start + z_step * view_idx as Real);
            Iso3::from_parts(Translation3::from(translation), rotation)
        })
        .collect()
}

/// Project a planar target into a camera, requiring every point visible.
///
/// `cam_from_target` must map target-frame points into the camera frame.
pub fn project_view_all(
    camera: &CameraModel,
    cam_from_target: &Iso3,
    target_points: &[Pt3],
) -> Result<Observations> {
    let mut pixels = Vec::with_capacity(target_points.len());
    for (idx, pw) in target_points.iter().enumerate() {
        let pc = cam_from_target.transform_point(pw);
        let Some(uv) = camera.project_point(&pc) else {
            anyhow::bail!("point {idx} not projectable (z={:.6})", pc.z);
        };
        pixels.push(Pt2::new(uv.x, uv.y));
    }

    Observations::new(target_points.to_vec(), pixels)
}

/// Deterministic uniform pixel noise in `[-max_abs_px, +max_abs_px]`.
///
/// Keyed by `(view_idx, point_idx)` so repeated runs generate identical
/// datasets regardless of iteration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformPixelNoise {
    pub seed: u64,
    pub max_abs_px: Real,
}

impl Default for UniformPixelNoise {
    fn default() -> Self {
        Self {
            seed: 0,
            max_abs_px: 0.0,
        }
    }
}

impl UniformPixelNoise {
    /// Sample the noise vector for a given `(view_idx, point_idx)` key.
    #[inline]
    pub fn sample(&self, view_idx: usize, point_idx: usize) -> Vec2 {
        let max_abs = self.max_abs_px.abs();
        if max_abs == 0.0 {
            return Vec2::zeros();
        }

        let key = self.seed
            ^ (view_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (point_idx as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        let u = u64_to_unit_f64(splitmix64(key));
        let v = u64_to_unit_f64(splitmix64(key ^ 0x94D0_49BB_1331_11EB));

        Vec2::new((u - 0.5) * 2.0 * max_abs, (v - 0.5) * 2.0 * max_abs)
    }
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[inline]
fn u64_to_unit_f64(x: u64) -> Real {
    // Top 53 bits to a double in [0, 1); deterministic across platforms.
    ((x >> 11) as Real) * (1.0 / ((1u64 << 53) as Real))
}

/// Ground truth for a synthetic two-camera rig observing a planar target.
pub struct StereoRigSim {
    /// Camera models, indexed by camera.
    pub cameras: Vec<CameraModel>,
    /// `cam_from_rig` transform per camera; camera 0 defines the rig frame.
    pub cam_from_rig: Vec<Iso3>,
    /// `rig_from_target` pose per view.
    pub rig_from_target: Vec<Iso3>,
}

impl StereoRigSim {
    /// Per-frame full-board detections for every camera, projecting the
    /// target through the ground-truth geometry.
    pub fn detections(&self, target_points: &[Pt3]) -> Result<Vec<Vec<Detection>>> {
        let mut frames = Vec::with_capacity(self.rig_from_target.len());
        for rig_from_target in &self.rig_from_target {
            let mut per_camera = Vec::with_capacity(self.cameras.len());
            for (camera, cam_from_rig) in self.cameras.iter().zip(&self.cam_from_rig) {
                let cam_from_target = cam_from_rig * rig_from_target;
                let obs = project_view_all(camera, &cam_from_target, target_points)?;
                per_camera.push(Detection::full(obs.points_2d));
            }
            frames.push(per_camera);
        }
        Ok(frames)
    }

    /// Ground-truth relative transform mapping camera-0 coordinates into
    /// camera-`idx` coordinates.
    pub fn relative_transform(&self, idx: usize) -> Iso3 {
        self.cam_from_rig[idx] * self.cam_from_rig[0].inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BrownConrady5, ImageSize, Intrinsics};

    #[test]
    fn grid_points_order_is_stable() {
        let pts = grid_points(2, 3, 0.5);
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[0], Pt3::new(0.0, 0.0, 0.0));
        assert_eq!(pts[1], Pt3::new(0.5, 0.0, 0.0));
        assert_eq!(pts[2], Pt3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn project_view_all_produces_matching_correspondences() {
        let cam = CameraModel::new(
            Intrinsics {
                fx: 800.0,
                fy: 800.0,
                cx: 640.0,
                cy: 360.0,
                skew: 0.0,
            },
            BrownConrady5::zero(),
            ImageSize::new(1280, 720),
        );
        let board = grid_points(3, 2, 0.05);
        let pose = Iso3::from_parts(Translation3::new(0.0, 0.0, 1.0), UnitQuaternion::identity());

        let view = project_view_all(&cam, &pose, &board).unwrap();
        assert_eq!(view.points_3d.len(), board.len());
        assert_eq!(view.points_2d.len(), board.len());
    }

    #[test]
    fn uniform_noise_is_deterministic_and_bounded() {
        let noise = UniformPixelNoise {
            seed: 123,
            max_abs_px: 0.5,
        };
        let a = noise.sample(0, 0);
        let b = noise.sample(0, 0);
        let c = noise.sample(0, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.x.abs() <= 0.5 && a.y.abs() <= 0.5);
    }
}
