//! Linear Brown-Conrady estimation from homography residuals.
//!
//! Given intrinsics K and per-view plane homographies, the residual between
//! the homography-predicted position of a board point and its actual
//! observation (both in normalized coordinates) is, to first order, a linear
//! function of the distortion coefficients. Stacking every observation gives
//! an overdetermined system solved via SVD.
//!
//! Intended for initialization: accurate for small-to-moderate distortion,
//! biased for severe wide-angle distortion.

use nalgebra::{DMatrix, DVector};
use scan_core::{BrownConrady5, Mat3, Pt2, Real, Vec2, Vec3};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy)]
pub enum DistortionFitError {
    #[error("need at least {0} points for distortion estimation, got {1}")]
    NotEnoughPoints(usize, usize),
    #[error("svd failed during distortion estimation")]
    SvdFailed,
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
    #[error("degenerate configuration: all points near the image center")]
    DegenerateConfiguration,
}

/// Options controlling which coefficients are estimated.
#[derive(Debug, Clone, Copy)]
pub struct DistortionFitOptions {
    /// Fix tangential coefficients (p1, p2) to zero.
    pub fix_tangential: bool,
    /// Fix the third radial coefficient (k3) to zero. The r^6 term overfits
    /// with typical calibration data; keep fixed unless the lens demands it.
    pub fix_k3: bool,
    /// Undistortion iterations stored on the returned model.
    pub iters: u32,
}

impl Default for DistortionFitOptions {
    fn default() -> Self {
        Self {
            fix_tangential: false,
            fix_k3: true,
            iters: 8,
        }
    }
}

/// One view's data for distortion fitting: a homography computed from the
/// *distorted* observations, plus the raw correspondences.
#[derive(Debug, Clone)]
pub struct DistortionFitView<'a> {
    pub homography: Mat3,
    pub board_points: &'a [Pt2],
    pub pixel_points: &'a [Pt2],
}

fn normalized(k_inv: &Mat3, p: &Pt2) -> Vec2 {
    let v = k_inv * Vec3::new(p.x, p.y, 1.0);
    Vec2::new(v.x / v.z, v.y / v.z)
}

fn homography_prediction(h: &Mat3, p: &Pt2) -> Pt2 {
    let v = h * Vec3::new(p.x, p.y, 1.0);
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Estimate Brown-Conrady coefficients from multiple views with known K.
pub fn estimate_distortion(
    intrinsics: &Mat3,
    views: &[DistortionFitView<'_>],
    opts: DistortionFitOptions,
) -> Result<BrownConrady5, DistortionFitError> {
    let total_points: usize = views.iter().map(|v| v.board_points.len()).sum();

    let n_params = match (opts.fix_tangential, opts.fix_k3) {
        (true, true) => 2,
        (true, false) => 3,
        (false, true) => 4,
        (false, false) => 5,
    };
    let min_points = n_params.div_ceil(2) + 2;
    if total_points < min_points {
        return Err(DistortionFitError::NotEnoughPoints(min_points, total_points));
    }

    let k_inv = intrinsics
        .try_inverse()
        .ok_or(DistortionFitError::IntrinsicsNotInvertible)?;

    let mut a = DMatrix::<Real>::zeros(2 * total_points, n_params);
    let mut b = DVector::<Real>::zeros(2 * total_points);

    let mut max_r2: Real = 0.0;
    let mut row = 0;
    for view in views {
        for (board_pt, pixel_obs) in view.board_points.iter().zip(view.pixel_points) {
            let pixel_ideal = homography_prediction(&view.homography, board_pt);
            let n_ideal = normalized(&k_inv, &pixel_ideal);
            let n_obs = normalized(&k_inv, pixel_obs);
            let residual = n_obs - n_ideal;

            let x = n_ideal.x;
            let y = n_ideal.y;
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            max_r2 = max_r2.max(r2);

            let mut col = 0;
            a[(row, col)] = x * r2;
            a[(row + 1, col)] = y * r2;
            col += 1;

            a[(row, col)] = x * r4;
            a[(row + 1, col)] = y * r4;
            col += 1;

            if !opts.fix_k3 {
                let r6 = r4 * r2;
                a[(row, col)] = x * r6;
                a[(row + 1, col)] = y * r6;
                col += 1;
            }

            if !opts.fix_tangential {
                let xy = x * y;
                a[(row, col)] = 2.0 * xy;
                a[(row + 1, col)] = r2 + 2.0 * y * y;
                col += 1;

                a[(row, col)] = r2 + 2.0 * x * x;
                a[(row + 1, col)] = 2.0 * xy;
            }

            b[row] = residual.x;
            b[row + 1] = residual.y;
            row += 2;
        }
    }

    if max_r2 < 1e-6 {
        return Err(DistortionFitError::DegenerateConfiguration);
    }

    let svd = a.svd(true, true);
    let x = svd
        .solve(&b, 1e-10)
        .map_err(|_| DistortionFitError::SvdFailed)?;

    let mut col = 0;
    let k1 = x[col];
    col += 1;
    let k2 = x[col];
    col += 1;
    let k3 = if opts.fix_k3 {
        0.0
    } else {
        let v = x[col];
        col += 1;
        v
    };
    let (p1, p2) = if opts.fix_tangential {
        (0.0, 0.0)
    } else {
        (x[col], x[col + 1])
    };

    Ok(BrownConrady5 {
        k1,
        k2,
        k3,
        p1,
        p2,
        iters: opts.iters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Isometry3, Rotation3, Translation3, Vector3};
    use scan_core::DistortionModel;

    fn make_kmtx() -> Mat3 {
        Mat3::new(800.0, 0.0, 640.0, 0.0, 800.0, 360.0, 0.0, 0.0, 1.0)
    }

    fn synthetic_view(
        kmtx: &Mat3,
        dist: &BrownConrady5,
        rot: Rotation3<Real>,
        t: Vector3<Real>,
        board_points: &[Pt2],
    ) -> (Mat3, Vec<Pt2>) {
        let iso = Isometry3::from_parts(Translation3::from(t), rot.into());

        let mut pixels = Vec::new();
        for bp in board_points {
            let p3d = iso.transform_point(&nalgebra::Point3::new(bp.x, bp.y, 0.0));
            let n_undist = Vec2::new(p3d.x / p3d.z, p3d.y / p3d.z);
            let n_dist = dist.distort(&n_undist);
            let pixel_h = kmtx * Vec3::new(n_dist.x, n_dist.y, 1.0);
            pixels.push(Pt2::new(pixel_h.x / pixel_h.z, pixel_h.y / pixel_h.z));
        }

        // Distortion-free homography from the ground-truth pose.
        let binding = iso.rotation.to_rotation_matrix();
        let r_mat = binding.matrix();
        let mut hmtx = Mat3::zeros();
        hmtx.set_column(0, &(kmtx * r_mat.column(0)));
        hmtx.set_column(1, &(kmtx * r_mat.column(1)));
        hmtx.set_column(2, &(kmtx * t));

        (hmtx, pixels)
    }

    #[test]
    fn radial_coefficients_are_recovered() {
        let kmtx = make_kmtx();
        let dist_gt = BrownConrady5 {
            k1: -0.2,
            k2: 0.05,
            k3: 0.0,
            p1: 0.0,
            p2: 0.0,
            iters: 8,
        };

        let mut board_points = Vec::new();
        for i in 0..7 {
            for j in 0..7 {
                board_points.push(Pt2::new(i as Real * 30.0, j as Real * 30.0));
            }
        }

        let poses = [
            (
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(100.0, -50.0, 1000.0),
            ),
            (
                Rotation3::from_euler_angles(-0.05, 0.15, -0.1),
                Vector3::new(-50.0, 100.0, 1200.0),
            ),
            (
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(0.0, 0.0, 900.0),
            ),
        ];

        let rendered: Vec<(Mat3, Vec<Pt2>)> = poses
            .iter()
            .map(|(rot, t)| synthetic_view(&kmtx, &dist_gt, *rot, *t, &board_points))
            .collect();
        let views: Vec<DistortionFitView<'_>> = rendered
            .iter()
            .map(|(h, pixels)| DistortionFitView {
                homography: *h,
                board_points: &board_points,
                pixel_points: pixels,
            })
            .collect();

        let opts = DistortionFitOptions {
            fix_tangential: true,
            fix_k3: true,
            iters: 8,
        };
        let dist_est = estimate_distortion(&kmtx, &views, opts).unwrap();

        // Linear approximation; expect the right sign and rough magnitude.
        assert!((dist_est.k1 - dist_gt.k1).abs() < 0.1, "k1 off: {}", dist_est.k1);
        assert!((dist_est.k2 - dist_gt.k2).abs() < 0.05, "k2 off: {}", dist_est.k2);
        assert_eq!(dist_est.p1, 0.0);
        assert_eq!(dist_est.p2, 0.0);
        assert_eq!(dist_est.k3, 0.0);
    }

    #[test]
    fn too_few_points_is_an_error() {
        let kmtx = make_kmtx();
        let board = vec![Pt2::new(0.0, 0.0)];
        let pixels = vec![Pt2::new(640.0, 360.0)];
        let views = [DistortionFitView {
            homography: Mat3::identity(),
            board_points: &board,
            pixel_points: &pixels,
        }];
        assert!(matches!(
            estimate_distortion(&kmtx, &views, DistortionFitOptions::default()),
            Err(DistortionFitError::NotEnoughPoints(_, 1))
        ));
    }
}
