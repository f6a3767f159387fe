//! Rectified projection geometry for a calibrated stereo rig.

use nalgebra::UnitQuaternion;
use scan_core::{CameraModel, ImageSize, Mat3, Mat3x4, Mat4, Real, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned region of pixels unaffected by the rectification border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidRoi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Output of stereo rectification.
///
/// `r1`/`r2` rotate camera-A/camera-B coordinates into their rectified
/// frames; `p1`/`p2` project rectified coordinates to pixels; `q` maps
/// `(x, y, disparity, 1)` to homogeneous 3D in the rectified-A frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RectificationParams {
    pub r1: Mat3,
    pub r2: Mat3,
    pub p1: Mat3x4,
    pub p2: Mat3x4,
    pub q: Mat4,
    pub roi: [ValidRoi; 2],
}

impl RectificationParams {
    /// Shared rectified focal length.
    pub fn focal(&self) -> Real {
        self.p1[(0, 0)]
    }

    /// Shared rectified principal point (zero-disparity alignment).
    pub fn principal_point(&self) -> Vec2 {
        Vec2::new(self.p1[(0, 2)], self.p1[(1, 2)])
    }
}

/// Compute rectified geometry for a two-camera rig.
///
/// `rotation`/`translation` map camera-A coordinates into camera-B
/// coordinates (`x_B = R x_A + T`). The alignment policy is fixed:
/// zero-disparity (shared principal point on the same row) with the full
/// original field of view of both cameras preserved, trading border area
/// for coverage. The output is deterministic in its inputs.
pub fn stereo_rectify(
    cam_a: &CameraModel,
    cam_b: &CameraModel,
    rotation: &Mat3,
    translation: &Vec3,
    image_size: ImageSize,
) -> RectificationParams {
    // Split the relative rotation evenly: each camera rotates halfway into
    // a common "mid" frame, minimizing the distortion either view takes on.
    let q_rel = UnitQuaternion::from_matrix(rotation);
    let q_half = q_rel.powf(0.5);
    let half_a = q_half.to_rotation_matrix();
    let half_b = q_half.inverse().to_rotation_matrix();

    // Baseline direction from camera A to camera B, in the mid frame. The
    // rectified X axis lies along it so epipolar lines become scanlines.
    let a_to_b = q_half.inverse() * (-translation);
    let baseline = a_to_b.norm();
    assert!(baseline > 0.0, "stereo rig has zero baseline");
    let ex = a_to_b / baseline;
    let helper = if ex.z.abs() < 0.9 {
        Vec3::new(0.0, 0.0, 1.0)
    } else {
        Vec3::new(0.0, 1.0, 0.0)
    };
    let ey = helper.cross(&ex).normalize();
    let ez = ex.cross(&ey).normalize();
    let r_rect = Mat3::from_columns(&[ex, ey, ez]).transpose();

    let r1 = r_rect * half_a.matrix();
    let r2 = r_rect * half_b.matrix();

    // Bound the rotated, undistorted field of view of each camera and pick
    // a shared focal length that keeps both entirely visible.
    let bounds_a = rotated_fov_bounds(cam_a, &r1, image_size);
    let bounds_b = rotated_fov_bounds(cam_b, &r2, image_size);

    let w = (image_size.width - 1) as Real;
    let h = (image_size.height - 1) as Real;
    let focal_for = |b: &FovBounds| {
        let span_x = (b.max_x - b.min_x).max(Real::EPSILON);
        let span_y = (b.max_y - b.min_y).max(Real::EPSILON);
        (w / span_x).min(h / span_y)
    };
    let f = focal_for(&bounds_a).min(focal_for(&bounds_b));

    let center_for = |b: &FovBounds| {
        Vec2::new(
            w * 0.5 - f * (b.min_x + b.max_x) * 0.5,
            h * 0.5 - f * (b.min_y + b.max_y) * 0.5,
        )
    };
    let c_a = center_for(&bounds_a);
    let c_b = center_for(&bounds_b);

    // Zero-disparity alignment shares the principal point between views.
    let cx = 0.5 * (c_a.x + c_b.x);
    let cy = 0.5 * (c_a.y + c_b.y);

    let p1 = Mat3x4::new(f, 0.0, cx, 0.0, 0.0, f, cy, 0.0, 0.0, 0.0, 1.0, 0.0);
    let p2 = Mat3x4::new(
        f,
        0.0,
        cx,
        -f * baseline,
        0.0,
        f,
        cy,
        0.0,
        0.0,
        0.0,
        1.0,
        0.0,
    );

    // Q maps (x, y, d, 1) to homogeneous (X, Y, Z, W); with the shared
    // principal point the bottom-right entry vanishes.
    let mut q = Mat4::zeros();
    q[(0, 0)] = 1.0;
    q[(0, 3)] = -cx;
    q[(1, 1)] = 1.0;
    q[(1, 3)] = -cy;
    q[(2, 3)] = f;
    q[(3, 2)] = 1.0 / baseline;

    let roi = [
        valid_roi(cam_a, &r1, f, cx, cy, image_size),
        valid_roi(cam_b, &r2, f, cx, cy, image_size),
    ];

    RectificationParams {
        r1,
        r2,
        p1,
        p2,
        q,
        roi,
    }
}

struct FovBounds {
    min_x: Real,
    min_y: Real,
    max_x: Real,
    max_y: Real,
}

/// Sample the image border, undistort, rotate into the rectified frame and
/// track the normalized-coordinate bounding box.
fn rotated_fov_bounds(camera: &CameraModel, r: &Mat3, image_size: ImageSize) -> FovBounds {
    let mut bounds = FovBounds {
        min_x: Real::INFINITY,
        min_y: Real::INFINITY,
        max_x: Real::NEG_INFINITY,
        max_y: Real::NEG_INFINITY,
    };

    for (px, py) in border_samples(image_size) {
        let n = camera.undistort_pixel(&Vec2::new(px, py));
        let v = r * Vec3::new(n.x, n.y, 1.0);
        if v.z <= 0.0 {
            continue;
        }
        let x = v.x / v.z;
        let y = v.y / v.z;
        bounds.min_x = bounds.min_x.min(x);
        bounds.min_y = bounds.min_y.min(y);
        bounds.max_x = bounds.max_x.max(x);
        bounds.max_y = bounds.max_y.max(y);
    }

    bounds
}

/// Points along each image edge, 8 samples per side plus the corners.
fn border_samples(image_size: ImageSize) -> Vec<(Real, Real)> {
    const STEPS: u32 = 8;
    let w = (image_size.width - 1) as Real;
    let h = (image_size.height - 1) as Real;
    let mut samples = Vec::with_capacity(4 * STEPS as usize);
    for i in 0..=STEPS {
        let t = i as Real / STEPS as Real;
        samples.push((t * w, 0.0));
        samples.push((t * w, h));
        samples.push((0.0, t * h));
        samples.push((w, t * h));
    }
    samples
}

/// Inner rectangle of pixels covered by actual image content after
/// rectification: the area inside the warped original border.
fn valid_roi(
    camera: &CameraModel,
    r: &Mat3,
    f: Real,
    cx: Real,
    cy: Real,
    image_size: ImageSize,
) -> ValidRoi {
    let w = (image_size.width - 1) as Real;
    let h = (image_size.height - 1) as Real;
    const STEPS: u32 = 8;

    let project = |px: Real, py: Real| -> Option<Vec2> {
        let n = camera.undistort_pixel(&Vec2::new(px, py));
        let v = r * Vec3::new(n.x, n.y, 1.0);
        if v.z <= 0.0 {
            return None;
        }
        Some(Vec2::new(f * v.x / v.z + cx, f * v.y / v.z + cy))
    };

    let ts: Vec<Real> = (0..=STEPS).map(|i| i as Real / STEPS as Real).collect();

    let left: Vec<Vec2> = ts.iter().filter_map(|t| project(0.0, t * h)).collect();
    let right: Vec<Vec2> = ts.iter().filter_map(|t| project(w, t * h)).collect();
    let top: Vec<Vec2> = ts.iter().filter_map(|t| project(t * w, 0.0)).collect();
    let bottom: Vec<Vec2> = ts.iter().filter_map(|t| project(t * w, h)).collect();

    let x0 = left.iter().map(|p| p.x).fold(Real::NEG_INFINITY, Real::max);
    let x1 = right.iter().map(|p| p.x).fold(Real::INFINITY, Real::min);
    let y0 = top.iter().map(|p| p.y).fold(Real::NEG_INFINITY, Real::max);
    let y1 = bottom.iter().map(|p| p.y).fold(Real::INFINITY, Real::min);

    let x0 = x0.max(0.0).min(image_size.width as Real);
    let y0 = y0.max(0.0).min(image_size.height as Real);
    let x1 = x1.max(x0).min(image_size.width as Real);
    let y1 = y1.max(y0).min(image_size.height as Real);

    ValidRoi {
        x: x0.ceil() as u32,
        y: y0.ceil() as u32,
        width: (x1 - x0).floor().max(0.0) as u32,
        height: (y1 - y0).floor().max(0.0) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{BrownConrady5, Intrinsics};

    fn camera(fx: Real, fy: Real, cx: Real, cy: Real) -> CameraModel {
        CameraModel::new(
            Intrinsics {
                fx,
                fy,
                cx,
                cy,
                skew: 0.0,
            },
            BrownConrady5::zero(),
            ImageSize::new(1280, 720),
        )
    }

    fn horizontal_rig() -> (CameraModel, CameraModel, Mat3, Vec3) {
        let cam_a = camera(800.0, 800.0, 640.0, 360.0);
        let cam_b = camera(800.0, 800.0, 640.0, 360.0);
        // Pure horizontal baseline of 10 cm: x_B = x_A + T with T = (-b,0,0).
        (cam_a, cam_b, Mat3::identity(), Vec3::new(-0.1, 0.0, 0.0))
    }

    #[test]
    fn identity_rig_preserves_row_alignment_and_depth() {
        let (cam_a, cam_b, r, t) = horizontal_rig();
        let size = cam_a.image_size;
        let params = stereo_rectify(&cam_a, &cam_b, &r, &t, size);

        let f = params.focal();
        let pp = params.principal_point();

        // A world point in the camera-A frame, viewed by both cameras.
        let p_a = Vec3::new(0.05, -0.03, 1.2);
        let p_b = r * p_a + t;

        let v_a = params.r1 * p_a;
        let v_b = params.r2 * p_b;
        let px_a = Vec2::new(f * v_a.x / v_a.z + pp.x, f * v_a.y / v_a.z + pp.y);
        let px_b = Vec2::new(f * v_b.x / v_b.z + pp.x, f * v_b.y / v_b.z + pp.y);

        // P2 applied to rectified-A coordinates gives the same pixel: the
        // rectified frames differ only by the baseline in its fourth column.
        let px_b_via_p2 = (f * v_a.x + params.p2[(0, 3)]) / v_a.z + pp.x;
        assert!((px_b_via_p2 - px_b.x).abs() < 1e-9);

        assert!((px_a.y - px_b.y).abs() < 1e-9, "rows differ");

        let disparity = px_a.x - px_b.x;
        assert!(disparity > 0.0);

        // Reproject through Q and compare with the original point.
        let hom = params.q * nalgebra::Vector4::new(px_a.x, px_a.y, disparity, 1.0);
        let rec = Vec3::new(hom.x / hom.w, hom.y / hom.w, hom.z / hom.w);
        let expected = params.r1 * p_a;
        assert!((rec - expected).norm() < 1e-6, "Q reprojection off: {:?}", rec);
    }

    #[test]
    fn identity_rig_keeps_original_focal() {
        let (cam_a, cam_b, r, t) = horizontal_rig();
        let params = stereo_rectify(&cam_a, &cam_b, &r, &t, cam_a.image_size);
        // No rotation, no distortion: the full-FOV policy reproduces the
        // original focal length and principal point.
        assert!((params.focal() - 800.0).abs() < 1e-6);
        let pp = params.principal_point();
        assert!((pp.x - 639.5).abs() < 1.0);
        assert!((pp.y - 359.5).abs() < 1.0);
        let roi = params.roi[0];
        assert!(roi.width >= 1278 && roi.height >= 718);
    }

    #[test]
    fn rectification_is_deterministic() {
        let cam_a = camera(810.0, 795.0, 645.0, 365.0);
        let cam_b = camera(790.0, 788.0, 630.0, 352.0);
        let r = *nalgebra::Rotation3::from_euler_angles(0.01, -0.04, 0.005).matrix();
        let t = Vec3::new(-0.12, 0.003, 0.002);

        let p1 = stereo_rectify(&cam_a, &cam_b, &r, &t, cam_a.image_size);
        let p2 = stereo_rectify(&cam_a, &cam_b, &r, &t, cam_a.image_size);

        assert_eq!(p1.r1, p2.r1);
        assert_eq!(p1.r2, p2.r2);
        assert_eq!(p1.p1, p2.p1);
        assert_eq!(p1.p2, p2.p2);
        assert_eq!(p1.q, p2.q);
        assert_eq!(p1.roi, p2.roi);
    }

    #[test]
    fn rotated_rig_aligns_epipolar_rows() {
        let cam_a = camera(820.0, 805.0, 640.0, 360.0);
        let cam_b = camera(795.0, 790.0, 628.0, 355.0);
        let r = *nalgebra::Rotation3::from_euler_angles(0.008, -0.05, 0.004).matrix();
        let t = Vec3::new(-0.11, 0.004, -0.003);
        let params = stereo_rectify(&cam_a, &cam_b, &r, &t, cam_a.image_size);

        let f = params.focal();
        let pp = params.principal_point();

        for p_a in [
            Vec3::new(0.1, 0.05, 1.0),
            Vec3::new(-0.2, -0.1, 1.8),
            Vec3::new(0.0, 0.12, 2.5),
        ] {
            let p_b = r * p_a + t;
            let v_a = params.r1 * p_a;
            let v_b = params.r2 * p_b;
            let row_a = f * v_a.y / v_a.z + pp.y;
            let row_b = f * v_b.y / v_b.z + pp.y;
            assert!(
                (row_a - row_b).abs() < 1e-8,
                "epipolar rows differ: {} vs {}",
                row_a,
                row_b
            );
        }
    }
}
