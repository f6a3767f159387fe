//! Plane-to-image homography estimation.

use nalgebra::DMatrix;
use scan_core::{Mat3, Pt2, Real, Vec3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("degenerate point configuration")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Similarity transform that moves `pts` to zero centroid and mean distance
/// sqrt(2). Conditioning step for the DLT system on pixel-scale inputs.
fn normalizing_transform(pts: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = pts.len() as Real;
    let cx = pts.iter().map(|p| p.x).sum::<Real>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<Real>() / n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<Real>()
        / n;
    if mean_dist <= Real::EPSILON {
        return Err(HomographyError::Degenerate);
    }

    let s = (2.0_f64).sqrt() / mean_dist;
    Ok(Mat3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

fn apply_transform(t: &Mat3, p: &Pt2) -> Pt2 {
    let v = t * Vec3::new(p.x, p.y, 1.0);
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Estimate H such that `image ~ H * world` using the normalized DLT.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if n < 4 || image.len() != n {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let t_world = normalizing_transform(world)?;
    let t_image = normalizing_transform(image)?;

    let mut a = DMatrix::<Real>::zeros(2 * n, 9);
    for (i, (pw, pi)) in world.iter().zip(image.iter()).enumerate() {
        let w = apply_transform(&t_world, pw);
        let p = apply_transform(&t_image, pi);
        let (x, y) = (w.x, w.y);
        let (u, v) = (p.x, p.y);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // Solve A h = 0 via SVD (smallest singular value). The thin SVD only
    // exposes min(rows, cols) right singular vectors, so pad the minimal
    // 4-point system square to reach the nullspace vector.
    if a.nrows() < a.ncols() {
        let (rows, cols) = (a.nrows(), a.ncols());
        let mut padded = DMatrix::<Real>::zeros(cols, cols);
        padded.view_mut((0, 0), (rows, cols)).copy_from(&a);
        a = padded;
    }
    let svd = a.svd(true, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;
    let h = v_t.row(v_t.nrows() - 1);

    let mut h_norm = Mat3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            h_norm[(r, c)] = h[3 * r + c];
        }
    }

    // Denormalize and scale such that H[2,2] = 1.
    let t_image_inv = t_image.try_inverse().ok_or(HomographyError::Degenerate)?;
    let mut h_mat = t_image_inv * h_norm * t_world;

    let scale = h_mat[(2, 2)];
    if scale.abs() > Real::EPSILON {
        h_mat /= scale;
    }

    Ok(h_mat)
}
