//! Board pose from a plane-induced homography.

use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion};
use scan_core::{Iso3, Mat3, Real, Vec3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoseError {
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
    #[error("svd failed during rotation projection")]
    SvdFailed,
}

/// Decompose a homography `H` (board plane Z=0 -> image) into the rigid
/// transform mapping board coordinates into the camera frame, given K.
pub fn pose_from_homography(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, PoseError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or(PoseError::IntrinsicsNotInvertible)?;

    let h1 = hmtx.column(0);
    let h2 = hmtx.column(1);
    let h3 = hmtx.column(2).into_owned();

    let k_inv_h1 = k_inv * h1;
    let k_inv_h2 = k_inv * h2;

    // Scale factor: normalize the first two columns, averaged for robustness.
    let norm1 = k_inv_h1.norm();
    let norm2 = k_inv_h2.norm();
    let lambda = 1.0 / ((norm1 + norm2) * 0.5);

    let r1 = (lambda * k_inv_h1).into_owned();
    let r2 = (lambda * k_inv_h2).into_owned();
    let r3 = r1.cross(&r2);

    let mut r_mat = Matrix3::<Real>::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    // Project onto SO(3) (polar decomposition via SVD).
    let svd = r_mat.svd(true, true);
    let mut u = svd.u.ok_or(PoseError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(PoseError::SvdFailed)?;
    let mut r_orth = u * v_t;

    if r_orth.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
        r_orth = u * v_t;
    }

    let t_vec: Vec3 = lambda * (k_inv * h3);
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(t_vec), rot))
}
