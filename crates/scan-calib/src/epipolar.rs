//! Essential and fundamental matrices from rig geometry.

use scan_core::{skew_symmetric, Mat3, Vec3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EpipolarError {
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
}

/// Essential matrix `E = [t]× R` for the transform mapping camera-A
/// coordinates into camera-B coordinates (`x_B = R x_A + t`).
pub fn essential_from_rt(rotation: &Mat3, translation: &Vec3) -> Mat3 {
    skew_symmetric(translation) * rotation
}

/// Fundamental matrix `F = K_B^-T E K_A^-1` relating pixel coordinates:
/// `x_B^T F x_A = 0`.
pub fn fundamental_from_essential(
    essential: &Mat3,
    k_a: &Mat3,
    k_b: &Mat3,
) -> Result<Mat3, EpipolarError> {
    let ka_inv = k_a
        .try_inverse()
        .ok_or(EpipolarError::IntrinsicsNotInvertible)?;
    let kb_inv = k_b
        .try_inverse()
        .ok_or(EpipolarError::IntrinsicsNotInvertible)?;
    Ok(kb_inv.transpose() * essential * ka_inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};
    use scan_core::{Pt3, Vec3};

    #[test]
    fn epipolar_constraint_holds_for_synthetic_rig() {
        let k = Mat3::new(800.0, 0.0, 640.0, 0.0, 800.0, 360.0, 0.0, 0.0, 1.0);
        let r = Rotation3::from_euler_angles(0.02, -0.05, 0.01);
        let t = Vector3::new(-0.12, 0.01, 0.005);

        let e = essential_from_rt(r.matrix(), &t);
        let f = fundamental_from_essential(&e, &k, &k).unwrap();

        for p in [
            Pt3::new(0.1, -0.2, 2.0),
            Pt3::new(-0.3, 0.1, 1.5),
            Pt3::new(0.25, 0.15, 3.0),
        ] {
            let pa = p.coords;
            let pb = r * pa + t;

            let xa = k * (pa / pa.z);
            let xb = k * (pb / pb.z);
            let xa = Vec3::new(xa.x, xa.y, 1.0);
            let xb = Vec3::new(xb.x, xb.y, 1.0);

            let residual = (xb.transpose() * f * xa)[0];
            assert!(residual.abs() < 1e-10, "residual {}", residual);
        }
    }
}
