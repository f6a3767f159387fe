use crate::{Real, Vec2};
use serde::{Deserialize, Serialize};

/// Lens distortion applied on the normalized image plane.
pub trait DistortionModel {
    fn distort(&self, n_undist: &Vec2) -> Vec2;
    fn undistort(&self, n_dist: &Vec2) -> Vec2;
}

/// The identity distortion model.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct NoDistortion;

impl DistortionModel for NoDistortion {
    fn distort(&self, n_undist: &Vec2) -> Vec2 {
        *n_undist
    }

    fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        *n_dist
    }
}

/// Brown-Conrady distortion with three radial and two tangential terms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: Real,
    pub k2: Real,
    pub k3: Real,
    pub p1: Real,
    pub p2: Real,
    /// Fixed-point iterations used by `undistort` (0 means the default of 8).
    pub iters: u32,
}

impl BrownConrady5 {
    /// Distortion-free coefficients.
    pub fn zero() -> Self {
        Self {
            iters: 8,
            ..Self::default()
        }
    }

    fn distort_impl(&self, x: Real, y: Real) -> (Real, Real) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        (x * radial + x_tan, y * radial + y_tan)
    }
}

impl DistortionModel for BrownConrady5 {
    fn distort(&self, n_undist: &Vec2) -> Vec2 {
        let (xd, yd) = self.distort_impl(n_undist.x, n_undist.y);
        Vec2::new(xd, yd)
    }

    fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        let mut x = n_dist.x;
        let mut y = n_dist.y;

        let iters = if self.iters == 0 { 8 } else { self.iters };
        for _ in 0..iters {
            let (xd, yd) = self.distort_impl(x, y);
            x -= xd - n_dist.x;
            y -= yd - n_dist.y;
        }
        Vec2::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_coefficients_are_identity() {
        let d = BrownConrady5::zero();
        let n = Vec2::new(0.2, -0.15);
        assert_eq!(d.distort(&n), n);
        assert_eq!(d.undistort(&n), n);
    }

    #[test]
    fn undistort_inverts_distort() {
        let d = BrownConrady5 {
            k1: -0.25,
            k2: 0.08,
            k3: 0.0,
            p1: 0.001,
            p2: -0.0015,
            iters: 10,
        };
        let n = Vec2::new(-0.18, 0.11);
        let back = d.undistort(&d.distort(&n));
        assert!((back - n).norm() < 1e-8, "roundtrip error {}", (back - n).norm());
    }
}
