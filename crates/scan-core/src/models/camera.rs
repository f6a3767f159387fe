use crate::{BrownConrady5, DistortionModel, Intrinsics, Pt3, Real, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Image dimensions a camera was calibrated at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel coordinates of the image center.
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width as Real * 0.5, self.height as Real * 0.5)
    }
}

/// A calibrated pinhole camera: intrinsics, Brown-Conrady distortion and the
/// image size the parameters were estimated at.
///
/// Projection pipeline: camera-frame point -> perspective division ->
/// distortion -> intrinsics -> pixel.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: BrownConrady5,
    pub image_size: ImageSize,
}

impl CameraModel {
    pub fn new(intrinsics: Intrinsics, distortion: BrownConrady5, image_size: ImageSize) -> Self {
        Self {
            intrinsics,
            distortion,
            image_size,
        }
    }

    /// Project a camera-frame point into pixel coordinates.
    ///
    /// Returns `None` for points at or behind the camera plane.
    pub fn project_point(&self, p_c: &Pt3) -> Option<Vec2> {
        if p_c.z <= 0.0 {
            return None;
        }
        let n_undist = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let n_dist = self.distortion.distort(&n_undist);
        Some(self.intrinsics.to_pixel(&n_dist))
    }

    /// Back-project a pixel into a unit direction in the camera frame.
    pub fn backproject_pixel(&self, px: &Vec2) -> Vec3 {
        let n_dist = self.intrinsics.from_pixel(px);
        let n_undist = self.distortion.undistort(&n_dist);
        let dir = Vec3::new(n_undist.x, n_undist.y, 1.0);
        dir / dir.norm()
    }

    /// Undistorted normalized coordinates for a distorted pixel observation.
    pub fn undistort_pixel(&self, px: &Vec2) -> Vec2 {
        let n_dist = self.intrinsics.from_pixel(px);
        self.distortion.undistort(&n_dist)
    }
}
