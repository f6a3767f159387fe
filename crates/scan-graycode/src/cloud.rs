//! Disparity-to-3D reprojection with per-point color.

use crate::decode::DecodeError;
use crate::disparity::DisparityMap;
use image::RgbImage;
use scan_core::Mat4;

/// One reconstructed point: position in the rectified camera-A frame plus
/// the RGB color sampled from the rectified color view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudPoint {
    pub position: [f32; 3],
    pub color: [u8; 3],
}

/// Reproject a masked disparity map to 3D through the disparity-to-depth
/// matrix Q.
///
/// `mask` is the foreground mask in row-major pixel order (see
/// [`DisparityMap::foreground_mask`]); `color` is the rectified camera-A
/// color image sampled at the same pixel. Sentinel and masked-out pixels
/// produce no point, so an all-sentinel map yields an empty cloud.
pub fn reproject_disparity(
    disparity: &DisparityMap,
    q: &Mat4,
    mask: &[bool],
    color: &RgbImage,
) -> Result<Vec<CloudPoint>, DecodeError> {
    if color.width() != disparity.width() || color.height() != disparity.height() {
        return Err(DecodeError::ImageSizeMismatch {
            index: 0,
            got_w: color.width(),
            got_h: color.height(),
            want_w: disparity.width(),
            want_h: disparity.height(),
        });
    }
    debug_assert_eq!(
        mask.len(),
        (disparity.width() * disparity.height()) as usize
    );

    let mut points = Vec::new();
    for y in 0..disparity.height() {
        for x in 0..disparity.width() {
            let idx = (y * disparity.width() + x) as usize;
            if !mask[idx] || !disparity.is_valid(x, y) {
                continue;
            }
            let d = disparity.get(x, y) as f64;

            let hom = q * nalgebra::Vector4::new(x as f64, y as f64, d, 1.0);
            if hom.w.abs() < 1e-12 {
                continue;
            }
            let position = [
                (hom.x / hom.w) as f32,
                (hom.y / hom.w) as f32,
                (hom.z / hom.w) as f32,
            ];

            points.push(CloudPoint {
                position,
                color: color.get_pixel(x, y).0,
            });
        }
    }

    Ok(points)
}
