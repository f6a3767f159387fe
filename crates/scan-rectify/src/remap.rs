//! Per-pixel remap tables and image resampling.
//!
//! A [`RemapTable`] stores, for every rectified pixel, the source position
//! in the original (distorted, unrectified) image. Tables are built once
//! per session and reused for every frame.

use image::{GrayImage, Rgb, RgbImage};
use scan_core::{CameraModel, DistortionModel, ImageSize, Mat3, Mat3x4, Real, Vec2, Vec3};

/// Resampling kernel used by [`remap_gray`] / [`remap_rgb`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Bilinear,
}

/// Inverse lookup table: rectified pixel -> source pixel coordinates.
///
/// Out-of-view pixels map to coordinates outside the source image and
/// resolve to black during resampling (constant border).
#[derive(Debug, Clone)]
pub struct RemapTable {
    pub width: u32,
    pub height: u32,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl RemapTable {
    /// Source coordinates for a rectified pixel.
    #[inline]
    pub fn source(&self, x: u32, y: u32) -> (f32, f32) {
        let idx = (y * self.width + x) as usize;
        (self.map_x[idx], self.map_y[idx])
    }
}

const OUT_OF_VIEW: f32 = -1.0e6;

/// Build the rectification lookup table for one camera.
///
/// For each output pixel the rectified ray is rotated back into the original
/// camera frame (`r_rect` transposed), distorted, and projected through the
/// original intrinsics, mirroring the classic undistort-rectify map
/// construction.
pub fn build_rectify_map(
    camera: &CameraModel,
    r_rect: &Mat3,
    p_new: &Mat3x4,
    size: ImageSize,
) -> RemapTable {
    let f = p_new[(0, 0)];
    let fy = p_new[(1, 1)];
    let cx = p_new[(0, 2)];
    let cy = p_new[(1, 2)];
    let r_inv = r_rect.transpose();

    let mut map_x = Vec::with_capacity((size.width * size.height) as usize);
    let mut map_y = Vec::with_capacity((size.width * size.height) as usize);

    for v in 0..size.height {
        for u in 0..size.width {
            let x = (u as Real - cx) / f;
            let y = (v as Real - cy) / fy;
            let w = r_inv * Vec3::new(x, y, 1.0);
            if w.z <= 0.0 {
                map_x.push(OUT_OF_VIEW);
                map_y.push(OUT_OF_VIEW);
                continue;
            }
            let n_undist = Vec2::new(w.x / w.z, w.y / w.z);
            let n_dist = camera.distortion.distort(&n_undist);
            let src = camera.intrinsics.to_pixel(&n_dist);
            map_x.push(src.x as f32);
            map_y.push(src.y as f32);
        }
    }

    RemapTable {
        width: size.width,
        height: size.height,
        map_x,
        map_y,
    }
}

/// Resample a grayscale image through a remap table.
///
/// Pixels whose source falls outside the input resolve to 0 (constant
/// border).
pub fn remap_gray(src: &GrayImage, table: &RemapTable, interp: Interpolation) -> GrayImage {
    let mut out = GrayImage::new(table.width, table.height);
    for y in 0..table.height {
        for x in 0..table.width {
            let (sx, sy) = table.source(x, y);
            let value = match interp {
                Interpolation::Nearest => sample_nearest_gray(src, sx, sy),
                Interpolation::Bilinear => sample_bilinear_gray(src, sx, sy),
            };
            out.put_pixel(x, y, image::Luma([value]));
        }
    }
    out
}

/// Resample an RGB image through a remap table.
pub fn remap_rgb(src: &RgbImage, table: &RemapTable, interp: Interpolation) -> RgbImage {
    let mut out = RgbImage::new(table.width, table.height);
    for y in 0..table.height {
        for x in 0..table.width {
            let (sx, sy) = table.source(x, y);
            let value = match interp {
                Interpolation::Nearest => sample_nearest_rgb(src, sx, sy),
                Interpolation::Bilinear => sample_bilinear_rgb(src, sx, sy),
            };
            out.put_pixel(x, y, Rgb(value));
        }
    }
    out
}

fn sample_nearest_gray(src: &GrayImage, sx: f32, sy: f32) -> u8 {
    let x = sx.round();
    let y = sy.round();
    if x < 0.0 || y < 0.0 || x >= src.width() as f32 || y >= src.height() as f32 {
        return 0;
    }
    src.get_pixel(x as u32, y as u32).0[0]
}

fn sample_bilinear_gray(src: &GrayImage, sx: f32, sy: f32) -> u8 {
    let Some(((x0, y0), (fx, fy))) = bilinear_setup(src.width(), src.height(), sx, sy) else {
        return 0;
    };
    let p = |dx: u32, dy: u32| src.get_pixel(x0 + dx, y0 + dy).0[0] as f32;
    let top = p(0, 0) * (1.0 - fx) + p(1, 0) * fx;
    let bottom = p(0, 1) * (1.0 - fx) + p(1, 1) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

fn sample_nearest_rgb(src: &RgbImage, sx: f32, sy: f32) -> [u8; 3] {
    let x = sx.round();
    let y = sy.round();
    if x < 0.0 || y < 0.0 || x >= src.width() as f32 || y >= src.height() as f32 {
        return [0, 0, 0];
    }
    src.get_pixel(x as u32, y as u32).0
}

fn sample_bilinear_rgb(src: &RgbImage, sx: f32, sy: f32) -> [u8; 3] {
    let Some(((x0, y0), (fx, fy))) = bilinear_setup(src.width(), src.height(), sx, sy) else {
        return [0, 0, 0];
    };
    let mut out = [0u8; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let p = |dx: u32, dy: u32| src.get_pixel(x0 + dx, y0 + dy).0[c] as f32;
        let top = p(0, 0) * (1.0 - fx) + p(1, 0) * fx;
        let bottom = p(0, 1) * (1.0 - fx) + p(1, 1) * fx;
        *slot = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[allow(clippy::type_complexity)]
fn bilinear_setup(
    width: u32,
    height: u32,
    sx: f32,
    sy: f32,
) -> Option<((u32, u32), (f32, f32))> {
    if sx < 0.0 || sy < 0.0 || sx > (width - 1) as f32 || sy > (height - 1) as f32 {
        return None;
    }
    let x0 = (sx.floor() as u32).min(width - 2);
    let y0 = (sy.floor() as u32).min(height - 2);
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;
    Some(((x0, y0), (fx, fy)))
}
