//! Per-pixel codeword decoding and stereo correspondence.

use crate::disparity::DisparityMap;
use crate::pattern::{gray_to_binary, GrayCodePattern};
use image::GrayImage;
use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("expected {expected} pattern images, got {got}")]
    PatternCountMismatch { expected: usize, got: usize },
    #[error("image {index} is {got_w}x{got_h}, expected {want_w}x{want_h}")]
    ImageSizeMismatch {
        index: usize,
        got_w: u32,
        got_h: u32,
        want_w: u32,
        want_h: u32,
    },
    #[error("codeword maps are {0}x{1} and {2}x{3}, expected equal sizes")]
    MapSizeMismatch(u32, u32, u32, u32),
    #[error("empty image supplied at index {0}")]
    EmptyImage(usize),
}

/// Thresholds controlling shadow and unreliable-pixel rejection.
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    /// Minimum |normal - inverse| for a bit read to count as reliable.
    pub white_threshold: u8,
    /// Minimum white-minus-black difference for a pixel to be lit at all.
    pub black_threshold: u8,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            white_threshold: 5,
            black_threshold: 40,
        }
    }
}

/// Per-pixel projector codewords for one camera view.
pub struct CodewordMap {
    width: u32,
    height: u32,
    /// `(projector column, projector row)` per pixel; `None` for shadowed or
    /// unreliable pixels.
    codes: Vec<Option<(u32, u32)>>,
}

impl CodewordMap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn code(&self, x: u32, y: u32) -> Option<(u32, u32)> {
        self.codes[(y * self.width + x) as usize]
    }

    /// Number of pixels carrying a decoded codeword.
    pub fn decoded_count(&self) -> usize {
        self.codes.iter().filter(|c| c.is_some()).count()
    }
}

/// Decode one camera's captured pattern stack into projector codewords.
///
/// `images` holds the rectified pattern captures in projection order
/// (column bit planes then row bit planes, normal followed by inverse);
/// `white`/`black` are the rectified all-white and all-black references
/// used for shadow rejection.
pub fn decode_codewords(
    pattern: &GrayCodePattern,
    images: &[GrayImage],
    white: &GrayImage,
    black: &GrayImage,
    params: &DecodeParams,
) -> Result<CodewordMap, DecodeError> {
    if images.len() != pattern.pattern_count() {
        return Err(DecodeError::PatternCountMismatch {
            expected: pattern.pattern_count(),
            got: images.len(),
        });
    }

    let width = white.width();
    let height = white.height();
    if width == 0 || height == 0 {
        return Err(DecodeError::EmptyImage(0));
    }
    for (index, img) in images.iter().chain([white, black]).enumerate() {
        if img.width() != width || img.height() != height {
            return Err(DecodeError::ImageSizeMismatch {
                index,
                got_w: img.width(),
                got_h: img.height(),
                want_w: width,
                want_h: height,
            });
        }
    }

    let col_bits = pattern.col_bits();
    let row_bits = pattern.row_bits();
    let mut codes = vec![None; (width * height) as usize];

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;

            let lit = white.get_pixel(x, y).0[0];
            let dark = black.get_pixel(x, y).0[0];
            if lit.saturating_sub(dark) <= params.black_threshold {
                continue; // shadowed
            }

            let mut gray_col = 0u32;
            let mut gray_row = 0u32;
            let mut reliable = true;

            for bit in 0..(col_bits + row_bits) {
                let normal = images[(2 * bit) as usize].get_pixel(x, y).0[0] as i16;
                let inverse = images[(2 * bit + 1) as usize].get_pixel(x, y).0[0] as i16;
                let diff = normal - inverse;
                if diff.unsigned_abs() < params.white_threshold as u16 {
                    reliable = false;
                    break;
                }
                let one = diff > 0;
                if bit < col_bits {
                    gray_col = (gray_col << 1) | one as u32;
                } else {
                    gray_row = (gray_row << 1) | one as u32;
                }
            }
            if !reliable {
                continue;
            }

            let col = gray_to_binary(gray_col);
            let row = gray_to_binary(gray_row);
            if col >= pattern.width || row >= pattern.height {
                continue; // outside the projected area
            }
            codes[idx] = Some((col, row));
        }
    }

    let map = CodewordMap {
        width,
        height,
        codes,
    };
    debug!(
        "decoded {} / {} pixels",
        map.decoded_count(),
        width as usize * height as usize
    );
    Ok(map)
}

/// Match projector codewords across the two rectified views and produce the
/// disparity map, aligned with camera A.
///
/// Every projector cell collects the camera pixels that decoded to it; for
/// cells seen by both cameras the disparity is the difference of the mean
/// x-coordinates, written at each contributing camera-A pixel. Pixels whose
/// cell has no camera-B observation keep the no-match sentinel.
pub fn compute_disparity(
    map_a: &CodewordMap,
    map_b: &CodewordMap,
    pattern: &GrayCodePattern,
) -> Result<DisparityMap, DecodeError> {
    if map_a.width != map_b.width || map_a.height != map_b.height {
        return Err(DecodeError::MapSizeMismatch(
            map_a.width,
            map_a.height,
            map_b.width,
            map_b.height,
        ));
    }

    let cells = (pattern.width * pattern.height) as usize;
    let mut sum_a = vec![(0.0f64, 0u32); cells];
    let mut sum_b = vec![(0.0f64, 0u32); cells];

    let cell_of = |col: u32, row: u32| (row * pattern.width + col) as usize;

    for y in 0..map_a.height {
        for x in 0..map_a.width {
            if let Some((col, row)) = map_a.code(x, y) {
                let cell = &mut sum_a[cell_of(col, row)];
                cell.0 += x as f64;
                cell.1 += 1;
            }
            if let Some((col, row)) = map_b.code(x, y) {
                let cell = &mut sum_b[cell_of(col, row)];
                cell.0 += x as f64;
                cell.1 += 1;
            }
        }
    }

    let mut disparity = DisparityMap::new(map_a.width, map_a.height);
    for y in 0..map_a.height {
        for x in 0..map_a.width {
            let Some((col, row)) = map_a.code(x, y) else {
                continue;
            };
            let cell = cell_of(col, row);
            let (ax, ac) = sum_a[cell];
            let (bx, bc) = sum_b[cell];
            if ac == 0 || bc == 0 {
                continue;
            }
            let value = ax / ac as f64 - bx / bc as f64;
            disparity.set(x, y, value as f32);
        }
    }

    Ok(disparity)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Captured stack for a camera looking straight at the projector with a
    /// constant horizontal pixel shift.
    fn shifted_capture(pattern: &GrayCodePattern, shift: i64) -> (Vec<GrayImage>, GrayImage, GrayImage) {
        let w = pattern.width;
        let h = pattern.height;
        let source = pattern.generate();

        let sample = |img: &GrayImage, x: u32, y: u32| -> u8 {
            let sx = x as i64 - shift;
            if sx < 0 || sx >= w as i64 {
                0
            } else {
                img.get_pixel(sx as u32, y).0[0]
            }
        };

        let images: Vec<GrayImage> = source
            .iter()
            .map(|img| GrayImage::from_fn(w, h, |x, y| image::Luma([sample(img, x, y)])))
            .collect();

        let white = GrayImage::from_fn(w, h, |x, _| {
            let sx = x as i64 - shift;
            image::Luma([if sx < 0 || sx >= w as i64 { 0 } else { 255 }])
        });
        let black = GrayImage::from_pixel(w, h, image::Luma([0]));

        (images, white, black)
    }

    #[test]
    fn decodes_projector_aligned_capture() {
        let pattern = GrayCodePattern::new(32, 16).unwrap();
        let (images, white, black) = shifted_capture(&pattern, 0);
        let map =
            decode_codewords(&pattern, &images, &white, &black, &DecodeParams::default()).unwrap();

        for y in 0..16 {
            for x in 0..32 {
                assert_eq!(map.code(x, y), Some((x, y)), "pixel ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn shadowed_pixels_decode_to_none() {
        let pattern = GrayCodePattern::new(16, 8).unwrap();
        let images = pattern.generate();
        let dark = GrayImage::from_pixel(16, 8, image::Luma([10]));
        let map = decode_codewords(
            &pattern,
            &images,
            &dark.clone(),
            &dark,
            &DecodeParams::default(),
        )
        .unwrap();
        assert_eq!(map.decoded_count(), 0);
    }

    #[test]
    fn wrong_pattern_count_is_rejected() {
        let pattern = GrayCodePattern::new(16, 8).unwrap();
        let images = pattern.generate();
        let white = pattern.white_image();
        let black = pattern.black_image();
        let result = decode_codewords(
            &pattern,
            &images[..images.len() - 1],
            &white,
            &black,
            &DecodeParams::default(),
        );
        assert!(matches!(
            result,
            Err(DecodeError::PatternCountMismatch { .. })
        ));
    }

    #[test]
    fn horizontal_shift_becomes_uniform_disparity() {
        let pattern = GrayCodePattern::new(64, 8).unwrap();
        let params = DecodeParams::default();

        let (img_a, white_a, black_a) = shifted_capture(&pattern, 6);
        let (img_b, white_b, black_b) = shifted_capture(&pattern, 0);

        let map_a = decode_codewords(&pattern, &img_a, &white_a, &black_a, &params).unwrap();
        let map_b = decode_codewords(&pattern, &img_b, &white_b, &black_b, &params).unwrap();

        let disparity = compute_disparity(&map_a, &map_b, &pattern).unwrap();
        assert!(disparity.valid_count() > 0);
        for v in disparity.valid_values() {
            assert!((v - 6.0).abs() < 1e-6, "disparity {}", v);
        }
    }

    #[test]
    fn unmatched_codewords_stay_no_match() {
        let pattern = GrayCodePattern::new(16, 8).unwrap();
        let params = DecodeParams::default();

        let (img_a, white_a, black_a) = shifted_capture(&pattern, 0);
        let map_a = decode_codewords(&pattern, &img_a, &white_a, &black_a, &params).unwrap();

        // Camera B saw nothing but shadow.
        let dark = GrayImage::from_pixel(16, 8, image::Luma([0]));
        let map_b =
            decode_codewords(&pattern, &pattern.generate(), &dark.clone(), &dark, &params).unwrap();

        let disparity = compute_disparity(&map_a, &map_b, &pattern).unwrap();
        assert_eq!(disparity.valid_count(), 0);
    }
}
