//! Disparity maps and foreground separation.

use scan_core::Real;

/// Sentinel for pixels without a stereo correspondence.
pub const NO_MATCH: f32 = f32::NAN;

/// Dense per-pixel disparity aligned with the rectified camera-A frame.
#[derive(Debug, Clone)]
pub struct DisparityMap {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DisparityMap {
    /// A map with every pixel marked [`NO_MATCH`].
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![NO_MATCH; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        self.data[(y * self.width + x) as usize] = value;
    }

    /// Whether the pixel carries a valid correspondence.
    #[inline]
    pub fn is_valid(&self, x: u32, y: u32) -> bool {
        !self.get(x, y).is_nan()
    }

    /// All valid disparity values.
    pub fn valid_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().copied().filter(|v| !v.is_nan())
    }

    /// Number of valid pixels.
    pub fn valid_count(&self) -> usize {
        self.valid_values().count()
    }

    /// Foreground mask separating the subject from the background by the
    /// bimodal split of valid disparity magnitudes.
    ///
    /// When the magnitude histogram is not actually bimodal (a flat or
    /// single-valued map) every valid pixel is treated as foreground rather
    /// than discarding the whole cloud.
    pub fn foreground_mask(&self) -> Vec<bool> {
        let magnitudes: Vec<f32> = self.valid_values().map(f32::abs).collect();
        let threshold = otsu_split(&magnitudes);

        self.data
            .iter()
            .map(|v| {
                if v.is_nan() {
                    return false;
                }
                match threshold {
                    Some(t) => v.abs() >= t,
                    None => true,
                }
            })
            .collect()
    }
}

/// Otsu's bimodal threshold over a set of magnitudes.
///
/// Returns `None` when no meaningful split exists: fewer than two distinct
/// values, or a between-class variance of zero (unimodal histogram).
pub fn otsu_split(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }

    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !(max > min) {
        return None;
    }

    const BINS: usize = 256;
    let scale = (BINS - 1) as Real / (max - min) as Real;
    let mut histogram = [0u32; BINS];
    for v in values {
        let bin = (((v - min) as Real) * scale).round() as usize;
        histogram[bin.min(BINS - 1)] += 1;
    }

    let total = values.len() as Real;
    let total_mean: Real = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as Real * c as Real)
        .sum::<Real>()
        / total;

    let mut best_between = 0.0;
    let mut best_bin = 0usize;
    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;

    for (bin, &count) in histogram.iter().enumerate() {
        weight_bg += count as Real;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += bin as Real * count as Real;

        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (total_mean * total - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if between > best_between {
            best_between = between;
            best_bin = bin;
        }
    }

    if best_between <= 0.0 {
        return None;
    }

    // Split point between the chosen bin and the next one.
    Some(min + ((best_bin as f32 + 0.5) / scale as f32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_map_is_all_no_match() {
        let map = DisparityMap::new(8, 6);
        assert_eq!(map.valid_count(), 0);
        assert!(!map.is_valid(3, 2));
        assert!(map.foreground_mask().iter().all(|m| !m));
    }

    #[test]
    fn otsu_separates_bimodal_values() {
        let mut values = vec![2.0f32; 50];
        values.extend(vec![40.0f32; 50]);
        let t = otsu_split(&values).expect("bimodal split");
        assert!(t > 2.0 && t < 40.0, "threshold {}", t);
    }

    #[test]
    fn otsu_is_none_for_unimodal_values() {
        assert_eq!(otsu_split(&[]), None);
        assert_eq!(otsu_split(&[7.5; 100]), None);
    }

    #[test]
    fn unimodal_map_keeps_all_points_foreground() {
        let mut map = DisparityMap::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                map.set(x, y, 12.5);
            }
        }
        let mask = map.foreground_mask();
        assert!(mask.iter().all(|m| *m));
    }

    #[test]
    fn bimodal_map_drops_background() {
        let mut map = DisparityMap::new(10, 10);
        for y in 0..10 {
            for x in 0..10 {
                // Left half far (small disparity), right half near.
                map.set(x, y, if x < 5 { 3.0 } else { 45.0 });
            }
        }
        let mask = map.foreground_mask();
        let kept = mask.iter().filter(|m| **m).count();
        assert_eq!(kept, 50);
        assert!(mask[5]); // (5, 0) is near
        assert!(!mask[0]); // (0, 0) is far
    }
}
