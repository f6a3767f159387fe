//! Marker-detector parameter file.
//!
//! Detection runs behind the [`TargetDetector`](crate::TargetDetector)
//! trait, but the numeric knobs of a marker detector are operator-facing
//! configuration and load from a JSON document. Every field is required: a
//! missing file or a missing key is an explicit error, never a silent
//! default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Corner sub-pixel refinement strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerRefinementMethod {
    None,
    Subpixel,
    Contour,
}

/// Numeric detector configuration, one field per tunable stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorParams {
    pub adaptive_thresh_win_size_min: u32,
    pub adaptive_thresh_win_size_max: u32,
    pub adaptive_thresh_win_size_step: u32,
    pub adaptive_thresh_constant: f64,
    pub min_marker_perimeter_rate: f64,
    pub max_marker_perimeter_rate: f64,
    pub polygonal_approx_accuracy_rate: f64,
    pub min_corner_distance_rate: f64,
    pub min_distance_to_border: u32,
    pub min_marker_distance_rate: f64,
    pub corner_refinement_method: CornerRefinementMethod,
    pub corner_refinement_win_size: u32,
    pub corner_refinement_max_iterations: u32,
    pub corner_refinement_min_accuracy: f64,
    pub marker_border_bits: u32,
    pub perspective_remove_pixel_per_cell: u32,
    pub perspective_remove_ignored_margin_per_cell: f64,
    pub max_erroneous_bits_in_border_rate: f64,
    pub min_otsu_std_dev: f64,
    pub error_correction_rate: f64,
}

/// Load detector parameters from a JSON file.
pub fn load_detector_params(path: &Path) -> Result<DetectorParams> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to open detector parameters {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("invalid detector parameters in {}", path.display()))
}
