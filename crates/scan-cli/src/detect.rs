//! Adapters wiring the `chess-corners` / `calib-targets` detection stack
//! into the collector's [`TargetDetector`] trait.

use anyhow::{Context, Result};
use calib_targets::aruco::builtins;
use calib_targets::charuco::{CharucoBoardSpec, CharucoDetectorParams, MarkerLayout};
use calib_targets::chessboard::ChessboardParams;
use calib_targets::core::TargetDetection;
use calib_targets::detect;
use chess_corners::ChessConfig;
use image::GrayImage;
use scan_core::{CalibrationTarget, Detection, MarkerDictionary, Pt2};
use scan_pipeline::{DetectorParams, TargetDetector};

fn chess_config(refine: bool) -> ChessConfig {
    if refine {
        // Multiscale refinement: slower, sub-pixel accurate.
        ChessConfig::default()
    } else {
        detect::default_chess_config()
    }
}

fn dictionary_name(dict: MarkerDictionary) -> &'static str {
    match dict {
        MarkerDictionary::Dict4x4_50 => "DICT_4X4_50",
        MarkerDictionary::Dict4x4_100 => "DICT_4X4_100",
        MarkerDictionary::Dict4x4_250 => "DICT_4X4_250",
        MarkerDictionary::Dict4x4_1000 => "DICT_4X4_1000",
        MarkerDictionary::Dict5x5_1000 => "DICT_5X5_1000",
        MarkerDictionary::Dict6x6_1000 => "DICT_6X6_1000",
    }
}

/// Convert a labeled-corner detection into the capture-set form.
///
/// Corner identifiers come from the detector when present (marker boards),
/// otherwise from normalized grid coordinates. Plain chessboards carry a
/// 180-degree ambiguity; the grid is canonicalized so corner (0, 0) is the
/// one nearer the image origin, keeping both cameras consistent.
fn to_detection(found: &TargetDetection, corners_per_row: u32) -> Result<Detection> {
    let with_grid: Vec<_> = found
        .corners
        .iter()
        .filter_map(|c| c.grid.map(|g| (g, c)))
        .collect();
    if with_grid.is_empty() {
        return Ok(Detection::empty());
    }

    let min_i = with_grid.iter().map(|(g, _)| g.i).min().unwrap_or(0);
    let min_j = with_grid.iter().map(|(g, _)| g.j).min().unwrap_or(0);
    let max_i = with_grid.iter().map(|(g, _)| g.i).max().unwrap_or(0);
    let max_j = with_grid.iter().map(|(g, _)| g.j).max().unwrap_or(0);

    let origin = with_grid
        .iter()
        .find(|(g, _)| g.i == min_i && g.j == min_j)
        .map(|(_, c)| c.position);
    let opposite = with_grid
        .iter()
        .find(|(g, _)| g.i == max_i && g.j == max_j)
        .map(|(_, c)| c.position);
    let flip = match (origin, opposite) {
        (Some(o), Some(p)) => (o.x + o.y) > (p.x + p.y),
        _ => false,
    };

    let mut points = Vec::with_capacity(with_grid.len());
    let mut ids = Vec::with_capacity(with_grid.len());
    for (grid, corner) in &with_grid {
        let id = match corner.id {
            Some(id) => id,
            None => {
                let (mut i, mut j) = (grid.i - min_i, grid.j - min_j);
                if flip {
                    i = (max_i - min_i) - i;
                    j = (max_j - min_j) - j;
                }
                j as u32 * corners_per_row + i as u32
            }
        };
        points.push(Pt2::new(corner.position.x as f64, corner.position.y as f64));
        ids.push(id);
    }

    Detection::with_ids(points, ids)
}

/// Plain chessboard detection via the ChESS corner detector plus grid
/// fitting.
pub struct ChessboardDetector {
    target: CalibrationTarget,
    config: ChessConfig,
}

impl ChessboardDetector {
    pub fn new(target: &CalibrationTarget, refine: bool) -> Self {
        Self {
            target: target.clone(),
            config: chess_config(refine),
        }
    }
}

impl TargetDetector for ChessboardDetector {
    fn detect(&self, image: &GrayImage) -> Result<Detection> {
        let params = ChessboardParams {
            expected_rows: Some((self.target.squares_y - 1) as _),
            expected_cols: Some((self.target.squares_x - 1) as _),
            ..ChessboardParams::default()
        };
        match detect::detect_chessboard(image, &self.config, params) {
            Some(found) => to_detection(&found.detection, self.target.squares_x - 1),
            None => Ok(Detection::empty()),
        }
    }
}

/// ChArUco board detection: chess grid plus embedded marker decoding.
pub struct CharucoDetector {
    target: CalibrationTarget,
    config: ChessConfig,
    params: CharucoDetectorParams,
    board: CharucoBoardSpec,
}

impl CharucoDetector {
    pub fn new(
        target: &CalibrationTarget,
        refine: bool,
        detector_params: Option<&DetectorParams>,
    ) -> Result<Self> {
        let dictionary = target
            .dictionary
            .context("charuco detection requires a marker dictionary")?;
        let marker_len = target
            .marker_len
            .context("charuco detection requires a marker side length")?;

        let dict = builtins::builtin_dictionary(dictionary_name(dictionary))
            .with_context(|| format!("unknown dictionary {:?}", dictionary))?;
        let board = CharucoBoardSpec {
            rows: target.squares_y,
            cols: target.squares_x,
            cell_size: target.square_len as f32,
            marker_size_rel: (marker_len / target.square_len) as f32,
            dictionary: dict,
            marker_layout: MarkerLayout::OpenCvCharuco,
        };

        let mut params = CharucoDetectorParams::for_board(&board);
        if let Some(dp) = detector_params {
            // Error-correction budget in bits, derived from the configured
            // rate and the dictionary payload size.
            let bits = board.dictionary.bit_count() as f64;
            params.max_hamming = (dp.error_correction_rate * bits).floor() as u8;
        }

        Ok(Self {
            target: target.clone(),
            config: chess_config(refine),
            params,
            board,
        })
    }
}

impl TargetDetector for CharucoDetector {
    fn detect(&self, image: &GrayImage) -> Result<Detection> {
        match detect::detect_charuco(image, &self.config, self.board.clone(), self.params.clone())
        {
            Ok(found) => to_detection(&found.detection, self.target.squares_x - 1),
            Err(_) => Ok(Detection::empty()),
        }
    }
}
