//! Per-frame target detections and 2D-3D observation sets.

use crate::{CalibrationTarget, Pt2, Pt3, Real};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Target detection for one camera at one frame.
///
/// `ids` carries the corner identifiers for marker-based boards where only a
/// subset of corners may be visible. Plain chessboard detectors report every
/// inner corner in board order and leave `ids` empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Detection {
    /// Detected corner positions in pixel coordinates.
    pub points: Vec<Pt2>,
    /// Corner identifiers, parallel to `points` (marker-based boards only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<u32>>,
}

impl Detection {
    /// A detection with every board corner found, in board order.
    pub fn full(points: Vec<Pt2>) -> Self {
        Self { points, ids: None }
    }

    /// A detection of identified corners (marker-based boards).
    pub fn with_ids(points: Vec<Pt2>, ids: Vec<u32>) -> Result<Self> {
        ensure!(
            points.len() == ids.len(),
            "point / id counts must match: {} vs {}",
            points.len(),
            ids.len()
        );
        Ok(Self {
            points,
            ids: Some(ids),
        })
    }

    /// An empty detection (nothing found, or the frame was unreadable).
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether this detection satisfies the target's completeness criterion.
    ///
    /// For plain chessboards this means every inner corner was found; for
    /// marker-based boards the target's minimum-coverage policy applies.
    pub fn is_complete(&self, target: &CalibrationTarget) -> bool {
        self.len() >= target.required_corner_count()
    }

    /// Identifier of the observation at `idx`.
    ///
    /// Falls back to the positional index for full-board detections.
    pub fn id_at(&self, idx: usize) -> u32 {
        match &self.ids {
            Some(ids) => ids[idx],
            None => idx as u32,
        }
    }

    /// Pair the detected corners with their ground-truth board coordinates.
    ///
    /// Unknown identifiers are an error: a detector reporting a corner the
    /// board does not have indicates a board-description mismatch.
    pub fn observations(&self, target: &CalibrationTarget) -> Result<Observations> {
        let mut points_3d = Vec::with_capacity(self.len());
        for idx in 0..self.len() {
            let id = self.id_at(idx);
            let Some(p3) = target.corner_point(id) else {
                anyhow::bail!(
                    "corner id {} out of range for a {}x{} board",
                    id,
                    target.squares_x,
                    target.squares_y
                );
            };
            points_3d.push(p3);
        }
        Observations::new(points_3d, self.points.clone())
    }
}

/// A single view's 2D-3D point correspondences.
///
/// This is the canonical observation type consumed by the per-camera and
/// stereo calibrators.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Observations {
    /// 3D points in the target frame (Z = 0 plane).
    pub points_3d: Vec<Pt3>,
    /// Corresponding 2D pixel observations.
    pub points_2d: Vec<Pt2>,
}

impl Observations {
    /// Construct observations, validating that the point counts match.
    pub fn new(points_3d: Vec<Pt3>, points_2d: Vec<Pt2>) -> Result<Self> {
        ensure!(
            points_3d.len() == points_2d.len(),
            "3D / 2D point counts must match: {} vs {}",
            points_3d.len(),
            points_2d.len()
        );
        Ok(Self {
            points_3d,
            points_2d,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points_3d.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points_3d.is_empty()
    }

    /// Board-plane 2D coordinates of the 3D points (drops Z).
    pub fn planar_points(&self) -> Vec<Pt2> {
        self.points_3d
            .iter()
            .map(|p3| Pt2::new(p3.x, p3.y))
            .collect()
    }

    /// Iterate over (3D point, 2D point) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Pt3, &Pt2)> {
        self.points_3d.iter().zip(self.points_2d.iter())
    }
}

/// Summary statistics for reprojection errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReprojectionStats {
    /// Mean reprojection error in pixels.
    pub mean: Real,
    /// Root mean square error in pixels.
    pub rms: Real,
    /// Maximum reprojection error in pixels.
    pub max: Real,
    /// Number of points evaluated.
    pub count: usize,
}

impl ReprojectionStats {
    /// Compute statistics from a collection of per-point errors.
    pub fn from_errors(errors: &[Real]) -> Self {
        if errors.is_empty() {
            return Self {
                mean: 0.0,
                rms: 0.0,
                max: 0.0,
                count: 0,
            };
        }

        let sum: Real = errors.iter().sum();
        let sum_sq: Real = errors.iter().map(|e| e * e).sum();
        let max = errors.iter().cloned().fold(0.0_f64, Real::max);
        let n = errors.len() as Real;

        Self {
            mean: sum / n,
            rms: (sum_sq / n).sqrt(),
            max,
            count: errors.len(),
        }
    }
}
