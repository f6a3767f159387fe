//! Physical calibration-target descriptions.
//!
//! A target describes the planar board geometry used during capture. Both
//! cameras observe the same rigid board, so the ground-truth corner
//! coordinates produced here are shared by every camera at a given frame.

use crate::{Pt2, Pt3, Real};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Predefined fiducial-marker dictionaries for marker-based boards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerDictionary {
    Dict4x4_50,
    Dict4x4_100,
    Dict4x4_250,
    Dict4x4_1000,
    Dict5x5_1000,
    Dict6x6_1000,
}

impl MarkerDictionary {
    /// Resolve a numeric dictionary selector as used on the command line.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::Dict4x4_50),
            1 => Some(Self::Dict4x4_100),
            2 => Some(Self::Dict4x4_250),
            3 => Some(Self::Dict4x4_1000),
            7 => Some(Self::Dict5x5_1000),
            11 => Some(Self::Dict6x6_1000),
            _ => None,
        }
    }
}

/// A planar calibration board: a chessboard grid, optionally carrying
/// embedded fiducial markers (ChArUco-style).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTarget {
    /// Number of squares along X.
    pub squares_x: u32,
    /// Number of squares along Y.
    pub squares_y: u32,
    /// Square side length (world units, e.g. meters).
    pub square_len: Real,
    /// Marker side length for marker-based boards.
    pub marker_len: Option<Real>,
    /// Marker dictionary for marker-based boards.
    pub dictionary: Option<MarkerDictionary>,
    /// Minimum fraction of corners that must be identified for a
    /// marker-based detection to count as usable. Plain chessboards always
    /// require every corner.
    pub min_marker_coverage: Real,
}

impl CalibrationTarget {
    /// A plain chessboard with `squares_x` x `squares_y` squares.
    pub fn chessboard(squares_x: u32, squares_y: u32, square_len: Real) -> Result<Self> {
        ensure!(
            squares_x >= 2 && squares_y >= 2,
            "board needs at least 2x2 squares, got {}x{}",
            squares_x,
            squares_y
        );
        ensure!(square_len > 0.0, "square length must be positive");
        Ok(Self {
            squares_x,
            squares_y,
            square_len,
            marker_len: None,
            dictionary: None,
            min_marker_coverage: 1.0,
        })
    }

    /// A ChArUco-style board with embedded markers.
    pub fn charuco(
        squares_x: u32,
        squares_y: u32,
        square_len: Real,
        marker_len: Real,
        dictionary: MarkerDictionary,
    ) -> Result<Self> {
        let mut target = Self::chessboard(squares_x, squares_y, square_len)?;
        ensure!(
            marker_len > 0.0 && marker_len < square_len,
            "marker length must be positive and smaller than the square length"
        );
        target.marker_len = Some(marker_len);
        target.dictionary = Some(dictionary);
        target.min_marker_coverage = 0.5;
        Ok(target)
    }

    pub fn is_marker_based(&self) -> bool {
        self.dictionary.is_some()
    }

    /// Total number of inner corners on the board.
    pub fn corner_count(&self) -> usize {
        ((self.squares_x - 1) * (self.squares_y - 1)) as usize
    }

    /// Number of identified corners a detection must carry to be usable.
    ///
    /// Plain chessboards require full visibility; marker-based boards can
    /// interpolate partially visible corners, so a coverage fraction applies.
    pub fn required_corner_count(&self) -> usize {
        if self.is_marker_based() {
            let needed = (self.corner_count() as Real * self.min_marker_coverage).ceil() as usize;
            needed.max(4)
        } else {
            self.corner_count()
        }
    }

    /// Ground-truth 3D corner coordinates on the Z=0 board plane.
    ///
    /// Corners are ordered row-major (Y major), matching the corner
    /// identifier `id = row * (squares_x - 1) + col`.
    pub fn corner_points(&self) -> Vec<Pt3> {
        let nx = (self.squares_x - 1) as usize;
        let ny = (self.squares_y - 1) as usize;
        let mut points = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                points.push(Pt3::new(
                    (i + 1) as Real * self.square_len,
                    (j + 1) as Real * self.square_len,
                    0.0,
                ));
            }
        }
        points
    }

    /// Board-plane 2D coordinates of the inner corners, same ordering as
    /// [`corner_points`](Self::corner_points).
    pub fn corner_points_2d(&self) -> Vec<Pt2> {
        self.corner_points()
            .iter()
            .map(|p| Pt2::new(p.x, p.y))
            .collect()
    }

    /// 3D coordinate of a single corner identifier.
    pub fn corner_point(&self, id: u32) -> Option<Pt3> {
        let nx = (self.squares_x - 1) as u32;
        let ny = (self.squares_y - 1) as u32;
        if id >= nx * ny {
            return None;
        }
        let col = id % nx;
        let row = id / nx;
        debug_assert!(row < ny);
        Some(Pt3::new(
            (col + 1) as Real * self.square_len,
            (row + 1) as Real * self.square_len,
            0.0,
        ))
    }
}
