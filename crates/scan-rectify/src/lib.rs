//! Stereo rectification for `stereoscan-rs`.
//!
//! [`rectify`] turns a calibrated rig (two camera models plus the relative
//! transform) into rectified projection geometry: rotations `R1`/`R2`,
//! projections `P1`/`P2`, the disparity-to-depth matrix `Q` and per-camera
//! valid-pixel regions. [`remap`] derives per-pixel lookup tables from that
//! geometry and resamples images into rectified space.

pub mod rectify;
pub mod remap;

pub use rectify::{stereo_rectify, RectificationParams, ValidRoi};
pub use remap::{build_rectify_map, remap_gray, remap_rgb, Interpolation, RemapTable};
