//! Gray-code structured light for `stereoscan-rs`.
//!
//! A projector emits a stack of binary stripe patterns (and their inverses)
//! that uniquely encode every projector column and row. Two rectified
//! cameras observe the scene; decoding both sequences yields a per-pixel
//! projector codeword, matching codewords across the views yields a
//! disparity map, and the disparity-to-depth matrix turns it into a colored
//! point cloud.
//!
//! - [`pattern`]: pattern stack generation and codeword arithmetic,
//! - [`decode`]: per-pixel codeword decoding and stereo correspondence,
//! - [`disparity`]: the disparity map and foreground separation,
//! - [`cloud`]: reprojection to 3D with per-point color,
//! - [`ply`]: ASCII polygon-file export.

pub mod cloud;
pub mod decode;
pub mod disparity;
pub mod pattern;
pub mod ply;

pub use cloud::{reproject_disparity, CloudPoint};
pub use decode::{compute_disparity, decode_codewords, CodewordMap, DecodeError, DecodeParams};
pub use disparity::{otsu_split, DisparityMap, NO_MATCH};
pub use pattern::{binary_to_gray, gray_to_binary, GrayCodePattern};
pub use ply::write_ply;
