//! Core math and geometry primitives for `stereoscan-rs`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - pinhole camera models with Brown-Conrady distortion,
//! - calibration-target geometry (chessboard and marker boards),
//! - per-frame detections and synchronized capture sets,
//! - synthetic stereo data generators used by the test suites.
//!
//! Camera pipeline:
//! `pixel = K ∘ distortion ∘ projection(dir)`

/// Capture sets of synchronized, accepted frame pairs.
pub mod capture;
/// Per-frame target detections.
pub mod detection;
/// Minimal `log` backend for the command-line tools.
pub mod logger;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Camera models and distortion utilities.
pub mod models;
/// Deterministic synthetic data generators.
pub mod synthetic;
/// Physical calibration-target descriptions.
pub mod target;

pub use capture::*;
pub use detection::*;
pub use math::*;
pub use models::*;
pub use target::*;
