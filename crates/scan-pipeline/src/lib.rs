//! Capture and processing pipelines for `stereoscan-rs`.
//!
//! Two drivers share one geometric backbone:
//!
//! - [`session`]: collect accepted frame pairs, calibrate both cameras
//!   independently, solve the rig geometry, rectify, and persist every
//!   parameter document;
//! - [`reconstruct`]: load persisted stereo parameters plus a Gray-code
//!   image sequence, decode it into a disparity map and export a colored
//!   point cloud.
//!
//! Supporting modules: [`collector`] (frame acquisition and acceptance),
//! [`store`] (parameter documents and image lists) and [`detector_params`]
//! (the detector configuration file).

pub mod collector;
pub mod detector_params;
pub mod reconstruct;
pub mod session;
pub mod store;

pub use collector::{
    CollectStatus, FrameCollector, FrameSource, ImageDirSource, TargetDetector,
};
pub use detector_params::{load_detector_params, DetectorParams};
pub use reconstruct::{export_ply_file, run_reconstruction, Reconstruction, ReconstructionConfig};
pub use session::{
    run_stereo_session, save_session_documents, StereoSessionConfig, StereoSessionReport,
};
pub use store::{
    current_timestamp, load_image_list, load_json, save_json, CameraParamsDoc, ExtrinsicsDoc,
    ImageListDoc, RectifiedExtrinsicsDoc, StereoIntrinsicsDoc, StereoParametersDoc,
};
