//! Parameter documents and image lists.
//!
//! Every calibration artifact is persisted as a JSON document with full
//! floating-point precision. The read path fails explicitly when a file is
//! missing, malformed, or lacks a required key; zeroed defaults are never
//! fabricated.

use anyhow::{ensure, Context, Result};
use scan_core::{
    BrownConrady5, CameraModel, ImageSize, Intrinsics, Mat3, Mat3x4, Mat4, Real, Vec3,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-camera calibration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraParamsDoc {
    pub calibration_time: String,
    pub image_width: u32,
    pub image_height: u32,
    /// Summary of the calibration flags that were active.
    pub flags: String,
    pub camera_matrix: Mat3,
    pub distortion: BrownConrady5,
    pub avg_reprojection_error: Real,
}

impl CameraParamsDoc {
    pub fn from_camera(camera: &CameraModel, flags: String, reproj_error: Real) -> Self {
        Self {
            calibration_time: current_timestamp(),
            image_width: camera.image_size.width,
            image_height: camera.image_size.height,
            flags,
            camera_matrix: camera.intrinsics.k_matrix(),
            distortion: camera.distortion,
            avg_reprojection_error: reproj_error,
        }
    }

    /// Rebuild the camera model this document describes.
    pub fn camera_model(&self) -> CameraModel {
        CameraModel::new(
            Intrinsics::from_k_matrix(&self.camera_matrix),
            self.distortion,
            ImageSize::new(self.image_width, self.image_height),
        )
    }
}

/// Both cameras' intrinsics in one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StereoIntrinsicsDoc {
    pub cam_a_matrix: Mat3,
    pub cam_a_distortion: BrownConrady5,
    pub cam_b_matrix: Mat3,
    pub cam_b_distortion: BrownConrady5,
}

/// Rig extrinsics before rectification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtrinsicsDoc {
    pub rotation: Mat3,
    pub translation: Vec3,
}

/// Rig extrinsics together with the rectification outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RectifiedExtrinsicsDoc {
    pub rotation: Mat3,
    pub translation: Vec3,
    pub r1: Mat3,
    pub r2: Mat3,
    pub p1: Mat3x4,
    pub p2: Mat3x4,
    pub q: Mat4,
}

/// The consolidated stereo-parameters document: everything the
/// structured-light decoder needs for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StereoParametersDoc {
    pub calibration_time: String,
    /// Per-camera documents, indexed by camera (0 = A, 1 = B).
    pub cameras: Vec<CameraParamsDoc>,
    pub rotation: Mat3,
    pub translation: Vec3,
    pub essential: Mat3,
    pub fundamental: Mat3,
    pub r1: Mat3,
    pub r2: Mat3,
    pub p1: Mat3x4,
    pub p2: Mat3x4,
    pub q: Mat4,
    pub stereo_rms: Real,
}

/// Serialize a document to pretty-printed JSON on disk.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize document")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Load a document from JSON on disk.
///
/// A missing file or a document missing required keys is an error.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

/// Ordered pattern-image paths for the two cameras.
///
/// Both groups must be non-empty and of equal length; an odd total count
/// cannot satisfy that and is rejected as a format error at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageListDoc {
    pub cam1: Vec<PathBuf>,
    pub cam2: Vec<PathBuf>,
}

impl ImageListDoc {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.cam1.is_empty() && !self.cam2.is_empty(),
            "image list is empty"
        );
        let total = self.cam1.len() + self.cam2.len();
        ensure!(
            total % 2 == 0 && self.cam1.len() == self.cam2.len(),
            "image list must split evenly between cameras: {} + {} entries",
            self.cam1.len(),
            self.cam2.len()
        );
        Ok(())
    }
}

/// Load and validate an image-list document.
pub fn load_image_list(path: &Path) -> Result<ImageListDoc> {
    let list: ImageListDoc = load_json(path)?;
    list.validate()
        .with_context(|| format!("invalid image list {}", path.display()))?;
    Ok(list)
}

/// Current UTC time as `YYYY-MM-DD HH:MM:SS UTC`.
pub fn current_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    format_timestamp(secs)
}

fn format_timestamp(unix_secs: i64) -> String {
    let days = unix_secs.div_euclid(86_400);
    let secs_of_day = unix_secs.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
        year,
        month,
        day,
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}

/// Gregorian date from days since the Unix epoch.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_camera() -> CameraModel {
        CameraModel::new(
            Intrinsics {
                fx: 812.345678901234,
                fy: 798.7654321,
                cx: 639.1111111,
                cy: 361.2222222,
                skew: 0.0,
            },
            BrownConrady5 {
                k1: -0.123456789012345,
                k2: 0.0123456789,
                k3: 0.0,
                p1: 1.5e-4,
                p2: -2.5e-4,
                iters: 8,
            },
            ImageSize::new(1280, 720),
        )
    }

    #[test]
    fn camera_document_roundtrips_bit_for_bit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cam_a.json");

        let camera = sample_camera();
        let doc = CameraParamsDoc::from_camera(&camera, "+fix_k3".into(), 0.1875);
        save_json(&path, &doc).unwrap();

        let restored: CameraParamsDoc = load_json(&path).unwrap();
        assert_eq!(restored.camera_matrix, doc.camera_matrix);
        assert_eq!(restored.distortion, doc.distortion);
        assert_eq!(restored.avg_reprojection_error, doc.avg_reprojection_error);
        assert_eq!(restored.flags, doc.flags);

        let model = restored.camera_model();
        assert_eq!(model.intrinsics, camera.intrinsics);
        assert_eq!(model.distortion, camera.distortion);
        assert_eq!(model.image_size, camera.image_size);
    }

    #[test]
    fn missing_file_is_an_explicit_error() {
        let dir = TempDir::new().unwrap();
        let result: Result<CameraParamsDoc> = load_json(&dir.path().join("nope.json"));
        assert!(result.is_err());
    }

    #[test]
    fn missing_key_is_an_explicit_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{"calibration_time": "now"}"#).unwrap();
        let result: Result<CameraParamsDoc> = load_json(&path);
        assert!(result.is_err());
    }

    #[test]
    fn uneven_image_list_is_rejected() {
        let list = ImageListDoc {
            cam1: vec![PathBuf::from("a0.png"), PathBuf::from("a1.png")],
            cam2: vec![PathBuf::from("b0.png")],
        };
        assert!(list.validate().is_err());

        let list = ImageListDoc {
            cam1: vec![],
            cam2: vec![],
        };
        assert!(list.validate().is_err());

        let list = ImageListDoc {
            cam1: vec![PathBuf::from("a0.png")],
            cam2: vec![PathBuf::from("b0.png")],
        };
        assert!(list.validate().is_ok());
    }

    #[test]
    fn timestamp_formatting_matches_known_dates() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(86_400), "1970-01-02 00:00:00 UTC");
        // 2000-03-01 00:00:00 UTC, the day after a century leap day.
        assert_eq!(format_timestamp(951_868_800), "2000-03-01 00:00:00 UTC");
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13:20 UTC");
    }
}
