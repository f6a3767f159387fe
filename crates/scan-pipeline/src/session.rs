//! The calibration session: per-camera calibration, rig geometry,
//! rectification and document export.

use crate::store::{
    current_timestamp, save_json, CameraParamsDoc, ExtrinsicsDoc, RectifiedExtrinsicsDoc,
    StereoIntrinsicsDoc, StereoParametersDoc,
};
use anyhow::{ensure, Context, Result};
use log::info;
use scan_calib::{
    calibrate_camera, calibrate_stereo, CalibrationFlags, CameraCalibration, StereoCalibration,
};
use scan_core::{CaptureSet, ImageSize};
use scan_rectify::{stereo_rectify, RectificationParams};
use std::path::{Path, PathBuf};

/// Session configuration: one set of calibration flags per camera.
#[derive(Debug, Clone, Default)]
pub struct StereoSessionConfig {
    pub flags: Vec<CalibrationFlags>,
}

impl StereoSessionConfig {
    fn flags_for(&self, camera: usize) -> CalibrationFlags {
        self.flags.get(camera).copied().unwrap_or_default()
    }
}

/// Everything a completed calibration session produced.
#[derive(Debug, Clone)]
pub struct StereoSessionReport {
    pub cameras: Vec<CameraCalibration>,
    pub stereo: StereoCalibration,
    pub rectification: RectificationParams,
    pub image_size: ImageSize,
    pub flags: Vec<CalibrationFlags>,
}

/// Run the full calibration stage on an accepted capture set.
///
/// The cameras are calibrated independently, then the rig geometry is
/// solved over the paired observations, then rectification is derived.
/// Insufficient-frame errors surface before any solving begins.
pub fn run_stereo_session(
    captures: &CaptureSet,
    image_size: ImageSize,
    config: &StereoSessionConfig,
) -> Result<StereoSessionReport> {
    ensure!(
        captures.num_cameras() == 2,
        "stereo session needs exactly 2 cameras, capture set has {}",
        captures.num_cameras()
    );

    let mut cameras = Vec::with_capacity(2);
    for camera in 0..2 {
        let views = captures.observations_for(camera)?;
        let flags = config.flags_for(camera);
        let result = calibrate_camera(&views, image_size, &flags)
            .with_context(|| format!("camera {} calibration failed", camera))?;
        info!(
            "camera {} calibrated: fx={:.2} fy={:.2} reproj={:.4} px",
            camera,
            result.camera.intrinsics.fx,
            result.camera.intrinsics.fy,
            result.reproj_error()
        );
        cameras.push(result);
    }

    let frames = captures.paired_observations()?;
    let stereo = calibrate_stereo(&frames, &cameras[0].camera, &cameras[1].camera)
        .context("stereo calibration failed")?;
    info!(
        "stereo rig solved: baseline={:.4}, rms={:.4} px",
        stereo.geometry.baseline(),
        stereo.rms
    );

    let rectification = stereo_rectify(
        &cameras[0].camera,
        &cameras[1].camera,
        &stereo.geometry.rotation,
        &stereo.geometry.translation,
        image_size,
    );

    let flags = (0..2).map(|c| config.flags_for(c)).collect();
    Ok(StereoSessionReport {
        cameras,
        stereo,
        rectification,
        image_size,
        flags,
    })
}

/// Write the full document set for a session into `dir`.
///
/// Produces the per-camera documents, the stereo intrinsics, the pre- and
/// post-rectification extrinsics, and the consolidated stereo-parameters
/// document the structured-light decoder consumes. Returns the written
/// paths.
pub fn save_session_documents(dir: &Path, report: &StereoSessionReport) -> Result<Vec<PathBuf>> {
    ensure!(dir.is_dir(), "output directory {} not found", dir.display());
    let mut written = Vec::new();

    let camera_docs: Vec<CameraParamsDoc> = report
        .cameras
        .iter()
        .zip(&report.flags)
        .map(|(cal, flags)| {
            CameraParamsDoc::from_camera(&cal.camera, flags.summary(), cal.reproj_error())
        })
        .collect();

    for (idx, doc) in camera_docs.iter().enumerate() {
        let name = format!("cam_{}.json", (b'a' + idx as u8) as char);
        let path = dir.join(name);
        save_json(&path, doc)?;
        written.push(path);
    }

    let geometry = &report.stereo.geometry;
    let rect = &report.rectification;

    let intrinsics = StereoIntrinsicsDoc {
        cam_a_matrix: report.cameras[0].camera.intrinsics.k_matrix(),
        cam_a_distortion: report.cameras[0].camera.distortion,
        cam_b_matrix: report.cameras[1].camera.intrinsics.k_matrix(),
        cam_b_distortion: report.cameras[1].camera.distortion,
    };
    let path = dir.join("stereo_intrinsics.json");
    save_json(&path, &intrinsics)?;
    written.push(path);

    let extrinsics = ExtrinsicsDoc {
        rotation: geometry.rotation,
        translation: geometry.translation,
    };
    let path = dir.join("stereo_extrinsics_pre_rect.json");
    save_json(&path, &extrinsics)?;
    written.push(path);

    let rectified = RectifiedExtrinsicsDoc {
        rotation: geometry.rotation,
        translation: geometry.translation,
        r1: rect.r1,
        r2: rect.r2,
        p1: rect.p1,
        p2: rect.p2,
        q: rect.q,
    };
    let path = dir.join("stereo_extrinsics.json");
    save_json(&path, &rectified)?;
    written.push(path);

    let consolidated = StereoParametersDoc {
        calibration_time: current_timestamp(),
        cameras: camera_docs,
        rotation: geometry.rotation,
        translation: geometry.translation,
        essential: geometry.essential,
        fundamental: geometry.fundamental,
        r1: rect.r1,
        r2: rect.r2,
        p1: rect.p1,
        p2: rect.p2,
        q: rect.q,
        stereo_rms: report.stereo.rms,
    };
    let path = dir.join("stereo_parameters.json");
    save_json(&path, &consolidated)?;
    written.push(path);

    info!("saved {} calibration documents to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::load_json;
    use nalgebra::{Translation3, UnitQuaternion};
    use scan_core::synthetic::StereoRigSim;
    use scan_core::{
        BrownConrady5, CalibrationTarget, CameraModel, Intrinsics, Iso3,
    };
    use tempfile::TempDir;

    fn synthetic_captures() -> (CaptureSet, ImageSize) {
        let target = CalibrationTarget::chessboard(7, 6, 0.025).unwrap();
        let image_size = ImageSize::new(1280, 720);

        let cam = |fx: f64, fy: f64, cx: f64, cy: f64| {
            CameraModel::new(
                Intrinsics {
                    fx,
                    fy,
                    cx,
                    cy,
                    skew: 0.0,
                },
                BrownConrady5::zero(),
                image_size,
            )
        };

        let sim = StereoRigSim {
            cameras: vec![cam(805.0, 795.0, 640.0, 360.0), cam(798.0, 788.0, 632.0, 356.0)],
            cam_from_rig: vec![
                Iso3::identity(),
                Iso3::from_parts(
                    Translation3::new(-0.1, 0.003, 0.002),
                    UnitQuaternion::from_euler_angles(0.004, -0.025, 0.001),
                ),
            ],
            rig_from_target: (0..5)
                .map(|i| {
                    let i = i as f64;
                    Iso3::from_parts(
                        Translation3::new(-0.03 + 0.012 * i, 0.02 - 0.008 * i, 0.75 + 0.05 * i),
                        UnitQuaternion::from_euler_angles(
                            0.2 - 0.07 * i,
                            -0.15 + 0.06 * i,
                            0.015 * i,
                        ),
                    )
                })
                .collect(),
        };

        let mut set = CaptureSet::new(target.clone(), 2).unwrap();
        for frame in sim.detections(&target.corner_points()).unwrap() {
            assert!(set.offer(frame, None));
        }
        (set, image_size)
    }

    #[test]
    fn session_produces_consistent_documents() {
        let (captures, image_size) = synthetic_captures();
        let report =
            run_stereo_session(&captures, image_size, &StereoSessionConfig::default()).unwrap();

        assert_eq!(report.cameras.len(), 2);
        assert!(report.stereo.rms < 0.5, "rms {}", report.stereo.rms);

        let dir = TempDir::new().unwrap();
        let written = save_session_documents(dir.path(), &report).unwrap();
        assert_eq!(written.len(), 6);

        let consolidated: StereoParametersDoc =
            load_json(&dir.path().join("stereo_parameters.json")).unwrap();
        assert_eq!(consolidated.cameras.len(), 2);
        assert_eq!(consolidated.rotation, report.stereo.geometry.rotation);
        assert_eq!(consolidated.q, report.rectification.q);

        let cam_a: CameraParamsDoc = load_json(&dir.path().join("cam_a.json")).unwrap();
        let model = cam_a.camera_model();
        assert_eq!(model.intrinsics, report.cameras[0].camera.intrinsics);
    }

    #[test]
    fn session_rejects_insufficient_frames() {
        let (captures, image_size) = synthetic_captures();
        let target = captures.target().clone();

        let mut small = CaptureSet::new(target, 2).unwrap();
        for frame in captures.frames().iter().take(3) {
            let detections = (0..2).map(|c| frame.detection(c).clone()).collect();
            assert!(small.offer(detections, None));
        }

        let err = run_stereo_session(&small, image_size, &StereoSessionConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("calibration failed"));
    }
}
