//! Capture sets: ordered, synchronized, accepted frame groups.
//!
//! A [`CaptureSet`] only ever grows through [`CaptureSet::offer`], which
//! takes every camera's detection for one synchronized instant at once.
//! There is no way to construct a frame whose per-camera detections come
//! from different instants, which is the pairing invariant the stereo
//! calibrator depends on.

use crate::{CalibrationTarget, Detection, Observations, Pt2, Pt3};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Index of a camera within a capture session (0-based).
pub type CameraId = usize;

/// One accepted frame: per-camera detections from the same instant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptureFrame {
    index: usize,
    detections: Vec<Detection>,
    image_paths: Option<Vec<PathBuf>>,
}

impl CaptureFrame {
    /// Position of this frame in the accepted sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Detection for a camera.
    pub fn detection(&self, camera: CameraId) -> &Detection {
        &self.detections[camera]
    }

    /// Source image paths, when the frame was loaded from or saved to disk.
    pub fn image_paths(&self) -> Option<&[PathBuf]> {
        self.image_paths.as_deref()
    }
}

/// Ordered sequence of accepted frames for an N-camera rig.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptureSet {
    target: CalibrationTarget,
    num_cameras: usize,
    frames: Vec<CaptureFrame>,
}

impl CaptureSet {
    pub fn new(target: CalibrationTarget, num_cameras: usize) -> Result<Self> {
        ensure!(num_cameras >= 1, "need at least one camera");
        Ok(Self {
            target,
            num_cameras,
            frames: Vec::new(),
        })
    }

    pub fn target(&self) -> &CalibrationTarget {
        &self.target
    }

    pub fn num_cameras(&self) -> usize {
        self.num_cameras
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[CaptureFrame] {
        &self.frames
    }

    /// Whether a set of per-camera detections would be accepted.
    ///
    /// A frame is accepted exactly when every camera's detection satisfies
    /// the target's completeness criterion.
    pub fn would_accept(&self, detections: &[Detection]) -> bool {
        detections.len() == self.num_cameras
            && detections.iter().all(|d| d.is_complete(&self.target))
    }

    /// Offer one synchronized frame for acceptance.
    ///
    /// Returns `true` and appends the frame when every camera's detection is
    /// complete; otherwise the frame is discarded without side effects.
    pub fn offer(&mut self, detections: Vec<Detection>, image_paths: Option<Vec<PathBuf>>) -> bool {
        if !self.would_accept(&detections) {
            return false;
        }
        if let Some(paths) = &image_paths {
            if paths.len() != self.num_cameras {
                return false;
            }
        }
        self.frames.push(CaptureFrame {
            index: self.frames.len(),
            detections,
            image_paths,
        });
        true
    }

    /// Per-frame observations for one camera, for independent calibration.
    pub fn observations_for(&self, camera: CameraId) -> Result<Vec<Observations>> {
        ensure!(
            camera < self.num_cameras,
            "camera index {} out of range for {} cameras",
            camera,
            self.num_cameras
        );
        self.frames
            .iter()
            .map(|f| f.detections[camera].observations(&self.target))
            .collect()
    }

    /// Per-frame paired observations across all cameras.
    ///
    /// Every camera's observations at a frame are restricted to the corners
    /// seen by *all* cameras, so each camera shares the exact same 3D target
    /// points at that frame. For full-board detections this is the whole
    /// board; for marker-based boards it is the visible intersection.
    pub fn paired_observations(&self) -> Result<Vec<Vec<Observations>>> {
        let mut paired = Vec::with_capacity(self.frames.len());

        for frame in &self.frames {
            // Corner id -> pixel, per camera. BTreeMap keeps the shared 3D
            // point ordering identical across cameras and runs.
            let mut per_camera: Vec<BTreeMap<u32, Pt2>> = Vec::with_capacity(self.num_cameras);
            for det in &frame.detections {
                let mut by_id = BTreeMap::new();
                for idx in 0..det.len() {
                    by_id.insert(det.id_at(idx), det.points[idx]);
                }
                per_camera.push(by_id);
            }

            let shared_ids: Vec<u32> = per_camera[0]
                .keys()
                .copied()
                .filter(|id| per_camera.iter().all(|m| m.contains_key(id)))
                .collect();
            ensure!(
                shared_ids.len() >= 4,
                "frame {} has only {} corners visible in all cameras",
                frame.index,
                shared_ids.len()
            );

            let points_3d: Vec<Pt3> = shared_ids
                .iter()
                .map(|id| {
                    self.target.corner_point(*id).ok_or_else(|| {
                        anyhow::anyhow!("corner id {} out of range for the target", id)
                    })
                })
                .collect::<Result<_>>()?;

            let mut frame_obs = Vec::with_capacity(self.num_cameras);
            for by_id in &per_camera {
                let points_2d: Vec<Pt2> = shared_ids.iter().map(|id| by_id[id]).collect();
                frame_obs.push(Observations::new(points_3d.clone(), points_2d)?);
            }
            paired.push(frame_obs);
        }

        Ok(paired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> CalibrationTarget {
        CalibrationTarget::chessboard(7, 6, 0.025).unwrap()
    }

    fn full_detection(target: &CalibrationTarget) -> Detection {
        Detection::full(vec![Pt2::new(1.0, 2.0); target.corner_count()])
    }

    #[test]
    fn accepts_only_when_all_cameras_complete() {
        let target = board();
        let mut set = CaptureSet::new(target.clone(), 2).unwrap();

        let full = full_detection(&target);
        let partial = Detection::full(vec![Pt2::new(0.0, 0.0); target.corner_count() - 1]);

        assert!(!set.offer(vec![full.clone(), partial.clone()], None));
        assert!(!set.offer(vec![partial.clone(), full.clone()], None));
        assert!(!set.offer(vec![Detection::empty(), full.clone()], None));
        assert_eq!(set.len(), 0);

        assert!(set.offer(vec![full.clone(), full], None));
        assert_eq!(set.len(), 1);
        assert_eq!(set.frames()[0].index(), 0);
    }

    #[test]
    fn accept_matches_completeness_predicate() {
        let target = board();
        let set = CaptureSet::new(target.clone(), 2).unwrap();
        let full = full_detection(&target);
        let partial = Detection::full(vec![Pt2::new(0.0, 0.0); 3]);

        for (a, b) in [
            (full.clone(), full.clone()),
            (full.clone(), partial.clone()),
            (partial.clone(), full.clone()),
            (partial.clone(), partial.clone()),
        ] {
            let expected = a.is_complete(&target) && b.is_complete(&target);
            assert_eq!(set.would_accept(&[a, b]), expected);
        }
    }

    #[test]
    fn wrong_camera_count_is_rejected() {
        let target = board();
        let mut set = CaptureSet::new(target.clone(), 2).unwrap();
        let full = full_detection(&target);
        assert!(!set.offer(vec![full], None));
    }

    #[test]
    fn paired_observations_intersect_ids() {
        let target = board();
        let mut set = CaptureSet::new(target.clone(), 2).unwrap();

        // Marker-style detections with overlapping but unequal id sets.
        let a = Detection::with_ids(
            (0..26).map(|i| Pt2::new(i as f64, 0.0)).collect(),
            (0..26).collect(),
        )
        .unwrap();
        let b = Detection::with_ids(
            (2..28).map(|i| Pt2::new(i as f64, 1.0)).collect(),
            (2..28).collect(),
        )
        .unwrap();

        // Use a charuco target so partial coverage is acceptable.
        let charuco = CalibrationTarget::charuco(
            7,
            6,
            0.025,
            0.018,
            crate::MarkerDictionary::Dict4x4_50,
        )
        .unwrap();
        let mut set_charuco = CaptureSet::new(charuco, 2).unwrap();
        assert!(set_charuco.offer(vec![a, b], None));

        let paired = set_charuco.paired_observations().unwrap();
        assert_eq!(paired.len(), 1);
        let [obs_a, obs_b] = [&paired[0][0], &paired[0][1]];
        assert_eq!(obs_a.len(), 24); // ids 2..=25
        assert_eq!(obs_a.len(), obs_b.len());
        for (p, q) in obs_a.points_3d.iter().zip(obs_b.points_3d.iter()) {
            assert_eq!(p, q);
        }

        // Full detections keep the whole board.
        let full = full_detection(&target);
        assert!(set.offer(vec![full.clone(), full], None));
        let paired_full = set.paired_observations().unwrap();
        assert_eq!(paired_full[0][0].len(), target.corner_count());
    }
}
