//! Frame acquisition and acceptance.
//!
//! The collector pulls synchronized frames from a [`FrameSource`], runs
//! target detection per camera through a [`TargetDetector`], and offers the
//! result to the capture set: a frame is kept only when every camera's
//! detection is complete. Unreadable or empty frames are rejected before
//! any detector call.

use anyhow::{ensure, Context, Result};
use image::GrayImage;
use log::{info, warn};
use scan_core::{CalibrationTarget, CameraId, CaptureSet, Detection};
use std::path::{Path, PathBuf};

/// A source of synchronized frames, one image per camera.
pub trait FrameSource {
    /// The next synchronized frame group, or `None` at end of stream.
    fn next_frames(&mut self) -> Result<Option<Vec<GrayImage>>>;

    /// Switch one camera's physical input. Applied by the collector between
    /// acquisition cycles, never mid-frame.
    fn switch_input(&mut self, camera: CameraId, input: &str) -> Result<()> {
        let _ = (camera, input);
        anyhow::bail!("this frame source does not support switching inputs")
    }
}

/// Calibration-target detection on a single image.
///
/// Detection internals (marker decoding, corner refinement) live behind
/// this trait; any conforming detector can drive the collector.
pub trait TargetDetector {
    fn detect(&self, image: &GrayImage) -> Result<Detection>;
}

/// Outcome of one acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectStatus {
    /// The frame was complete in every camera and appended.
    Accepted,
    /// The frame was discarded (incomplete detection or unusable images).
    Rejected,
    /// The source is exhausted.
    EndOfStream,
}

/// Drives acquisition, detection and acceptance for one capture session.
///
/// The collector exclusively owns its source for the session and releases
/// it when dropped or consumed via [`FrameCollector::into_captures`].
pub struct FrameCollector<S, D> {
    source: S,
    detector: D,
    captures: CaptureSet,
    save_dir: Option<PathBuf>,
}

impl<S: FrameSource, D: TargetDetector> FrameCollector<S, D> {
    pub fn new(
        source: S,
        detector: D,
        target: CalibrationTarget,
        num_cameras: usize,
    ) -> Result<Self> {
        Ok(Self {
            source,
            detector,
            captures: CaptureSet::new(target, num_cameras)?,
            save_dir: None,
        })
    }

    /// Also persist accepted frames as numbered images under `dir`.
    pub fn with_save_dir(mut self, dir: &Path) -> Self {
        self.save_dir = Some(dir.to_path_buf());
        self
    }

    /// Operator command: switch a camera's physical input between cycles.
    ///
    /// Already-collected captures are unaffected.
    pub fn switch_source(&mut self, camera: CameraId, input: &str) -> Result<()> {
        self.source.switch_input(camera, input)
    }

    /// Acquire, detect and offer one frame group.
    pub fn collect_next(&mut self) -> Result<CollectStatus> {
        let Some(frames) = self.source.next_frames()? else {
            return Ok(CollectStatus::EndOfStream);
        };
        ensure!(
            frames.len() == self.captures.num_cameras(),
            "source produced {} frames for {} cameras",
            frames.len(),
            self.captures.num_cameras()
        );

        // Acquisition check before any detector call: detection on an empty
        // image is undefined.
        if frames.iter().any(|f| f.width() == 0 || f.height() == 0) {
            warn!("skipping frame with empty image data");
            return Ok(CollectStatus::Rejected);
        }

        let detections: Vec<Detection> = frames
            .iter()
            .map(|f| self.detector.detect(f))
            .collect::<Result<_>>()?;

        if !self.captures.would_accept(&detections) {
            let counts: Vec<usize> = detections.iter().map(Detection::len).collect();
            info!("frame rejected, corner counts {:?}", counts);
            return Ok(CollectStatus::Rejected);
        }

        let paths = match &self.save_dir {
            Some(dir) => Some(self.save_frames(dir, &frames)?),
            None => None,
        };
        let accepted = self.captures.offer(detections, paths);
        debug_assert!(accepted);
        info!("frame {} accepted", self.captures.len() - 1);
        Ok(CollectStatus::Accepted)
    }

    /// Run the acquisition loop until the source is exhausted.
    pub fn collect_all(&mut self) -> Result<()> {
        loop {
            if self.collect_next()? == CollectStatus::EndOfStream {
                return Ok(());
            }
        }
    }

    pub fn captures(&self) -> &CaptureSet {
        &self.captures
    }

    /// Finish the session, releasing the source.
    pub fn into_captures(self) -> CaptureSet {
        self.captures
    }

    fn save_frames(&self, dir: &Path, frames: &[GrayImage]) -> Result<Vec<PathBuf>> {
        let index = self.captures.len();
        let mut paths = Vec::with_capacity(frames.len());
        for (camera, frame) in frames.iter().enumerate() {
            let path = dir.join(format!("cam{}_im{}.png", camera, index));
            frame
                .save(&path)
                .with_context(|| format!("failed to save {}", path.display()))?;
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Frame source backed by numbered image files on disk.
///
/// Frame `i` of camera `c` lives at `sequences[c][i]`; all cameras must
/// provide the same number of frames. Images are loaded lazily during
/// acquisition and an unreadable file is an acquisition error.
pub struct ImageDirSource {
    sequences: Vec<Vec<PathBuf>>,
    cursor: usize,
}

impl ImageDirSource {
    /// Build from explicit per-camera path lists.
    pub fn from_paths(sequences: Vec<Vec<PathBuf>>) -> Result<Self> {
        ensure!(!sequences.is_empty(), "need at least one camera sequence");
        let len = sequences[0].len();
        ensure!(len > 0, "camera sequences are empty");
        for (camera, seq) in sequences.iter().enumerate() {
            ensure!(
                seq.len() == len,
                "camera {} has {} frames, expected {}",
                camera,
                seq.len(),
                len
            );
        }
        Ok(Self {
            sequences,
            cursor: 0,
        })
    }

    /// Discover numbered frames `<prefix><index>.<extension>` under `dir`,
    /// e.g. `camA_im0.png`, stopping at the first index missing for any
    /// camera.
    pub fn from_prefixes(dir: &Path, prefixes: &[&str], extension: &str) -> Result<Self> {
        ensure!(!prefixes.is_empty(), "need at least one camera prefix");
        let mut sequences: Vec<Vec<PathBuf>> = vec![Vec::new(); prefixes.len()];

        'frames: for index in 0.. {
            let mut frame_paths = Vec::with_capacity(prefixes.len());
            for prefix in prefixes {
                let path = dir.join(format!("{}{}.{}", prefix, index, extension));
                if !path.exists() {
                    break 'frames;
                }
                frame_paths.push(path);
            }
            for (seq, path) in sequences.iter_mut().zip(frame_paths) {
                seq.push(path);
            }
        }

        ensure!(
            !sequences[0].is_empty(),
            "no frames matching {:?} found in {}",
            prefixes,
            dir.display()
        );
        Self::from_paths(sequences)
    }

    pub fn len(&self) -> usize {
        self.sequences[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences[0].is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frames(&mut self) -> Result<Option<Vec<GrayImage>>> {
        if self.cursor >= self.len() {
            return Ok(None);
        }
        let mut frames = Vec::with_capacity(self.sequences.len());
        for seq in &self.sequences {
            let path = &seq[self.cursor];
            let img = image::ImageReader::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?
                .decode()
                .with_context(|| format!("failed to decode {}", path.display()))?
                .to_luma8();
            frames.push(img);
        }
        self.cursor += 1;
        Ok(Some(frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::Pt2;

    /// Source that replays an in-memory frame schedule.
    struct ScriptedSource {
        frames: Vec<Vec<GrayImage>>,
        cursor: usize,
        switched: Vec<(CameraId, String)>,
    }

    impl FrameSource for ScriptedSource {
        fn next_frames(&mut self) -> Result<Option<Vec<GrayImage>>> {
            let frame = self.frames.get(self.cursor).cloned();
            self.cursor += 1;
            Ok(frame)
        }

        fn switch_input(&mut self, camera: CameraId, input: &str) -> Result<()> {
            self.switched.push((camera, input.to_string()));
            Ok(())
        }
    }

    /// Detector keyed on mean image brightness: bright frames yield a full
    /// board, dark frames a partial one.
    struct BrightnessDetector {
        target: CalibrationTarget,
    }

    impl TargetDetector for BrightnessDetector {
        fn detect(&self, image: &GrayImage) -> Result<Detection> {
            let bright = image.pixels().map(|p| p.0[0] as u64).sum::<u64>()
                / (image.width() * image.height()) as u64;
            let count = if bright > 128 {
                self.target.corner_count()
            } else {
                self.target.corner_count() - 1
            };
            Ok(Detection::full(vec![Pt2::new(0.0, 0.0); count]))
        }
    }

    fn gray(value: u8) -> GrayImage {
        GrayImage::from_pixel(4, 4, image::Luma([value]))
    }

    fn target() -> CalibrationTarget {
        CalibrationTarget::chessboard(5, 4, 0.03).unwrap()
    }

    #[test]
    fn accepts_only_fully_visible_pairs() {
        let source = ScriptedSource {
            frames: vec![
                vec![gray(200), gray(200)], // both complete
                vec![gray(200), gray(10)],  // camera B incomplete
                vec![gray(10), gray(200)],  // camera A incomplete
                vec![gray(255), gray(255)], // both complete
            ],
            cursor: 0,
            switched: Vec::new(),
        };
        let target = target();
        let detector = BrightnessDetector {
            target: target.clone(),
        };
        let mut collector = FrameCollector::new(source, detector, target, 2).unwrap();

        let mut statuses = Vec::new();
        loop {
            let status = collector.collect_next().unwrap();
            if status == CollectStatus::EndOfStream {
                break;
            }
            statuses.push(status);
        }

        assert_eq!(
            statuses,
            vec![
                CollectStatus::Accepted,
                CollectStatus::Rejected,
                CollectStatus::Rejected,
                CollectStatus::Accepted,
            ]
        );
        assert_eq!(collector.captures().len(), 2);
    }

    #[test]
    fn empty_images_never_reach_the_detector() {
        struct PanicDetector;
        impl TargetDetector for PanicDetector {
            fn detect(&self, _image: &GrayImage) -> Result<Detection> {
                panic!("detector must not run on empty images");
            }
        }

        let source = ScriptedSource {
            frames: vec![vec![GrayImage::new(0, 0), gray(200)]],
            cursor: 0,
            switched: Vec::new(),
        };
        let mut collector = FrameCollector::new(source, PanicDetector, target(), 2).unwrap();
        assert_eq!(collector.collect_next().unwrap(), CollectStatus::Rejected);
        assert_eq!(collector.collect_next().unwrap(), CollectStatus::EndOfStream);
    }

    #[test]
    fn switch_source_is_forwarded_between_cycles() {
        let source = ScriptedSource {
            frames: vec![],
            cursor: 0,
            switched: Vec::new(),
        };
        let detector = BrightnessDetector { target: target() };
        let mut collector = FrameCollector::new(source, detector, target(), 2).unwrap();
        collector.switch_source(1, "/dev/video2").unwrap();
        assert_eq!(collector.collect_next().unwrap(), CollectStatus::EndOfStream);
    }

    #[test]
    fn image_dir_source_requires_equal_sequences() {
        assert!(ImageDirSource::from_paths(vec![
            vec![PathBuf::from("a0.png")],
            vec![PathBuf::from("b0.png"), PathBuf::from("b1.png")],
        ])
        .is_err());
        assert!(ImageDirSource::from_paths(vec![vec![], vec![]]).is_err());
    }
}
