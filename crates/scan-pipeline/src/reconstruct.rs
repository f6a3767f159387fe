//! The structured-light reconstruction session.
//!
//! Consumes a persisted stereo-parameters document and a captured Gray-code
//! image sequence, remaps every image into rectified space, decodes the
//! patterns into a disparity map, and reprojects it into a colored point
//! cloud.

use crate::store::{ImageListDoc, StereoParametersDoc};
use anyhow::{ensure, Context, Result};
use image::{GrayImage, RgbImage};
use log::info;
use scan_core::{CameraModel, ImageSize};
use scan_graycode::{
    compute_disparity, decode_codewords, reproject_disparity, write_ply, CloudPoint, DecodeParams,
    DisparityMap, GrayCodePattern,
};
use scan_rectify::{build_rectify_map, remap_gray, remap_rgb, stereo_rectify, Interpolation};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Decoder configuration: projector resolution and rejection thresholds.
#[derive(Debug, Clone, Copy)]
pub struct ReconstructionConfig {
    pub projector_width: u32,
    pub projector_height: u32,
    pub white_threshold: u8,
    pub black_threshold: u8,
}

impl ReconstructionConfig {
    fn decode_params(&self) -> DecodeParams {
        DecodeParams {
            white_threshold: self.white_threshold,
            black_threshold: self.black_threshold,
        }
    }
}

/// Output of a reconstruction run.
pub struct Reconstruction {
    pub points: Vec<CloudPoint>,
    pub disparity: DisparityMap,
}

/// Decode a captured Gray-code sequence into a colored point cloud.
///
/// Each camera's image group holds the pattern captures in projection
/// order followed by the all-white and all-black references; group sizes
/// are validated against the projector resolution before any file is read.
pub fn run_reconstruction(
    list: &ImageListDoc,
    params: &StereoParametersDoc,
    config: &ReconstructionConfig,
) -> Result<Reconstruction> {
    list.validate()?;
    let pattern = GrayCodePattern::new(config.projector_width, config.projector_height)
        .context("invalid projector resolution")?;

    let expected = pattern.images_per_camera();
    for (name, group) in [("cam1", &list.cam1), ("cam2", &list.cam2)] {
        ensure!(
            group.len() == expected,
            "{} lists {} images, expected {} ({} patterns + white + black)",
            name,
            group.len(),
            expected,
            pattern.pattern_count()
        );
    }
    ensure!(
        params.cameras.len() == 2,
        "stereo parameters describe {} cameras, expected 2",
        params.cameras.len()
    );

    let cam_a = params.cameras[0].camera_model();
    let cam_b = params.cameras[1].camera_model();
    let image_size = cam_a.image_size;

    // Rectification is recomputed from the persisted R and T; the remap
    // tables are built once and reused for every image of the session.
    info!("rectifying images...");
    let rect = stereo_rectify(
        &cam_a,
        &cam_b,
        &params.rotation,
        &params.translation,
        image_size,
    );
    let map_a = build_rectify_map(&cam_a, &rect.r1, &rect.p1, image_size);
    let map_b = build_rectify_map(&cam_b, &rect.r2, &rect.p2, image_size);

    let load_group = |paths: &[PathBuf],
                      camera: &CameraModel,
                      map: &scan_rectify::RemapTable|
     -> Result<(Vec<GrayImage>, GrayImage, GrayImage)> {
        let mut rectified = Vec::with_capacity(pattern.pattern_count());
        for path in &paths[..pattern.pattern_count()] {
            let img = load_gray(path, camera.image_size)?;
            rectified.push(remap_gray(&img, map, Interpolation::Nearest));
        }
        let white = remap_gray(
            &load_gray(&paths[pattern.pattern_count()], camera.image_size)?,
            map,
            Interpolation::Nearest,
        );
        let black = remap_gray(
            &load_gray(&paths[pattern.pattern_count() + 1], camera.image_size)?,
            map,
            Interpolation::Nearest,
        );
        Ok((rectified, white, black))
    };

    let (patterns_a, white_a, black_a) = load_group(&list.cam1, &cam_a, &map_a)?;
    let (patterns_b, white_b, black_b) = load_group(&list.cam2, &cam_b, &map_b)?;

    // The all-white capture of camera A doubles as the color source.
    let color = load_rgb(&list.cam1[pattern.pattern_count()], image_size)?;
    let color = remap_rgb(&color, &map_a, Interpolation::Nearest);

    info!("decoding pattern...");
    let decode_params = config.decode_params();
    let codes_a = decode_codewords(&pattern, &patterns_a, &white_a, &black_a, &decode_params)?;
    let codes_b = decode_codewords(&pattern, &patterns_b, &white_b, &black_b, &decode_params)?;
    info!(
        "decoded codewords: cam1={}, cam2={}",
        codes_a.decoded_count(),
        codes_b.decoded_count()
    );

    let disparity = compute_disparity(&codes_a, &codes_b, &pattern)?;
    let mask = disparity.foreground_mask();
    let points = reproject_disparity(&disparity, &rect.q, &mask, &color)?;
    info!(
        "reconstructed {} points from {} matched pixels",
        points.len(),
        disparity.valid_count()
    );

    Ok(Reconstruction { points, disparity })
}

/// Write a point cloud to an ASCII PLY file.
pub fn export_ply_file(path: &Path, points: &[CloudPoint]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_ply(&mut writer, points)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("saved {} points to {}", points.len(), path.display());
    Ok(())
}

fn load_gray(path: &Path, expected: ImageSize) -> Result<GrayImage> {
    let img = image::ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_luma8();
    check_size(path, img.width(), img.height(), expected)?;
    Ok(img)
}

fn load_rgb(path: &Path, expected: ImageSize) -> Result<RgbImage> {
    let img = image::ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgb8();
    check_size(path, img.width(), img.height(), expected)?;
    Ok(img)
}

fn check_size(path: &Path, width: u32, height: u32, expected: ImageSize) -> Result<()> {
    ensure!(
        width == expected.width && height == expected.height,
        "{} is {}x{}, calibration expects {}x{}",
        path.display(),
        width,
        height,
        expected.width,
        expected.height
    );
    Ok(())
}
