use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::Matrix3;
use opencv::{
    calib3d,
    core::{self, Mat, Point2f, Size, TermCriteria, TermCriteria_Type, Vector},
    imgcodecs, imgproc,
    objdetect::{self, CharucoBoard, CharucoDetector, Dictionary, PredefinedDictionaryType},
    prelude::*,
};

use crate::alignment::{BoardCorners, Correspondences, Homography, PairResult, StereoPair};
use crate::config::CalibrationConfig;

// --- Data ---

/// Board parameters, saved alongside results so they can be reproduced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardParams {
    pub dictionary: String,
    pub squares_x: i32,
    pub squares_y: i32,
    pub square_length: f32,
    pub marker_length: f32,
}

impl BoardParams {
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self {
            dictionary: config.dictionary.clone(),
            squares_x: config.squares_x,
            squares_y: config.squares_y,
            square_length: config.square_length,
            marker_length: config.marker_length,
        }
    }
}

/// Single-camera intrinsic calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Image-name prefix the camera was captured under
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Camera matrix K (row-major 3x3)
    pub intrinsic_matrix: [f64; 9],
    /// Distortion coefficients [k1, k2, p1, p2, k3]
    pub dist_coeffs: Vec<f64>,
    /// RMS reprojection error (pixels)
    pub reprojection_error: f64,
    pub image_count: usize,
    pub board: BoardParams,
}

// --- Save / Load ---

pub fn save_intrinsics<P: AsRef<Path>>(path: P, cal: &CameraIntrinsics) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(cal)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write calibration file {}", path.display()))?;
    Ok(())
}

pub fn load_intrinsics<P: AsRef<Path>>(path: P) -> Result<CameraIntrinsics> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read calibration file {}", path.display()))?;
    let cal: CameraIntrinsics = serde_json::from_str(&content)?;
    Ok(cal)
}

/// `<output_dir>/<name>_intrinsics.json`
pub fn intrinsics_path(config: &CalibrationConfig, name: &str) -> PathBuf {
    Path::new(&config.output_dir).join(format!("{}_intrinsics.json", name))
}

// --- Calibration images ---

/// `<image_dir>/cal_<prefix>_NNN.png`
pub fn capture_path(config: &CalibrationConfig, prefix: &str, index: usize) -> PathBuf {
    Path::new(&config.image_dir).join(format!("cal_{}_{:03}.png", prefix, index))
}

/// All `cal_<prefix>_*.png` in the image dir, sorted by name
pub fn list_calibration_images(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let head = format!("cal_{}_", prefix);
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read image dir {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            name.starts_with(&head) && name.ends_with(".png")
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// First index not yet taken by an existing capture
pub fn next_capture_index(dir: &Path, prefix: &str) -> usize {
    let head = format!("cal_{}_", prefix);
    list_calibration_images(dir, prefix)
        .unwrap_or_default()
        .iter()
        .filter_map(|p| {
            let stem = p.file_stem()?.to_str()?;
            stem.strip_prefix(&head)?.parse::<usize>().ok()
        })
        .max()
        .map_or(0, |n| n + 1)
}

// --- Dictionary ---

pub fn parse_dictionary(name: &str) -> Result<Dictionary> {
    let dict_type = match name {
        "DICT_4X4_50" => PredefinedDictionaryType::DICT_4X4_50,
        "DICT_4X4_100" => PredefinedDictionaryType::DICT_4X4_100,
        "DICT_4X4_250" => PredefinedDictionaryType::DICT_4X4_250,
        "DICT_4X4_1000" => PredefinedDictionaryType::DICT_4X4_1000,
        "DICT_5X5_50" => PredefinedDictionaryType::DICT_5X5_50,
        "DICT_5X5_100" => PredefinedDictionaryType::DICT_5X5_100,
        "DICT_5X5_250" => PredefinedDictionaryType::DICT_5X5_250,
        "DICT_5X5_1000" => PredefinedDictionaryType::DICT_5X5_1000,
        "DICT_6X6_50" => PredefinedDictionaryType::DICT_6X6_50,
        "DICT_6X6_100" => PredefinedDictionaryType::DICT_6X6_100,
        "DICT_6X6_250" => PredefinedDictionaryType::DICT_6X6_250,
        "DICT_6X6_1000" => PredefinedDictionaryType::DICT_6X6_1000,
        _ => bail!("Unknown dictionary: {}", name),
    };
    objdetect::get_predefined_dictionary(dict_type).context("Failed to get predefined dictionary")
}

pub fn create_board(config: &CalibrationConfig) -> Result<CharucoBoard> {
    let dict = parse_dictionary(&config.dictionary)?;
    let size = Size::new(config.squares_x, config.squares_y);
    CharucoBoard::new_def(size, config.square_length, config.marker_length, &dict)
        .context("Failed to create CharucoBoard")
}

pub fn create_detector(board: &CharucoBoard) -> Result<CharucoDetector> {
    use objdetect::{CharucoParameters, DetectorParameters, RefineParameters};

    let det_params = DetectorParameters::default()?;
    let charuco_params = CharucoParameters::default()?;
    let refine_params = RefineParameters::new(10.0, 3.0, true)?;

    CharucoDetector::new(board, &charuco_params, &det_params, refine_params)
        .context("Failed to create CharucoDetector")
}

// --- Detection ---

/// ChArUco corners found in one image
pub struct BoardDetection {
    pub corners: Mat,
    pub ids: Mat,
    pub corner_count: i32,
    pub marker_count: i32,
}

/// Detect the board. Corners and ids come back empty when nothing is found.
pub fn detect_board(detector: &CharucoDetector, image: &Mat) -> Result<BoardDetection> {
    let mut corners = Mat::default();
    let mut ids = Mat::default();
    let mut marker_corners = Vector::<Mat>::new();
    let mut marker_ids = Mat::default();

    detector
        .detect_board(image, &mut corners, &mut ids, &mut marker_corners, &mut marker_ids)
        .context("detect_board failed")?;

    Ok(BoardDetection {
        corner_count: ids.rows(),
        marker_count: marker_ids.rows(),
        corners,
        ids,
    })
}

/// Sub-pixel refinement on a grayscale image (11x11 window)
pub fn refine_corners(gray: &Mat, corners: &mut Mat) -> Result<()> {
    let criteria = TermCriteria::new(
        TermCriteria_Type::COUNT as i32 + TermCriteria_Type::EPS as i32,
        30,
        0.001,
    )?;
    imgproc::corner_sub_pix(gray, corners, Size::new(11, 11), Size::new(-1, -1), criteria)
        .context("cornerSubPix failed")?;
    Ok(())
}

// --- Intrinsic calibration ---

/// Outcome for one calibration image
pub enum ImageResult {
    Used { corners: i32 },
    TooFewCorners { corners: i32 },
    Unreadable,
}

pub struct IntrinsicsRun {
    pub per_image: Vec<(PathBuf, ImageResult)>,
    pub intrinsics: Option<CameraIntrinsics>,
}

/// Calibrate one camera from its `cal_<name>_*.png` images.
///
/// Images need at least `min_corners` ChArUco corners; calibration needs at
/// least `min_images` such images. `intrinsics` is `None` otherwise.
pub fn calibrate_from_images(
    name: &str,
    paths: &[PathBuf],
    board: &CharucoBoard,
    detector: &CharucoDetector,
    config: &CalibrationConfig,
) -> Result<IntrinsicsRun> {
    let mut per_image = Vec::with_capacity(paths.len());
    let mut all_corners: Vec<Mat> = Vec::new();
    let mut all_ids: Vec<Mat> = Vec::new();
    let mut image_size: Option<Size> = None;

    for path in paths {
        let path_str = path.to_string_lossy();
        let gray = imgcodecs::imread(&path_str, imgcodecs::IMREAD_GRAYSCALE)?;
        if gray.empty() {
            per_image.push((path.clone(), ImageResult::Unreadable));
            continue;
        }
        image_size.get_or_insert(Size::new(gray.cols(), gray.rows()));

        let mut detection = detect_board(detector, &gray)?;
        if detection.corner_count < config.min_corners {
            per_image.push((
                path.clone(),
                ImageResult::TooFewCorners {
                    corners: detection.corner_count,
                },
            ));
            continue;
        }

        refine_corners(&gray, &mut detection.corners)?;
        per_image.push((
            path.clone(),
            ImageResult::Used {
                corners: detection.corner_count,
            },
        ));
        all_corners.push(detection.corners);
        all_ids.push(detection.ids);
    }

    let size = match image_size {
        Some(size) if all_corners.len() >= config.min_images => size,
        _ => {
            return Ok(IntrinsicsRun {
                per_image,
                intrinsics: None,
            })
        }
    };

    let (camera_matrix, dist_coeffs, error) =
        calibrate_intrinsics(&all_corners, &all_ids, board, size, config.min_images)?;

    let intrinsics = CameraIntrinsics {
        name: name.to_string(),
        width: size.width as u32,
        height: size.height as u32,
        intrinsic_matrix: mat3x3_to_array(&camera_matrix)?,
        dist_coeffs: mat_to_vec(&dist_coeffs)?,
        reprojection_error: error,
        image_count: all_corners.len(),
        board: BoardParams::from_config(config),
    };

    Ok(IntrinsicsRun {
        per_image,
        intrinsics: Some(intrinsics),
    })
}

/// Intrinsics from accumulated corners.
///
/// Returns (camera_matrix, dist_coeffs, reprojection_error)
pub fn calibrate_intrinsics(
    all_corners: &[Mat],
    all_ids: &[Mat],
    board: &CharucoBoard,
    image_size: Size,
    min_frames: usize,
) -> Result<(Mat, Mat, f64)> {
    if all_corners.is_empty() {
        bail!("No calibration frames provided");
    }

    // 3D-2D correspondences per frame
    let mut all_obj_points = Vector::<Mat>::new();
    let mut all_img_points = Vector::<Mat>::new();

    for (corners, ids) in all_corners.iter().zip(all_ids) {
        let mut obj_pts = Mat::default();
        let mut img_pts = Mat::default();
        board
            .match_image_points(corners, ids, &mut obj_pts, &mut img_pts)
            .context("match_image_points failed")?;

        if obj_pts.rows() >= 6 {
            all_obj_points.push(obj_pts);
            all_img_points.push(img_pts);
        }
    }

    if all_obj_points.len() < min_frames {
        bail!(
            "Not enough valid frames for calibration (got {}, need >= {})",
            all_obj_points.len(),
            min_frames
        );
    }

    let mut camera_matrix = Mat::default();
    let mut dist_coeffs = Mat::default();
    let mut rvecs = Mat::default();
    let mut tvecs = Mat::default();

    let criteria = TermCriteria::new(
        TermCriteria_Type::COUNT as i32 + TermCriteria_Type::EPS as i32,
        100,
        1e-6,
    )?;

    let error = calib3d::calibrate_camera(
        &all_obj_points,
        &all_img_points,
        image_size,
        &mut camera_matrix,
        &mut dist_coeffs,
        &mut rvecs,
        &mut tvecs,
        0,
        criteria,
    )
    .context("calibrate_camera failed")?;

    Ok((camera_matrix, dist_coeffs, error))
}

// --- Two-camera alignment ---

/// Corner ids and pixel positions of a detection
pub fn board_corners(detection: &BoardDetection) -> Result<BoardCorners> {
    let mut corners = BoardCorners::default();
    for i in 0..detection.corner_count.max(0) {
        corners.ids.push(*detection.ids.at_2d::<i32>(i, 0)?);
        let pt = detection.corners.at_2d::<Point2f>(i, 0)?;
        corners.points.push([pt.x, pt.y]);
    }
    Ok(corners)
}

/// RANSAC homography source→target with its inlier count.
/// `None` with fewer than 4 points or when no model is found.
pub fn fit_homography(points: &Correspondences, ransac_threshold: f64) -> Result<Option<([f64; 9], usize)>> {
    if points.len() < 4 {
        return Ok(None);
    }
    let to_vector = |pts: &[[f32; 2]]| -> Vector<Point2f> {
        pts.iter().map(|p| Point2f::new(p[0], p[1])).collect()
    };
    let src = to_vector(&points.source);
    let dst = to_vector(&points.target);

    let mut mask = Mat::default();
    let h = calib3d::find_homography(&src, &dst, &mut mask, calib3d::RANSAC, ransac_threshold)
        .context("findHomography failed")?;
    if h.empty() {
        return Ok(None);
    }
    let inliers = core::count_non_zero(&mask)? as usize;
    Ok(Some((mat3x3_to_array(&h)?, inliers)))
}

pub struct AlignmentRun {
    pub per_pair: Vec<(StereoPair, PairResult)>,
    pub homography: Option<Homography>,
}

/// Fit the source→target homography from saved stereo pairs.
///
/// Pairs count when both views share `min_common_corners` ChArUco ids;
/// fitting needs `min_pairs` of them. `homography` is `None` otherwise.
pub fn align_from_pairs(
    source: &str,
    target: &str,
    pairs: &[StereoPair],
    detector: &CharucoDetector,
    config: &CalibrationConfig,
) -> Result<AlignmentRun> {
    let mut per_pair = Vec::with_capacity(pairs.len());
    let mut points = Correspondences::new();
    let mut source_size: Option<Size> = None;
    let mut target_size: Option<Size> = None;

    for pair in pairs {
        let Some(target_path) = &pair.target else {
            per_pair.push((pair.clone(), PairResult::MissingTarget));
            continue;
        };
        let src_img = imgcodecs::imread(&pair.source.to_string_lossy(), imgcodecs::IMREAD_GRAYSCALE)?;
        let dst_img = imgcodecs::imread(&target_path.to_string_lossy(), imgcodecs::IMREAD_GRAYSCALE)?;
        if src_img.empty() || dst_img.empty() {
            per_pair.push((pair.clone(), PairResult::Unreadable));
            continue;
        }
        source_size.get_or_insert(Size::new(src_img.cols(), src_img.rows()));
        target_size.get_or_insert(Size::new(dst_img.cols(), dst_img.rows()));

        let src = board_corners(&detect_board(detector, &src_img)?)?;
        let dst = board_corners(&detect_board(detector, &dst_img)?)?;
        let result = points.add_pair(&src, &dst, config.min_common_corners);
        per_pair.push((pair.clone(), result));
    }

    let (Some(source_size), Some(target_size)) = (source_size, target_size) else {
        return Ok(AlignmentRun { per_pair, homography: None });
    };
    if points.pairs < config.min_pairs {
        return Ok(AlignmentRun { per_pair, homography: None });
    }
    let Some((matrix, inlier_count)) = fit_homography(&points, config.ransac_threshold)? else {
        return Ok(AlignmentRun { per_pair, homography: None });
    };

    let homography = Homography {
        source: source.to_string(),
        target: target.to_string(),
        matrix,
        source_width: source_size.width as u32,
        source_height: source_size.height as u32,
        target_width: target_size.width as u32,
        target_height: target_size.height as u32,
        pair_count: points.pairs,
        point_count: points.len(),
        inlier_count,
        ransac_threshold: config.ransac_threshold,
    };
    Ok(AlignmentRun {
        per_pair,
        homography: Some(homography),
    })
}

/// Warp `frame` by `h` into an image of `size`
pub fn warp_frame(frame: &Mat, h: &Matrix3<f64>, size: Size) -> Result<Mat> {
    let rows = [
        [h[(0, 0)], h[(0, 1)], h[(0, 2)]],
        [h[(1, 0)], h[(1, 1)], h[(1, 2)]],
        [h[(2, 0)], h[(2, 1)], h[(2, 2)]],
    ];
    let m = Mat::from_slice_2d(&rows)?;
    let mut warped = Mat::default();
    imgproc::warp_perspective_def(frame, &mut warped, &m, size).context("warpPerspective failed")?;
    Ok(warped)
}

// --- Mat helpers ---

/// 3x3 Mat (f64) → [f64; 9] row-major
pub fn mat3x3_to_array(mat: &Mat) -> Result<[f64; 9]> {
    if mat.rows() != 3 || mat.cols() != 3 {
        bail!("Expected 3x3 matrix, got {}x{}", mat.rows(), mat.cols());
    }
    let mut arr = [0.0f64; 9];
    for r in 0..3 {
        for c in 0..3 {
            arr[r * 3 + c] = *mat.at_2d::<f64>(r as i32, c as i32)?;
        }
    }
    Ok(arr)
}

/// Vec<f64> from Mat (Nx1 or 1xN)
pub fn mat_to_vec(mat: &Mat) -> Result<Vec<f64>> {
    let n = mat.rows().max(mat.cols()) as usize;
    let is_row = mat.rows() == 1;
    let mut v = Vec::with_capacity(n);
    for i in 0..n as i32 {
        let val = if is_row { *mat.at_2d::<f64>(0, i)? } else { *mat.at_2d::<f64>(i, 0)? };
        v.push(val);
    }
    Ok(v)
}
