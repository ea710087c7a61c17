//! Two-camera alignment: stereo pair files, ChArUco correspondences shared
//! by both views, and the source→target homography fitted from them.

use anyhow::{Context, Result};
use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Pixel-space homography from the source camera to the target camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub source: String,
    pub target: String,
    /// Row-major 3x3
    pub matrix: [f64; 9],
    /// Image sizes the matrix was fitted at
    pub source_width: u32,
    pub source_height: u32,
    pub target_width: u32,
    pub target_height: u32,
    pub pair_count: usize,
    pub point_count: usize,
    pub inlier_count: usize,
    pub ransac_threshold: f64,
}

impl Homography {
    pub fn matrix3(&self) -> Matrix3<f64> {
        Matrix3::from_row_slice(&self.matrix)
    }

    /// Matrix for frames at other resolutions than the fitted ones.
    ///
    /// `source` is the actual input size, `output` the size of the warped
    /// image. Both are relative to the fitted source/target sizes.
    pub fn for_resolution(&self, source: (u32, u32), output: (u32, u32)) -> Matrix3<f64> {
        let ratio = |actual: u32, fitted: u32| {
            if fitted == 0 { 1.0 } else { actual as f64 / fitted as f64 }
        };
        rescale(
            &self.matrix3(),
            (ratio(source.0, self.source_width), ratio(source.1, self.source_height)),
            (ratio(output.0, self.target_width), ratio(output.1, self.target_height)),
        )
    }
}

/// `S_target · H · S_source⁻¹`. Zero source scales are treated as 1.
pub fn rescale(h: &Matrix3<f64>, source_scale: (f64, f64), target_scale: (f64, f64)) -> Matrix3<f64> {
    let inv = |s: f64| if s == 0.0 { 1.0 } else { 1.0 / s };
    let s_target = Matrix3::new_nonuniform_scaling(&Vector2::new(target_scale.0, target_scale.1));
    let s_source_inv =
        Matrix3::new_nonuniform_scaling(&Vector2::new(inv(source_scale.0), inv(source_scale.1)));
    s_target * h * s_source_inv
}

/// Map one pixel. `None` when it lands on the line at infinity.
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> Option<(f64, f64)> {
    let p = h * Vector3::new(x, y, 1.0);
    if p.z.abs() < 1e-12 {
        return None;
    }
    Some((p.x / p.z, p.y / p.z))
}

pub fn save_homography<P: AsRef<Path>>(path: P, homography: &Homography) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(homography)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write homography file {}", path.display()))?;
    Ok(())
}

pub fn load_homography<P: AsRef<Path>>(path: P) -> Result<Homography> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read homography file {}", path.display()))?;
    let homography: Homography = serde_json::from_str(&content)
        .with_context(|| format!("Malformed homography file {}", path.display()))?;
    Ok(homography)
}

/// `<output_dir>/<source>_to_<target>_homography.json`
pub fn homography_path(output_dir: &str, source: &str, target: &str) -> PathBuf {
    Path::new(output_dir).join(format!("{}_to_{}_homography.json", source, target))
}

// --- Stereo pair files ---

/// Slot 0 is the source camera, slot 1 the target
pub fn pair_path(dir: &Path, slot: u8, index: usize) -> PathBuf {
    dir.join(format!("pair{}_{:03}.png", slot, index))
}

/// One saved stereo pair. `target` is `None` when the slot-1 image is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoPair {
    pub index: usize,
    pub source: PathBuf,
    pub target: Option<PathBuf>,
}

/// Every `pair0_NNN.png` in `dir`, by index, with its `pair1_NNN.png`
pub fn list_pairs(dir: &Path) -> Result<Vec<StereoPair>> {
    let mut pairs: Vec<StereoPair> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read image dir {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?;
            if path.extension()? != "png" {
                return None;
            }
            let index = stem.strip_prefix("pair0_")?.parse::<usize>().ok()?;
            let target = pair_path(dir, 1, index);
            Some(StereoPair {
                index,
                target: target.exists().then_some(target),
                source: path,
            })
        })
        .collect();
    pairs.sort_by_key(|p| p.index);
    Ok(pairs)
}

/// First pair index not yet used in either slot
pub fn next_pair_index(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| {
            let name = entry.ok()?.file_name();
            let stem = Path::new(&name).file_stem()?.to_str()?.to_string();
            let rest = stem.strip_prefix("pair0_").or_else(|| stem.strip_prefix("pair1_"))?;
            rest.parse::<usize>().ok()
        })
        .max()
        .map_or(0, |n| n + 1)
}

// --- Correspondences ---

/// ChArUco corners detected in one image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardCorners {
    pub ids: Vec<i32>,
    pub points: Vec<[f32; 2]>,
}

impl BoardCorners {
    pub fn len(&self) -> usize {
        self.ids.len().min(self.points.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Corners seen by both cameras, ordered by corner id. A repeated id keeps
/// its first point.
pub fn common_corners(source: &BoardCorners, target: &BoardCorners) -> Vec<(i32, [f32; 2], [f32; 2])> {
    let mut by_id: HashMap<i32, [f32; 2]> = HashMap::new();
    for (&id, &point) in target.ids.iter().zip(&target.points) {
        by_id.entry(id).or_insert(point);
    }

    let mut ordered: BTreeMap<i32, [f32; 2]> = BTreeMap::new();
    for (&id, &point) in source.ids.iter().zip(&source.points) {
        ordered.entry(id).or_insert(point);
    }

    ordered
        .into_iter()
        .filter_map(|(id, src)| by_id.get(&id).map(|&dst| (id, src, dst)))
        .collect()
}

/// Outcome for one stereo pair
#[derive(Debug, Clone, PartialEq)]
pub enum PairResult {
    Used { common: usize },
    TooFewCommon { common: usize },
    TooFewCorners { source: usize, target: usize },
    MissingTarget,
    Unreadable,
}

/// Matched points accumulated over all usable pairs
#[derive(Debug, Clone, Default)]
pub struct Correspondences {
    pub source: Vec<[f32; 2]>,
    pub target: Vec<[f32; 2]>,
    pub pairs: usize,
}

impl Correspondences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one pair's detections. Each side needs `min_common` corners and
    /// they must share at least that many ids; otherwise nothing is added.
    pub fn add_pair(&mut self, source: &BoardCorners, target: &BoardCorners, min_common: usize) -> PairResult {
        if source.len() < min_common || target.len() < min_common {
            return PairResult::TooFewCorners {
                source: source.len(),
                target: target.len(),
            };
        }
        let matches = common_corners(source, target);
        if matches.len() < min_common {
            return PairResult::TooFewCommon {
                common: matches.len(),
            };
        }
        for (_, src, dst) in &matches {
            self.source.push(*src);
            self.target.push(*dst);
        }
        self.pairs += 1;
        PairResult::Used {
            common: matches.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}
