use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::imageops::FilterType;
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::material::Material;
use crate::ops::geometry::Point;
use crate::overlay::{Overlay, OverlaySequence};

// ============================================================================
// POINT LISTS — "x,y,x,y,..."
// ============================================================================

/// Flatten a polygon into `x,y,x,y,…`.
pub fn points_to_string(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse `x,y,x,y,…`. Whitespace around numbers is allowed; an empty string
/// is an empty polygon.
pub fn parse_points(s: &str) -> Result<Vec<Point>, RecordError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let values = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .ok_or_else(|| RecordError::InvalidFormat(format!("bad coordinate '{}'", v.trim())))
        })
        .collect::<Result<Vec<f64>, _>>()?;
    if values.len() % 2 != 0 {
        return Err(RecordError::InvalidFormat(format!(
            "odd number of coordinates ({})",
            values.len()
        )));
    }
    Ok(values.chunks_exact(2).map(|c| Point::new(c[0], c[1])).collect())
}

// ============================================================================
// IMAGES
// ============================================================================

/// Decode any format the `image` crate understands into RGBA.
pub fn load_image(path: &Path) -> Result<RgbaImage, RecordError> {
    Ok(image::open(path)?.to_rgba8())
}

/// Downscale so neither edge exceeds `max_edge`, keeping the aspect ratio.
/// Images already within bounds are returned untouched.
pub fn bound_material(image: RgbaImage, max_edge: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    let max_edge = max_edge.max(1);
    if w <= max_edge && h <= max_edge {
        return image;
    }
    let scale = max_edge as f64 / w.max(h) as f64;
    let nw = ((w as f64 * scale).round() as u32).clamp(1, max_edge);
    let nh = ((h as f64 * scale).round() as u32).clamp(1, max_edge);
    log::debug!("downscaling material {}x{} -> {}x{}", w, h, nw, nh);
    image::imageops::resize(&image, nw, nh, FilterType::Triangle)
}

/// Load a material texture named after its file stem, bounded to `max_edge`.
pub fn load_material(path: &Path, max_edge: u32) -> Result<Material, RecordError> {
    let image = load_image(path)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(RecordError::InvalidFormat(format!("{} is empty", path.display())));
    }
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "material".to_string());
    Ok(Material::new(name, bound_material(image, max_edge)))
}

pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), RecordError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

// ============================================================================
// OVERLAY RECORDS — PNG buffers plus a bincode manifest
// ============================================================================

const MANIFEST_MAGIC: &str = "MFO1";
const MANIFEST_FILE: &str = "overlays.bin";
/// Maximum number of overlays accepted from a manifest.
const MAX_OVERLAYS: usize = 256;
/// Maximum overlay edge accepted from disk.
const MAX_OVERLAY_DIM: u32 = 16_384;

/// Stored form of one overlay; `file` is the PNG holding its pixels,
/// relative to the manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayRecord {
    pub file: String,
    pub points: Vec<Point>,
    pub holes: Vec<Vec<Point>>,
    pub offset_x: f64,
    pub offset_y: f64,
}

#[derive(Serialize, Deserialize)]
struct OverlayManifest {
    magic: String,
    overlays: Vec<OverlayRecord>,
}

/// Error type for overlay record and image operations
#[derive(Debug)]
pub enum RecordError {
    Io(std::io::Error),
    Image(image::ImageError),
    Serialize(String),
    InvalidFormat(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Io(e) => write!(f, "I/O error: {}", e),
            RecordError::Image(e) => write!(f, "Image error: {}", e),
            RecordError::Serialize(e) => write!(f, "Serialization error: {}", e),
            RecordError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for RecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordError::Io(e) => Some(e),
            RecordError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RecordError {
    fn from(e: std::io::Error) -> Self {
        RecordError::Io(e)
    }
}

impl From<image::ImageError> for RecordError {
    fn from(e: image::ImageError) -> Self {
        RecordError::Image(e)
    }
}

impl From<Box<bincode::ErrorKind>> for RecordError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        RecordError::Serialize(e.to_string())
    }
}

/// Write every overlay as `overlay_NNN.png` in `dir` plus the manifest.
/// Returns the number of overlays written.
pub fn save_overlays(dir: &Path, overlays: &OverlaySequence) -> Result<usize, RecordError> {
    std::fs::create_dir_all(dir)?;
    let mut records = Vec::with_capacity(overlays.len());
    for (i, o) in overlays.iter().enumerate() {
        let file = format!("overlay_{:03}.png", i);
        o.pixels().save_with_format(dir.join(&file), ImageFormat::Png)?;
        records.push(OverlayRecord {
            file,
            points: o.polygon().to_vec(),
            holes: o.holes().to_vec(),
            offset_x: o.offset().x,
            offset_y: o.offset().y,
        });
    }

    let manifest = OverlayManifest {
        magic: MANIFEST_MAGIC.to_string(),
        overlays: records,
    };
    let writer = BufWriter::new(File::create(dir.join(MANIFEST_FILE))?);
    bincode::serialize_into(writer, &manifest)?;
    log::info!("saved {} overlays to {}", manifest.overlays.len(), dir.display());
    Ok(manifest.overlays.len())
}

/// Read the manifest in `dir` without touching the PNGs.
pub fn read_manifest(dir: &Path) -> Result<Vec<OverlayRecord>, RecordError> {
    let raw = std::fs::read(dir.join(MANIFEST_FILE))?;
    if raw.len() < 12 {
        return Err(RecordError::InvalidFormat("File too small".into()));
    }
    // bincode writes an 8-byte length before the 4-byte magic string
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != MANIFEST_MAGIC {
        return Err(RecordError::InvalidFormat(format!("Unknown magic '{}'", magic)));
    }

    let manifest: OverlayManifest = bincode::deserialize(&raw)?;
    if manifest.overlays.len() > MAX_OVERLAYS {
        return Err(RecordError::InvalidFormat(format!(
            "Manifest lists {} overlays, which exceeds the maximum of {}",
            manifest.overlays.len(),
            MAX_OVERLAYS
        )));
    }
    Ok(manifest.overlays)
}

/// Rebuild overlays saved by [`save_overlays`], bottom to top.
pub fn load_overlays(dir: &Path) -> Result<Vec<Overlay>, RecordError> {
    let records = read_manifest(dir)?;
    let mut overlays = Vec::with_capacity(records.len());
    for rec in records {
        let name = Path::new(&rec.file);
        if name.components().count() != 1 || name.file_name().is_none() {
            return Err(RecordError::InvalidFormat(format!(
                "Overlay file '{}' must be a plain file name",
                rec.file
            )));
        }
        let pixels = image::open(dir.join(name))?.to_rgba8();
        let (w, h) = pixels.dimensions();
        if w == 0 || h == 0 || w > MAX_OVERLAY_DIM || h > MAX_OVERLAY_DIM {
            return Err(RecordError::InvalidFormat(format!(
                "Overlay '{}' has unsupported size {}x{}",
                rec.file, w, h
            )));
        }
        let offset = Point::new(rec.offset_x, rec.offset_y);
        if !offset.is_finite() {
            return Err(RecordError::InvalidFormat(format!("Overlay '{}' has a bad offset", rec.file)));
        }
        overlays.push(Overlay::rehydrate(pixels, rec.points, rec.holes, offset));
    }
    Ok(overlays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn point_strings() {
        let pts = vec![Point::new(1.0, 2.5), Point::new(-3.0, 4.0)];
        let s = points_to_string(&pts);
        assert_eq!(s, "1,2.5,-3,4");
        assert_eq!(parse_points(&s).unwrap(), pts);
        assert_eq!(parse_points(" 1 , 2 ,3,4 ").unwrap().len(), 2);
        assert!(parse_points("").unwrap().is_empty());
        assert!(parse_points("1,2,3").is_err());
        assert!(parse_points("1,x").is_err());
        assert!(parse_points("1,inf").is_err());
    }

    #[test]
    fn material_is_bounded() {
        let big = RgbaImage::from_pixel(400, 100, Rgba([1, 2, 3, 255]));
        let small = bound_material(big, 100);
        assert_eq!(small.dimensions(), (100, 25));
        let tiny = RgbaImage::new(10, 10);
        assert_eq!(bound_material(tiny, 100).dimensions(), (10, 10));
    }

    #[test]
    fn load_material_uses_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brick.png");
        save_png(&RgbaImage::from_pixel(64, 32, Rgba([200, 50, 50, 255])), &path).unwrap();
        let m = load_material(&path, 16).unwrap();
        assert_eq!(m.name, "brick");
        assert_eq!(m.image.dimensions(), (16, 8));
        assert!(load_material(&dir.path().join("missing.png"), 16).is_err());
    }

    #[test]
    fn overlays_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut seq = OverlaySequence::new();
        let poly = vec![Point::new(5.0, 5.0), Point::new(15.0, 5.0), Point::new(15.0, 15.0)];
        let hole = vec![Point::new(12.0, 7.0), Point::new(14.0, 7.0), Point::new(14.0, 9.0)];
        seq.push(Overlay::rehydrate(
            RgbaImage::from_pixel(10, 10, Rgba([10, 20, 30, 255])),
            poly.clone(),
            vec![hole.clone()],
            Point::new(5.0, 5.0),
        ));
        seq.push(Overlay::rehydrate(
            RgbaImage::from_pixel(4, 6, Rgba([0, 0, 255, 128])),
            Vec::new(),
            Vec::new(),
            Point::new(-2.0, 7.5),
        ));

        assert_eq!(save_overlays(dir.path(), &seq).unwrap(), 2);
        let loaded = load_overlays(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].polygon(), poly.as_slice());
        assert_eq!(loaded[0].holes(), &[hole]);
        assert_eq!(loaded[0].pixels(), seq.get(0).unwrap().pixels());
        assert_eq!(loaded[1].offset(), Point::new(-2.0, 7.5));
        assert_eq!(loaded[1].pixels().dimensions(), (4, 6));
    }

    #[test]
    fn bad_manifests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_overlays(dir.path()), Err(RecordError::Io(_))));

        std::fs::write(dir.path().join(MANIFEST_FILE), b"short").unwrap();
        assert!(matches!(load_overlays(dir.path()), Err(RecordError::InvalidFormat(_))));

        let manifest = OverlayManifest {
            magic: "NOPE".to_string(),
            overlays: Vec::new(),
        };
        std::fs::write(dir.path().join(MANIFEST_FILE), bincode::serialize(&manifest).unwrap()).unwrap();
        assert!(matches!(load_overlays(dir.path()), Err(RecordError::InvalidFormat(_))));

        let escaping = OverlayManifest {
            magic: MANIFEST_MAGIC.to_string(),
            overlays: vec![OverlayRecord {
                file: "../elsewhere.png".to_string(),
                points: Vec::new(),
                holes: Vec::new(),
                offset_x: 0.0,
                offset_y: 0.0,
            }],
        };
        std::fs::write(dir.path().join(MANIFEST_FILE), bincode::serialize(&escaping).unwrap()).unwrap();
        assert!(matches!(load_overlays(dir.path()), Err(RecordError::InvalidFormat(_))));
    }
}
