// ============================================================================
// PERSPECTIVE COMPOSITOR — homography, warp, mask and placement
// ============================================================================

use std::sync::Arc;

use image::{GrayImage, RgbaImage};
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use rayon::prelude::*;

use super::geometry::{
    Bounds, Point, bounding_box, can_make_closed_shape, centroid, cross, find_min_offset,
};
use super::hull::{convex_hull, simplify_hull_to_n};
use super::mask::{apply_mask_in_place, build_mask};

/// Largest patch edge we are willing to allocate, in pixels.
pub const MAX_PATCH_DIM: u32 = 16_384;

/// Largest patch area, in pixels (256 MiB of RGBA).
pub const MAX_PATCH_PIXELS: u64 = 64 * 1024 * 1024;

/// Homogeneous weights this close to zero map to infinity and are skipped.
const W_EPSILON: f64 = 1e-12;

// ---------------------------------------------------------------------------
//  Errors
// ---------------------------------------------------------------------------

/// Why a compositing call produced no patch.
#[derive(Debug, Clone, PartialEq)]
pub enum ComposeError {
    /// The material image has a zero dimension.
    EmptyMaterial,
    /// The polygon cannot enclose an area.
    DegeneratePolygon,
    /// The destination quad is collinear or otherwise singular.
    DegenerateTransform,
    /// The patch would exceed [`MAX_PATCH_DIM`] on one side or
    /// [`MAX_PATCH_PIXELS`] in total.
    TooLarge { width: f64, height: f64 },
}

impl std::fmt::Display for ComposeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComposeError::EmptyMaterial => write!(f, "material image is empty"),
            ComposeError::DegeneratePolygon => write!(f, "polygon does not enclose an area"),
            ComposeError::DegenerateTransform => {
                write!(f, "destination shape is degenerate; no perspective transform exists")
            }
            ComposeError::TooLarge { width, height } => write!(
                f,
                "patch of {:.0}x{:.0} exceeds the {} px edge or {} px area limit",
                width, height, MAX_PATCH_DIM, MAX_PATCH_PIXELS
            ),
        }
    }
}

impl std::error::Error for ComposeError {}

// ---------------------------------------------------------------------------
//  Homography
// ---------------------------------------------------------------------------

/// A planar projective transform (3×3, last entry normalised to 1 when
/// solved from correspondences).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    m: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self { m: Matrix3::identity() }
    }

    pub fn from_matrix(m: Matrix3<f64>) -> Self {
        Self { m }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }

    /// Project a point. `None` when it maps to infinity.
    pub fn map_point(&self, p: Point) -> Option<Point> {
        let v = self.m * Vector3::new(p.x, p.y, 1.0);
        if v.z.abs() < W_EPSILON {
            return None;
        }
        let out = Point::new(v.x / v.z, v.y / v.z);
        out.is_finite().then_some(out)
    }

    pub fn inverse(&self) -> Option<Homography> {
        self.m.try_inverse().map(Homography::from_matrix)
    }

    /// This transform followed by a translation of (dx, dy).
    pub fn then_translate(&self, dx: f64, dy: f64) -> Homography {
        let t = Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0);
        Homography { m: t * self.m }
    }
}

/// Solve the homography taking each `src[i]` to `dst[i]`.
///
/// Builds the standard 8×8 system (h33 fixed to 1) and solves it with an LU
/// decomposition. Collinear or repeated corners make the system singular and
/// return `None`.
pub fn compute_projective_transform(src: &[Point; 4], dst: &[Point; 4]) -> Option<Homography> {
    if is_degenerate_quad(src) || is_degenerate_quad(dst) {
        return None;
    }

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let r = 2 * i;
        a[(r, 0)] = s.x;
        a[(r, 1)] = s.y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -d.x * s.x;
        a[(r, 7)] = -d.x * s.y;
        b[r] = d.x;

        a[(r + 1, 3)] = s.x;
        a[(r + 1, 4)] = s.y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -d.y * s.x;
        a[(r + 1, 7)] = -d.y * s.y;
        b[r + 1] = d.y;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let m = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
    if m.determinant().abs() < W_EPSILON {
        return None;
    }
    Some(Homography { m })
}

/// True when any three corners are (nearly) collinear or coincide.
fn is_degenerate_quad(q: &[Point; 4]) -> bool {
    if q.iter().any(|p| !p.is_finite()) {
        return true;
    }
    let scale = (0..4)
        .flat_map(|i| (0..4).map(move |j| (i, j)))
        .map(|(i, j)| q[i].dist_sq(q[j]))
        .fold(0.0, f64::max);
    if scale <= 0.0 {
        return true;
    }
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    TRIPLES
        .iter()
        .any(|&(a, b, c)| cross(q[a], q[b], q[c]).abs() <= 1e-9 * scale)
}

// ---------------------------------------------------------------------------
//  Warp
// ---------------------------------------------------------------------------

/// How samples outside the source image are resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EdgeMode {
    /// Clamp to the border pixel within one pixel of the edge, transparent
    /// beyond that.
    #[default]
    Clamp,
    /// Tile the source infinitely.
    Wrap,
}

/// Render a `width` × `height` buffer by pulling every destination pixel
/// centre back through `dst_to_src` and bilinearly sampling `src`.
/// Rows are processed in parallel.
pub fn warp_perspective(
    src: &RgbaImage,
    dst_to_src: &Homography,
    width: u32,
    height: u32,
    edge: EdgeMode,
) -> RgbaImage {
    let mut dst = RgbaImage::new(width, height);
    if width == 0 || height == 0 || src.width() == 0 || src.height() == 0 {
        return dst;
    }

    let m = dst_to_src.matrix();
    let (h00, h01, h02) = (m[(0, 0)], m[(0, 1)], m[(0, 2)]);
    let (h10, h11, h12) = (m[(1, 0)], m[(1, 1)], m[(1, 2)]);
    let (h20, h21, h22) = (m[(2, 0)], m[(2, 1)], m[(2, 2)]);

    let row_bytes = width as usize * 4;
    let dst_raw: &mut [u8] = dst.as_mut();

    dst_raw.par_chunks_mut(row_bytes).enumerate().for_each(|(dy, row)| {
        let v = dy as f64 + 0.5;
        let base_sx = h01 * v + h02;
        let base_sy = h11 * v + h12;
        let base_sw = h21 * v + h22;

        for dx in 0..width as usize {
            let u = dx as f64 + 0.5;
            let w = h20 * u + base_sw;
            if w.abs() < W_EPSILON {
                continue;
            }
            let inv_w = 1.0 / w;
            // back to pixel-index space of the source
            let src_x = (h00 * u + base_sx) * inv_w - 0.5;
            let src_y = (h10 * u + base_sy) * inv_w - 0.5;

            if let Some(px) = sample_bilinear(src, src_x, src_y, edge) {
                row[dx * 4..dx * 4 + 4].copy_from_slice(&px);
            }
        }
    });
    dst
}

/// Bilinear sample at a fractional pixel index.
fn sample_bilinear(img: &RgbaImage, x: f64, y: f64, edge: EdgeMode) -> Option<[u8; 4]> {
    let w = img.width() as i64;
    let h = img.height() as i64;
    if w == 0 || h == 0 || !x.is_finite() || !y.is_finite() {
        return None;
    }
    let (x, y) = match edge {
        EdgeMode::Clamp if x < -1.0 || y < -1.0 || x > w as f64 || y > h as f64 => return None,
        EdgeMode::Clamp => (x, y),
        // keep the integer taps small for any scroll distance
        EdgeMode::Wrap => (x.rem_euclid(w as f64), y.rem_euclid(h as f64)),
    };

    let xf = x.floor();
    let yf = y.floor();
    let fx = x - xf;
    let fy = y - yf;
    let (x0, y0) = (xf as i64, yf as i64);

    let fetch = |sx: i64, sy: i64| -> [f64; 4] {
        let (cx, cy) = match edge {
            EdgeMode::Clamp => (sx.clamp(0, w - 1), sy.clamp(0, h - 1)),
            EdgeMode::Wrap => (sx.rem_euclid(w), sy.rem_euclid(h)),
        };
        let p = img.get_pixel(cx as u32, cy as u32).0;
        [p[0] as f64, p[1] as f64, p[2] as f64, p[3] as f64]
    };

    let tl = fetch(x0, y0);
    let tr = fetch(x0 + 1, y0);
    let bl = fetch(x0, y0 + 1);
    let br = fetch(x0 + 1, y0 + 1);

    let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(out)
}

// ---------------------------------------------------------------------------
//  Patches
// ---------------------------------------------------------------------------

/// A warped, masked material patch and where it goes on the base image.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    pub image: RgbaImage,
    /// Top-left placement in base-image coordinates.
    pub offset: Point,
    placeholder: bool,
}

impl Patch {
    pub fn new(image: RgbaImage, offset: Point) -> Self {
        Self { image, offset, placeholder: false }
    }

    /// 1×1 transparent stand-in meaning "nothing to composite".
    pub fn placeholder(offset: Point) -> Self {
        Self {
            image: RgbaImage::new(1, 1),
            offset,
            placeholder: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

/// Integer patch size for a polygon's bounds.
fn patch_size(bounds: &Bounds) -> Result<(u32, u32), ComposeError> {
    let w = bounds.width().round().max(1.0);
    let h = bounds.height().round().max(1.0);
    if w > MAX_PATCH_DIM as f64 || h > MAX_PATCH_DIM as f64 || w * h > MAX_PATCH_PIXELS as f64 {
        return Err(ComposeError::TooLarge { width: w, height: h });
    }
    Ok((w as u32, h as u32))
}

/// Order a quad top-left, top-right, bottom-right, bottom-left (clockwise on
/// screen). `None` unless exactly four points are given.
fn order_quad(points: &[Point]) -> Option<[Point; 4]> {
    let mut quad: [Point; 4] = points.try_into().ok()?;
    let c = centroid(&quad);
    quad.sort_by(|a, b| {
        let ta = (a.y - c.y).atan2(a.x - c.x);
        let tb = (b.y - c.y).atan2(b.x - c.x);
        ta.total_cmp(&tb)
    });
    let start = (0..4)
        .min_by(|&i, &j| (quad[i].x + quad[i].y).total_cmp(&(quad[j].x + quad[j].y)))
        .unwrap_or(0);
    quad.rotate_left(start);
    Some(quad)
}

/// Destination quad for a polygon, in the polygon's local bounding-box frame.
fn destination_quad(outer: &[Point], bounds: &Bounds) -> [Point; 4] {
    let hull = convex_hull(outer);
    let simplified = simplify_hull_to_n(&hull, 4);
    let quad = order_quad(&simplified).unwrap_or_else(|| {
        log::warn!(
            "hull simplification left {} vertices; falling back to bounding box corners",
            simplified.len()
        );
        bounds.corners()
    });
    let origin = bounds.origin();
    quad.map(|p| p - origin)
}

/// Corners of a `w` × `h` image in its own pixel space, shifted by `shift`.
fn material_corners(material: &RgbaImage, shift: Point) -> [Point; 4] {
    let (w, h) = (material.width() as f64, material.height() as f64);
    [
        Point::new(0.0, 0.0) + shift,
        Point::new(w, 0.0) + shift,
        Point::new(w, h) + shift,
        Point::new(0.0, h) + shift,
    ]
}

/// Material-to-patch transform for `outer` with the material scrolled by
/// `scroll`.
pub fn material_transform(
    material: &RgbaImage,
    outer: &[Point],
    scroll: Point,
) -> Result<Homography, ComposeError> {
    let bounds = bounding_box(outer).ok_or(ComposeError::DegeneratePolygon)?;
    let dst = destination_quad(outer, &bounds);
    compute_projective_transform(&material_corners(material, scroll), &dst)
        .ok_or(ComposeError::DegenerateTransform)
}

/// Warp `material` onto `outer`, cut out `holes`, and report the placement.
///
/// A polygon that cannot make a closed shape yields a 1×1 placeholder patch
/// rather than an error. Resource problems (empty material, oversized patch,
/// singular transform) produce no patch at all.
pub fn warp_and_mask(
    material: &RgbaImage,
    outer: &[Point],
    holes: &[Vec<Point>],
) -> Result<Patch, ComposeError> {
    if !can_make_closed_shape(outer) {
        return Ok(Patch::placeholder(find_min_offset(outer)));
    }
    if material.width() == 0 || material.height() == 0 {
        return Err(ComposeError::EmptyMaterial);
    }
    let Some(bounds) = bounding_box(outer) else {
        return Ok(Patch::placeholder(Point::ORIGIN));
    };
    let (w, h) = patch_size(&bounds)?;

    let forward = material_transform(material, outer, Point::ORIGIN)?;
    let inverse = forward.inverse().ok_or(ComposeError::DegenerateTransform)?;

    let mut warped = warp_perspective(material, &inverse, w, h, EdgeMode::Clamp);
    let mask = build_mask(w, h, outer, holes);
    apply_mask_in_place(&mut warped, &mask);

    log::debug!(
        "warped {}x{} material onto {}x{} patch at ({:.1}, {:.1})",
        material.width(),
        material.height(),
        w,
        h,
        bounds.min_x,
        bounds.min_y
    );
    Ok(Patch::new(warped, bounds.origin()))
}

// ---------------------------------------------------------------------------
//  Scrollable material
// ---------------------------------------------------------------------------

/// A material bound to a destination polygon with its transform solved once.
///
/// Scrolling re-renders by composing a translation onto the cached inverse
/// instead of re-solving the homography. Sampling wraps, so the material
/// reads as an endless tile.
pub struct PerspectiveMaterial {
    material: Arc<RgbaImage>,
    dst_to_src: Homography,
    mask: GrayImage,
    offset: Point,
    scroll: Point,
    rendered: RgbaImage,
}

impl PerspectiveMaterial {
    pub fn new(
        material: Arc<RgbaImage>,
        outer: &[Point],
        holes: &[Vec<Point>],
    ) -> Result<Self, ComposeError> {
        if !can_make_closed_shape(outer) {
            return Err(ComposeError::DegeneratePolygon);
        }
        if material.width() == 0 || material.height() == 0 {
            return Err(ComposeError::EmptyMaterial);
        }
        let bounds = bounding_box(outer).ok_or(ComposeError::DegeneratePolygon)?;
        let (w, h) = patch_size(&bounds)?;
        let dst_to_src = material_transform(&material, outer, Point::ORIGIN)?
            .inverse()
            .ok_or(ComposeError::DegenerateTransform)?;
        let mask = build_mask(w, h, outer, holes);

        let mut pm = Self {
            material,
            dst_to_src,
            mask,
            offset: bounds.origin(),
            scroll: Point::ORIGIN,
            rendered: RgbaImage::new(w, h),
        };
        pm.rendered = pm.render_at(0.0, 0.0);
        Ok(pm)
    }

    /// Render the masked patch with the material scrolled by (dx, dy)
    /// material pixels.
    pub fn render_at(&self, dx: f64, dy: f64) -> RgbaImage {
        let shifted = self.dst_to_src.then_translate(dx, dy);
        let (w, h) = self.mask.dimensions();
        let mut out = warp_perspective(&self.material, &shifted, w, h, EdgeMode::Wrap);
        apply_mask_in_place(&mut out, &self.mask);
        out
    }

    /// Move to an absolute scroll position and re-render.
    pub fn scroll_to(&mut self, dx: f64, dy: f64) -> &RgbaImage {
        self.scroll = Point::new(dx, dy);
        self.rendered = self.render_at(dx, dy);
        &self.rendered
    }

    pub fn scroll_by(&mut self, ddx: f64, ddy: f64) -> &RgbaImage {
        let target = self.scroll.translate(ddx, ddy);
        self.scroll_to(target.x, target.y)
    }

    pub fn rendered(&self) -> &RgbaImage {
        &self.rendered
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn scroll(&self) -> Point {
        self.scroll
    }

    /// Hand the current rendering over as a placed patch.
    pub fn into_patch(self) -> Patch {
        Patch::new(self.rendered, self.offset)
    }
}
