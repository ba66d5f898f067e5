// ============================================================================
// MASKS — polygon-with-holes rasterization and mask application
// ============================================================================

use image::{GrayImage, RgbaImage};
use rayon::prelude::*;

use super::geometry::{Bounds, Point, find_min_offset, scanline_crossing, translate_polygon};

/// Mask intensity for included pixels.
pub const MASK_ON: u8 = 255;

/// Rasterize `outer` minus `holes` into a `width` × `height` mask.
///
/// Both are translated so the outer polygon's bounding-box origin maps to
/// (0, 0). Pixel `(x, y)` is on exactly when the point `(x + 0.5, y + 0.5)`
/// passes [`point_in_polygon`](super::geometry::point_in_polygon) in those
/// local coordinates (even-odd rule).
pub fn build_mask(width: u32, height: u32, outer: &[Point], holes: &[Vec<Point>]) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    if outer.len() < 3 || width == 0 || height == 0 {
        return mask;
    }

    let origin = find_min_offset(outer);
    let local_outer = translate_polygon(outer, -origin.x, -origin.y);
    fill_polygon(&mut mask, &local_outer, MASK_ON);

    for hole in holes.iter().filter(|h| h.len() >= 3) {
        let local_hole = translate_polygon(hole, -origin.x, -origin.y);
        fill_polygon(&mut mask, &local_hole, 0);
    }
    mask
}

/// Scanline fill at pixel centres: for each row, collect the x-intercepts
/// of every edge crossing the row's centre line and fill between pairs.
fn fill_polygon(mask: &mut GrayImage, ring: &[Point], value: u8) {
    let w = mask.width() as usize;
    let n = ring.len();

    mask.as_mut().par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let yf = y as f64 + 0.5;
        let mut nodes: Vec<f64> = (0..n)
            .filter_map(|i| scanline_crossing(ring[i], ring[(i + 1) % n], yf))
            .collect();
        nodes.sort_by(|a, b| a.total_cmp(b));

        // Pixel x is covered when its centre x + 0.5 falls in [start, end).
        for pair in nodes.chunks_exact(2) {
            let x_start = ((pair[0] - 0.5).ceil().max(0.0) as usize).min(w);
            let x_end = ((pair[1] - 0.5).ceil().max(0.0) as usize).min(w);
            if x_start < x_end {
                row[x_start..x_end].fill(value);
            }
        }
    });
}

/// Replicate a single-channel mask across `channels` interleaved channels
/// (1 for alpha-only use, 3 or 4 to line up with RGB / RGBA buffers).
pub fn expand_mask_channels(mask: &GrayImage, channels: usize) -> Vec<u8> {
    assert!(channels > 0, "mask expansion needs at least one channel");
    let src = mask.as_raw();
    let mut out = vec![0u8; src.len() * channels];
    out.par_chunks_mut(channels)
        .zip(src.par_iter())
        .for_each(|(px, &m)| px.fill(m));
    out
}

/// Combine `image` with `mask` by bytewise AND: pixels under an on mask keep
/// their value, everything else becomes transparent black.
///
/// Panics if the dimensions differ; callers size both from the same bounds.
pub fn apply_mask(image: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    let mut out = image.clone();
    apply_mask_in_place(&mut out, mask);
    out
}

/// In-place variant of [`apply_mask`].
pub fn apply_mask_in_place(image: &mut RgbaImage, mask: &GrayImage) {
    assert_eq!(
        image.dimensions(),
        mask.dimensions(),
        "mask and image dimensions must match"
    );
    let expanded = expand_mask_channels(mask, 4);
    let raw: &mut [u8] = image.as_mut();
    raw.par_iter_mut()
        .zip(expanded.par_iter())
        .for_each(|(c, &m)| *c &= m);
}

/// Tight pixel bounds of the on region, `None` for an empty mask.
/// `max_x` / `max_y` are exclusive.
pub fn mask_bounds(mask: &GrayImage) -> Option<Bounds> {
    let (w, h) = mask.dimensions();
    let mut found: Option<Bounds> = None;
    for y in 0..h {
        for x in 0..w {
            if mask.get_pixel(x, y).0[0] == 0 {
                continue;
            }
            let (fx, fy) = (x as f64, y as f64);
            let b = found.get_or_insert(Bounds {
                min_x: fx,
                min_y: fy,
                max_x: fx + 1.0,
                max_y: fy + 1.0,
            });
            b.min_x = b.min_x.min(fx);
            b.min_y = b.min_y.min(fy);
            b.max_x = b.max_x.max(fx + 1.0);
            b.max_y = b.max_y.max(fy + 1.0);
        }
    }
    found
}
