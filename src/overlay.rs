use std::sync::Arc;

use image::{RgbaImage, imageops};
use uuid::Uuid;

use crate::ops::geometry::{Bounds, Point, find_min_offset, point_in_polygon};
use crate::ops::perspective::Patch;

// ============================================================================
// OVERLAY — one applied material patch
// ============================================================================

/// A material patch placed over the base image.
///
/// The pixel buffer is reference counted: history snapshots share it, and it
/// is released once the last snapshot holding the overlay is dropped. Only
/// the offset (drag) and the position in the sequence (z-order) ever change.
#[derive(Clone, Debug)]
pub struct Overlay {
    id: Uuid,
    pixels: Arc<RgbaImage>,
    polygon: Vec<Point>,
    holes: Vec<Vec<Point>>,
    offset: Point,
}

impl Overlay {
    /// Take ownership of a freshly composited patch.
    pub fn from_patch(patch: Patch, polygon: Vec<Point>, holes: Vec<Vec<Point>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pixels: Arc::new(patch.image),
            polygon,
            holes,
            offset: patch.offset,
        }
    }

    /// Rebuild an overlay from stored data without re-running the compositor.
    pub fn rehydrate(pixels: RgbaImage, polygon: Vec<Point>, holes: Vec<Vec<Point>>, offset: Point) -> Self {
        Self {
            id: Uuid::new_v4(),
            pixels: Arc::new(pixels),
            polygon,
            holes,
            offset,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn polygon(&self) -> &[Point] {
        &self.polygon
    }

    pub fn holes(&self) -> &[Vec<Point>] {
        &self.holes
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    /// Footprint on the base image.
    pub fn bounds(&self) -> Bounds {
        Bounds {
            min_x: self.offset.x,
            min_y: self.offset.y,
            max_x: self.offset.x + self.pixels.width() as f64,
            max_y: self.offset.y + self.pixels.height() as f64,
        }
    }

    /// Is `p` (base-image coordinates) inside this overlay's region? The
    /// region moves with the overlay when it has been dragged.
    pub fn contains(&self, p: Point) -> bool {
        let origin = find_min_offset(&self.polygon);
        let local = Point::new(p.x - (self.offset.x - origin.x), p.y - (self.offset.y - origin.y));
        point_in_polygon(local, &self.polygon, &self.holes)
    }

    pub fn memory_bytes(&self) -> usize {
        self.pixels.as_raw().len()
    }

    fn translate(&mut self, dx: f64, dy: f64) {
        self.offset = self.offset.translate(dx, dy);
    }
}

impl PartialEq for Overlay {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.offset == other.offset
            && self.polygon == other.polygon
            && self.holes == other.holes
            && (Arc::ptr_eq(&self.pixels, &other.pixels) || *self.pixels == *other.pixels)
    }
}

// ============================================================================
// OVERLAY SEQUENCE — paint order
// ============================================================================

/// Overlays in paint order: index 0 is drawn first, the last one on top.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlaySequence {
    overlays: Vec<Overlay>,
}

impl OverlaySequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Overlay> {
        self.overlays.iter()
    }

    pub fn get(&self, z_index: usize) -> Option<&Overlay> {
        self.overlays.get(z_index)
    }

    pub fn find(&self, id: Uuid) -> Option<&Overlay> {
        self.overlays.iter().find(|o| o.id == id)
    }

    pub fn z_index(&self, id: Uuid) -> Option<usize> {
        self.overlays.iter().position(|o| o.id == id)
    }

    /// Append on top; returns the new overlay's z-index.
    pub fn push(&mut self, overlay: Overlay) -> usize {
        self.overlays.push(overlay);
        self.overlays.len() - 1
    }

    pub fn remove(&mut self, id: Uuid) -> Option<Overlay> {
        let idx = self.z_index(id)?;
        Some(self.overlays.remove(idx))
    }

    pub fn clear(&mut self) {
        self.overlays.clear();
    }

    pub fn can_move_to_front(&self, id: Uuid) -> bool {
        self.overlays.len() >= 2 && self.z_index(id).is_some_and(|i| i + 1 < self.overlays.len())
    }

    pub fn can_move_to_back(&self, id: Uuid) -> bool {
        self.overlays.len() >= 2 && self.z_index(id).is_some_and(|i| i > 0)
    }

    /// Move to the last index (drawn on top). No-op when already there.
    pub fn move_to_front(&mut self, id: Uuid) -> bool {
        if !self.can_move_to_front(id) {
            return false;
        }
        let Some(idx) = self.z_index(id) else { return false };
        let overlay = self.overlays.remove(idx);
        self.overlays.push(overlay);
        true
    }

    /// Move to index 0 (drawn first). No-op when already there.
    pub fn move_to_back(&mut self, id: Uuid) -> bool {
        if !self.can_move_to_back(id) {
            return false;
        }
        let Some(idx) = self.z_index(id) else { return false };
        let overlay = self.overlays.remove(idx);
        self.overlays.insert(0, overlay);
        true
    }

    /// Drag an overlay by (dx, dy).
    pub fn translate(&mut self, id: Uuid, dx: f64, dy: f64) -> bool {
        match self.overlays.iter_mut().find(|o| o.id == id) {
            Some(o) if dx != 0.0 || dy != 0.0 => {
                o.translate(dx, dy);
                true
            }
            _ => false,
        }
    }

    /// Topmost overlay whose region contains `p`.
    pub fn hit_test(&self, p: Point) -> Option<Uuid> {
        self.overlays.iter().rev().find(|o| o.contains(p)).map(|o| o.id)
    }

    pub fn memory_bytes(&self) -> usize {
        self.overlays.iter().map(Overlay::memory_bytes).sum()
    }

    /// Draw `base` and then every overlay at its offset, in paint order.
    pub fn flatten(&self, base: &RgbaImage) -> RgbaImage {
        let mut out = base.clone();
        for o in &self.overlays {
            imageops::overlay(
                &mut out,
                o.pixels.as_ref(),
                o.offset.x.round() as i64,
                o.offset.y.round() as i64,
            );
        }
        out
    }
}

impl<'a> IntoIterator for &'a OverlaySequence {
    type Item = &'a Overlay;
    type IntoIter = std::slice::Iter<'a, Overlay>;

    fn into_iter(self) -> Self::IntoIter {
        self.overlays.iter()
    }
}

impl FromIterator<Overlay> for OverlaySequence {
    fn from_iter<I: IntoIterator<Item = Overlay>>(iter: I) -> Self {
        Self {
            overlays: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, c: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(c))
    }

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x0 + size, y0),
            Point::new(x0 + size, y0 + size),
            Point::new(x0, y0 + size),
        ]
    }

    fn overlay_at(x: f64, y: f64, c: [u8; 4]) -> Overlay {
        Overlay::rehydrate(solid(10, 10, c), square(x, y, 10.0), Vec::new(), Point::new(x, y))
    }

    #[test]
    fn z_order_moves() {
        let mut seq = OverlaySequence::new();
        let a = overlay_at(0.0, 0.0, [255, 0, 0, 255]);
        let b = overlay_at(5.0, 5.0, [0, 255, 0, 255]);
        let c = overlay_at(9.0, 9.0, [0, 0, 255, 255]);
        let (ida, idb, idc) = (a.id(), b.id(), c.id());
        assert_eq!(seq.push(a), 0);
        seq.push(b);
        seq.push(c);

        assert!(!seq.can_move_to_front(idc));
        assert!(!seq.move_to_front(idc));
        assert!(!seq.can_move_to_back(ida));

        assert!(seq.move_to_front(ida));
        assert_eq!(seq.z_index(ida), Some(2));
        assert_eq!(seq.z_index(idb), Some(0));

        assert!(seq.move_to_back(idc));
        assert_eq!(seq.z_index(idc), Some(0));
        assert_eq!(seq.iter().map(|o| o.id()).collect::<Vec<_>>(), vec![idc, idb, ida]);
    }

    #[test]
    fn single_overlay_cannot_reorder() {
        let mut seq = OverlaySequence::new();
        let a = overlay_at(0.0, 0.0, [1, 2, 3, 255]);
        let id = a.id();
        seq.push(a);
        assert!(!seq.can_move_to_front(id));
        assert!(!seq.can_move_to_back(id));
        assert!(!seq.move_to_back(id));
    }

    #[test]
    fn remove_and_translate() {
        let mut seq = OverlaySequence::new();
        let a = overlay_at(0.0, 0.0, [1, 2, 3, 255]);
        let id = a.id();
        seq.push(a);
        assert!(seq.translate(id, 4.0, -2.0));
        assert_eq!(seq.find(id).unwrap().offset(), Point::new(4.0, -2.0));
        assert!(!seq.translate(id, 0.0, 0.0));
        assert!(seq.remove(id).is_some());
        assert!(seq.remove(id).is_none());
        assert!(seq.is_empty());
    }

    #[test]
    fn hit_test_prefers_top_and_follows_drag() {
        let mut seq = OverlaySequence::new();
        let low = overlay_at(0.0, 0.0, [255, 0, 0, 255]);
        let high = overlay_at(5.0, 5.0, [0, 0, 255, 255]);
        let (idl, idh) = (low.id(), high.id());
        seq.push(low);
        seq.push(high);
        assert_eq!(seq.hit_test(Point::new(7.0, 7.0)), Some(idh));
        assert_eq!(seq.hit_test(Point::new(2.0, 2.0)), Some(idl));
        assert_eq!(seq.hit_test(Point::new(50.0, 50.0)), None);

        seq.translate(idl, 40.0, 40.0);
        assert_eq!(seq.hit_test(Point::new(45.0, 45.0)), Some(idl));
        assert_eq!(seq.hit_test(Point::new(2.0, 2.0)), None);
    }

    #[test]
    fn flatten_paints_in_order() {
        let base = solid(30, 30, [255, 255, 255, 255]);
        let mut seq = OverlaySequence::new();
        seq.push(overlay_at(0.0, 0.0, [255, 0, 0, 255]));
        seq.push(overlay_at(5.0, 5.0, [0, 0, 255, 255]));
        let out = seq.flatten(&base);
        assert_eq!(*out.get_pixel(2, 2), Rgba([255, 0, 0, 255]));
        assert_eq!(*out.get_pixel(7, 7), Rgba([0, 0, 255, 255]));
        assert_eq!(*out.get_pixel(25, 25), Rgba([255, 255, 255, 255]));
        assert_eq!(seq.memory_bytes(), 2 * 10 * 10 * 4);
    }

    #[test]
    fn clones_share_pixels() {
        let a = overlay_at(0.0, 0.0, [1, 1, 1, 255]);
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.pixels, &b.pixels));
        assert_eq!(a, b);
    }
}
