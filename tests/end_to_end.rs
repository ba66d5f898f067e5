use image::{Rgba, RgbaImage};
use materialfe::{ApplyError, EditAction, EditingSession, Material, MaterialCatalog, Point, io};

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point> {
    vec![
        Point::new(x0, y0),
        Point::new(x1, y0),
        Point::new(x1, y1),
        Point::new(x0, y1),
    ]
}

fn session_with_materials() -> EditingSession {
    let mut s = EditingSession::default();
    s.load_base_image(RgbaImage::from_pixel(400, 300, Rgba([255, 255, 255, 255])));
    let catalog: MaterialCatalog = [
        Material::new("red", RgbaImage::from_pixel(100, 100, RED)),
        Material::new("blue", RgbaImage::from_pixel(100, 100, BLUE)),
    ]
    .into_iter()
    .collect();
    s.set_catalog(catalog);
    s
}

fn draw(s: &mut EditingSession, polygon: &[Point]) {
    for p in polygon {
        assert!(s.add_point(*p));
    }
}

#[test]
fn red_then_blue_then_undo() {
    let mut s = session_with_materials();

    s.select_material(Some(0));
    draw(&mut s, &rect(50.0, 50.0, 150.0, 150.0));
    let red = s.apply_material().unwrap();

    assert_eq!(s.overlays().len(), 1);
    let o = s.overlays().find(red).unwrap();
    assert_eq!(o.offset(), Point::new(50.0, 50.0));
    assert_eq!(o.pixels().dimensions(), (100, 100));
    assert!(o.pixels().pixels().all(|p| *p == RED));
    assert_eq!(s.overlays().z_index(red), Some(0));

    s.select_material(Some(1));
    draw(&mut s, &rect(200.0, 100.0, 300.0, 200.0));
    let blue = s.apply_material().unwrap();

    assert_eq!(s.overlays().len(), 2);
    assert_eq!(s.overlays().z_index(blue), Some(1));
    assert_eq!(s.overlays().find(blue).unwrap().offset(), Point::new(200.0, 100.0));

    let flat = s.flatten().unwrap();
    assert_eq!(*flat.get_pixel(100, 100), RED);
    assert_eq!(*flat.get_pixel(250, 150), BLUE);
    assert_eq!(*flat.get_pixel(10, 10), Rgba([255, 255, 255, 255]));

    assert!(s.undo());
    assert_eq!(s.overlays().len(), 1);
    assert!(s.overlays().find(red).is_some());
    assert!(s.overlays().find(blue).is_none());
    assert!(s.can_redo());
    assert!(s.state().can_redo);
}

#[test]
fn n_applies_undo_and_redo() {
    let mut s = session_with_materials();
    s.select_material(Some(0));
    assert!(!s.can_undo());

    let n = 4;
    let mut sequences = vec![s.overlays().clone()];
    for i in 0..n {
        let x = 10.0 + i as f64 * 60.0;
        draw(&mut s, &rect(x, 20.0, x + 50.0, 70.0));
        assert!(s.perform(EditAction::ApplyMaterial).unwrap());
        sequences.push(s.overlays().clone());
    }
    assert_eq!(s.overlays().len(), n);

    for i in (0..n).rev() {
        assert!(s.perform(EditAction::Undo).unwrap());
        assert_eq!(s.overlays(), &sequences[i]);
    }
    assert!(s.overlays().is_empty());
    assert!(!s.can_undo());
    assert!(!s.state().can_undo);
    assert!(!s.perform(EditAction::Undo).unwrap());
    // loading and selecting are not undone
    assert_eq!(s.catalog().len(), 2);
    assert_eq!(s.selected_material(), Some(0));

    for i in 1..=n {
        assert!(s.perform(EditAction::Redo).unwrap());
        assert_eq!(s.overlays(), &sequences[i]);
    }
    assert!(!s.can_redo());

    // undoing an apply gives the polygon back; applying it again
    // discards the redo branch
    assert!(s.undo());
    assert!(s.can_redo());
    let x = 10.0 + (n - 1) as f64 * 60.0;
    assert_eq!(s.draft().points, rect(x, 20.0, x + 50.0, 70.0));
    let again = s.apply_material().unwrap();
    assert!(!s.can_redo());
    assert_eq!(s.overlays().len(), n);
    assert_eq!(s.overlays().z_index(again), Some(n - 1));
}

#[test]
fn background_apply_and_reload() {
    let mut s = session_with_materials();
    s.select_material(Some(1));
    draw(&mut s, &[Point::new(20.0, 20.0), Point::new(120.0, 40.0), Point::new(60.0, 140.0)]);

    let task = s.start_apply().unwrap();
    assert_eq!(s.apply_material(), Err(ApplyError::Busy));
    let outcome = pollster::block_on(task.wait()).unwrap();
    let id = s.complete_apply(outcome).unwrap();

    let dir = tempfile::tempdir().unwrap();
    io::save_overlays(dir.path(), s.overlays()).unwrap();

    let mut fresh = session_with_materials();
    let restored = io::load_overlays(dir.path()).unwrap();
    assert_eq!(fresh.restore_overlays(restored), 1);
    let before = s.overlays().find(id).unwrap();
    let after = fresh.overlays().get(0).unwrap();
    assert_eq!(after.pixels(), before.pixels());
    assert_eq!(after.offset(), before.offset());
    assert_eq!(after.polygon(), before.polygon());
    assert_eq!(fresh.flatten(), s.flatten());
}
