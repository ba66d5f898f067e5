// ============================================================================
// MaterialFE CLI — headless compositing via command-line arguments
// ============================================================================
//
// Usage examples:
//   MaterialFE --base room.jpg --overlay brick.png@40,60,300,50,310,240,35,250 --output out.png
//   MaterialFE -b room.jpg -O wood.jpg@0,0,100,0,100,100,0,100|20,20,40,20,40,40 -o out.png
//   MaterialFE -b room.jpg --restore saved/ --project-dir saved/ -o out.png -v
//
// Each --overlay is MATERIAL@x,y,x,y,...[|hole x,y,...]... and is applied in
// order, so later overlays are drawn on top.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::{DynamicImage, ImageFormat, RgbaImage};

use materialfe::io::{RecordError, load_image, load_material, load_overlays, parse_points, save_overlays};
use materialfe::logger;
use materialfe::{CompositorSettings, EditingSession, MaterialCatalog, Point};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// MaterialFE headless material compositor.
#[derive(Parser, Debug)]
#[command(
    name = "MaterialFE",
    about = "Warp material textures onto polygon regions of a photo",
    long_about = "Perspective-warp material textures onto polygon regions of a base\n\
                  image and write the flattened result.\n\n\
                  Example:\n  \
                  MaterialFE --base room.jpg --overlay brick.png@40,60,300,50,310,240,35,250 --output out.png"
)]
pub struct CliArgs {
    /// Base image to composite onto.
    #[arg(short, long, value_name = "IMAGE")]
    pub base: PathBuf,

    /// MATERIAL@x,y,x,y,... with optional |x,y,... holes. Repeatable; applied in order.
    #[arg(short = 'O', long = "overlay", value_name = "SPEC")]
    pub overlays: Vec<String>,

    /// Flattened output image. Format follows the extension, PNG otherwise.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Restore overlays saved earlier in this directory before applying new ones.
    #[arg(long, value_name = "DIR")]
    pub restore: Option<PathBuf>,

    /// Save the resulting overlays (PNG + manifest) to this directory.
    #[arg(long, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,

    /// Downscale materials so neither edge exceeds this many pixels.
    #[arg(long, value_name = "PX")]
    pub max_material_edge: Option<u32>,

    /// Echo log output to stderr and print per-overlay timing.
    #[arg(short, long)]
    pub verbose: bool,
}

/// One parsed `--overlay` argument.
#[derive(Debug, PartialEq)]
struct OverlaySpec {
    material: PathBuf,
    points: Vec<Point>,
    holes: Vec<Vec<Point>>,
}

fn parse_overlay_spec(spec: &str) -> Result<OverlaySpec, String> {
    let (material, geometry) = spec
        .rsplit_once('@')
        .ok_or_else(|| format!("overlay '{}' is missing '@' between material and points", spec))?;
    if material.is_empty() {
        return Err(format!("overlay '{}' names no material", spec));
    }
    let mut rings = geometry.split('|');
    let outer = rings.next().unwrap_or("");
    let points = parse_points(outer).map_err(|e| format!("overlay '{}': {}", spec, e))?;
    let holes = rings
        .map(parse_points)
        .collect::<Result<Vec<_>, RecordError>>()
        .map_err(|e| format!("overlay '{}': {}", spec, e))?;
    Ok(OverlaySpec {
        material: PathBuf::from(material),
        points,
        holes,
    })
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the compositing job and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let mut settings = CompositorSettings::load();
    if let Some(edge) = args.max_material_edge {
        settings.max_material_edge = edge.max(1);
    }
    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        settings.log_level_filter()
    };
    logger::init(level, args.verbose);

    match run_job(&args, settings) {
        Ok(count) => {
            if args.verbose {
                println!("{} overlays -> {}", count, args.output.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_job(args: &CliArgs, settings: CompositorSettings) -> Result<usize, String> {
    let specs = args
        .overlays
        .iter()
        .map(|s| parse_overlay_spec(s))
        .collect::<Result<Vec<_>, _>>()?;

    let base = load_image(&args.base).map_err(|e| format!("load '{}' failed: {}", args.base.display(), e))?;

    // each distinct material file is decoded once
    let mut catalog = MaterialCatalog::new();
    let mut material_paths: Vec<PathBuf> = Vec::new();
    let mut spec_material = Vec::with_capacity(specs.len());
    for spec in &specs {
        let idx = match material_paths.iter().position(|p| *p == spec.material) {
            Some(i) => i,
            None => {
                let m = load_material(&spec.material, settings.max_material_edge)
                    .map_err(|e| format!("material '{}' failed: {}", spec.material.display(), e))?;
                material_paths.push(spec.material.clone());
                catalog.push(m)
            }
        };
        spec_material.push(idx);
    }

    let mut session = EditingSession::new(settings);
    session.load_base_image(base);
    session.set_catalog(catalog);

    if let Some(dir) = &args.restore {
        let restored = load_overlays(dir).map_err(|e| format!("restore '{}' failed: {}", dir.display(), e))?;
        let n = session.restore_overlays(restored);
        log::info!("restored {} overlays from {}", n, dir.display());
    }

    for (spec, &material) in specs.iter().zip(&spec_material) {
        let started = Instant::now();
        apply_one(&mut session, spec, material)?;
        if args.verbose {
            println!(
                "  {} ({:.0}ms)",
                spec.material.display(),
                started.elapsed().as_secs_f64() * 1000.0
            );
        }
    }

    let flat = session.flatten().ok_or_else(|| "no base image".to_string())?;
    write_output(&flat, &args.output).map_err(|e| format!("save '{}' failed: {}", args.output.display(), e))?;

    if let Some(dir) = &args.project_dir {
        save_overlays(dir, session.overlays()).map_err(|e| format!("save overlays failed: {}", e))?;
    }
    Ok(session.overlays().len())
}

fn apply_one(session: &mut EditingSession, spec: &OverlaySpec, material: usize) -> Result<(), String> {
    session.select_material(Some(material));
    session.clear_draft();
    for p in &spec.points {
        session.add_point(*p);
    }
    for hole in &spec.holes {
        session.add_hole(hole.clone());
    }

    let task = session.start_apply().map_err(|e| format!("{}: {}", spec.material.display(), e))?;
    let outcome = match pollster::block_on(task.wait()) {
        Ok(outcome) => outcome,
        Err(e) => {
            session.cancel_apply();
            return Err(format!("{}: {}", spec.material.display(), e));
        }
    };
    session
        .complete_apply(outcome)
        .map(|_| ())
        .map_err(|e| format!("{}: {}", spec.material.display(), e))
}

/// Write the flattened image, choosing the format from the extension.
fn write_output(image: &RgbaImage, path: &Path) -> Result<(), image::ImageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(image::ImageError::IoError)?;
    }
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
    match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .save_with_format(path, ImageFormat::Jpeg),
        ImageFormat::Bmp => image.save_with_format(path, format),
        _ => image.save_with_format(path, ImageFormat::Png),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_spec_parsing() {
        let spec = parse_overlay_spec("tiles/brick.png@0,0,10,0,10,10|2,2,4,2,4,4").unwrap();
        assert_eq!(spec.material, PathBuf::from("tiles/brick.png"));
        assert_eq!(spec.points.len(), 3);
        assert_eq!(spec.holes.len(), 1);
        assert_eq!(spec.holes[0][1], Point::new(4.0, 2.0));

        assert!(parse_overlay_spec("brick.png").is_err());
        assert!(parse_overlay_spec("@1,2,3,4").is_err());
        assert!(parse_overlay_spec("brick.png@1,2,3").is_err());
    }

    #[test]
    fn args_parse() {
        let args = CliArgs::try_parse_from([
            "MaterialFE",
            "--base",
            "room.png",
            "-O",
            "a.png@0,0,1,0,1,1",
            "--overlay",
            "b.png@0,0,2,0,2,2",
            "-o",
            "out.png",
            "--max-material-edge",
            "512",
        ])
        .unwrap();
        assert_eq!(args.overlays.len(), 2);
        assert_eq!(args.max_material_edge, Some(512));
        assert!(!args.verbose);
        assert!(CliArgs::try_parse_from(["MaterialFE", "--base", "x.png"]).is_err());
    }
}
