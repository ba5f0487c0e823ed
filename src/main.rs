//! Headless session driver: opens a slide on synthetic tiles, drives the viewport
//! through a short scripted tour and optionally exports the annotations.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use slideview::export::ExportRegistry;
use slideview::model::{AnnotationTool, LabelClass, LabelSchema};
use slideview::pyramid::{ImagePlane, ThreadedFetcher};
use slideview::repository::JsonFileRepository;
use slideview::synthetic::SyntheticSlide;
use slideview::{LogLevel, PointerInput, ScreenPoint, ScreenSize, SlideDescriptor, SlideSession, ViewerConfig};

/// Frames pumped per step before giving up on tiles settling
const MAX_FRAMES_PER_STEP: u32 = 400;
const FRAME_INTERVAL: Duration = Duration::from_millis(5);

/// Headless slide viewer session driver.
///
/// Opens a slide on synthetic tiles, runs a short scripted tour of the viewport and
/// optionally exports the annotations.
#[derive(Parser, Debug)]
#[command(name = "slideview", version, about = "Headless tile-pyramid viewer session driver")]
struct Args {
    /// Viewer configuration (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Slide descriptor (JSON). A demo slide is used when omitted.
    #[arg(long, value_name = "FILE")]
    slide: Option<PathBuf>,

    /// Load and save annotations in this directory
    #[arg(long, value_name = "DIR")]
    annotations: Option<PathBuf>,

    /// Export annotations: coco, geojson or csv
    #[arg(long, value_name = "FORMAT")]
    export: Option<String>,

    /// Export destination (stdout when omitted)
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Container size in screen pixels
    #[arg(long, value_name = "WxH", default_value = "1280x800", value_parser = parse_size)]
    size: (f64, f64),

    /// error, warn, info, debug or trace (overrides the config file)
    #[arg(long = "log", value_name = "LEVEL", value_parser = parse_log_level)]
    log_level: Option<LogLevel>,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        log::error!("{}", e);
        eprintln!("slideview error: {}", e);
        process::exit(1);
    }
}

fn parse_size(s: &str) -> Result<(f64, f64), String> {
    let invalid = || format!("expected <width>x<height>, got '{}'", s);
    let (w, h) = s.split_once('x').ok_or_else(invalid)?;
    let w: f64 = w.trim().parse().map_err(|_| invalid())?;
    let h: f64 = h.trim().parse().map_err(|_| invalid())?;
    if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
        return Err(format!("size must be positive, got '{}'", s));
    }
    Ok((w, h))
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::from_name(s).ok_or_else(|| format!("unknown log level '{}'", s))
}

fn init_logging(level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(level.to_level_filter())
        .parse_default_env()
        .init();
}

/// Slide used when no descriptor is given: 40000x30000 px at 0.25 µm/px.
fn demo_slide() -> Result<SlideDescriptor, Box<dyn std::error::Error>> {
    let plane = ImagePlane::new(40_000, 30_000, 256, 8)?.with_mpp(0.25, 0.25);
    let schema = LabelSchema::new(
        "oral-epithelium",
        vec![
            LabelClass::new("Epithelium", "#4A90D9")
                .with_child(LabelClass::new("Dysplastic Epithelial Cells", "#FF8800")),
            LabelClass::new("Stroma", "#7ED321"),
        ],
    );
    let mut slide = SlideDescriptor::new(plane, "synthetic://demo").with_schema(schema);
    slide.name = Some("demo".into());
    Ok(slide)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };
    init_logging(args.log_level.unwrap_or(config.log_level));

    let slide = match &args.slide {
        Some(path) => SlideDescriptor::load(path)?,
        None => demo_slide()?,
    };
    let (width, height) = args.size;

    let synthetic = SyntheticSlide::new(slide.plane.width, slide.plane.height);
    let fetcher = ThreadedFetcher::spawn(synthetic.loader(), slide.plane.tile_size, config.tiles.fetch_workers)?;
    let mut session = SlideSession::open(slide, &config, ScreenSize::new(width, height), Box::new(fetcher))?;

    let repository = args.annotations.as_ref().map(JsonFileRepository::new);
    if let Some(repository) = &repository {
        let count = session.load_annotations(repository);
        log::info!("Session starts with {} annotations", count);
    }

    settle(&mut session, "open");

    let center = ScreenPoint::new(width / 2.0, height / 2.0);
    session.zoom_steps(6, center)?;
    settle(&mut session, "zoom in");

    session.pan_by_screen(-width / 4.0, height / 6.0)?;
    settle(&mut session, "pan");

    draw_demo_shapes(&mut session, center);
    settle(&mut session, "annotate");

    session.rotate(90.0)?;
    settle(&mut session, "rotate");

    session.fit()?;
    settle(&mut session, "fit");

    let stats = session.renderer_stats();
    log::info!(
        "Tiles: {} requested, {} received, {} failed, {} cancelled",
        stats.requested,
        stats.received,
        stats.failed,
        stats.cancelled
    );

    if let Some(repository) = &repository {
        session.save_annotations(repository)?;
    }

    if let Some(format) = &args.export {
        let registry = ExportRegistry::new();
        let bytes = session.export(&registry, format)?;
        match &args.out {
            Some(path) => {
                std::fs::write(path, &bytes)?;
                log::info!("Wrote {} bytes to {:?}", bytes.len(), path);
            }
            None => {
                use std::io::Write;
                std::io::stdout().write_all(&bytes)?;
            }
        }
        if let Some(exporter) = registry.get(format) {
            log::debug!("Suggested file name: {}", exporter.file_name(session.slide_key()));
        }
    }

    for notice in session.take_notices() {
        eprintln!("[{:?}] {}", notice.level, notice.message);
    }
    Ok(())
}

/// Outline a rectangle and a triangle around the screen center, then select the rectangle.
fn draw_demo_shapes(session: &mut SlideSession, center: ScreenPoint) {
    let at = |dx: f64, dy: f64| ScreenPoint::new(center.x + dx, center.y + dy);

    session.set_active_tool(AnnotationTool::Rectangle);
    session.handle_pointer(PointerInput::Down(at(-120.0, -80.0)));
    session.handle_pointer(PointerInput::Move(at(-40.0, -20.0)));
    session.handle_pointer(PointerInput::Up(at(-20.0, 0.0)));

    session.set_active_label("Stroma");
    session.set_active_tool(AnnotationTool::Polygon);
    for (dx, dy) in [(40.0, 20.0), (160.0, 40.0), (90.0, 140.0)] {
        session.handle_pointer(PointerInput::Down(at(dx, dy)));
        session.handle_pointer(PointerInput::Up(at(dx, dy)));
    }
    session.handle_pointer(PointerInput::FinishPolygon);

    session.set_active_tool(AnnotationTool::Select);
    session.handle_pointer(PointerInput::Down(at(-70.0, -40.0)));
}

/// Pump frames until no events are queued and no tiles are outstanding.
fn settle(session: &mut SlideSession, step: &str) {
    for _ in 0..MAX_FRAMES_PER_STEP {
        let frame = session.pump();
        if let Some(tiles) = &frame.tiles {
            log::debug!(
                "[{}] frame {}: level {}, {} tiles drawn ({} placeholders), {} missing, {} pending",
                step,
                frame.frame,
                tiles.level,
                tiles.draws.len(),
                tiles.placeholders(),
                tiles.missing.len(),
                tiles.pending
            );
        }
        if let Some(overlay) = &frame.overlay {
            log::debug!(
                "[{}] frame {}: {} shapes, {} culled, {} skipped",
                step,
                frame.frame,
                overlay.shapes.len(),
                overlay.culled,
                overlay.skipped.len()
            );
        }
        if frame.is_idle() && session.is_settled() {
            let state = session.state();
            log::info!(
                "[{}] settled at frame {}: zoom {:.4}, rotation {:.0}°, center ({:.0}, {:.0})",
                step,
                frame.frame,
                state.zoom,
                state.rotation,
                state.center.x,
                state.center.y
            );
            return;
        }
        std::thread::sleep(FRAME_INTERVAL);
    }
    log::warn!("[{}] tiles did not settle within {} frames", step, MAX_FRAMES_PER_STEP);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["slideview"]).unwrap();
        assert_eq!(args.size, (1280.0, 800.0));
        assert!(args.log_level.is_none());
        assert!(args.export.is_none());
    }

    #[test]
    fn test_size_and_log_level() {
        let args = Args::try_parse_from(["slideview", "--size", "640x480", "--log", "DEBUG", "--export", "csv"]).unwrap();
        assert_eq!(args.size, (640.0, 480.0));
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert_eq!(args.export.as_deref(), Some("csv"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Args::try_parse_from(["slideview", "--size", "640"]).is_err());
        assert!(Args::try_parse_from(["slideview", "--size", "0x480"]).is_err());
        assert!(Args::try_parse_from(["slideview", "--log", "loud"]).is_err());
        assert!(Args::try_parse_from(["slideview", "--bogus"]).is_err());
    }
}
