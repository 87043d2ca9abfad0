//! Headless diorama viewer
//!
//! Loads a scene document, runs the frame loop for a number of frames and
//! writes the last frame as a PNG.
//!
//! ```text
//! diorama_viewer <scene.json> [--config engine.toml] [--frames N] [--out frame.png] [--edit]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use diorama_engine::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
enum ViewerError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] diorama_engine::config::ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    App(#[from] AppError),
}

/// Render a diorama scene document headlessly and save the last frame
#[derive(Parser, Debug)]
#[command(name = "diorama_viewer", version, about)]
struct Args {
    /// Scene document (JSON)
    scene: PathBuf,

    /// Engine configuration file (.toml or .ron)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: usize,

    /// Where to write the final frame
    #[arg(long, value_name = "PNG", default_value = "frame.png")]
    out: PathBuf,

    /// Start in edit mode (gizmo, grid, markers)
    #[arg(long)]
    edit: bool,
}

/// Writes the last frame once the loop is done
struct Snapshot {
    out: PathBuf,
    frames: usize,
    seen: usize,
}

impl Application for Snapshot {
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
        let reports = engine.finish_loads()?;
        for report in &reports {
            log::info!(
                "Loaded {} objects ({} skipped, {} effects)",
                report.nodes.len(),
                report.skipped.len(),
                report.effects
            );
            for skipped in &report.skipped {
                log::warn!("Skipped object {}: {}", skipped.index, skipped.reason);
            }
        }
        Ok(())
    }

    fn on_frame(&mut self, engine: &mut Engine, _delta_time: f32) -> Result<(), AppError> {
        self.seen += 1;
        if self.seen < self.frames {
            return Ok(());
        }
        let stats = engine.pipeline().stats();
        log::debug!("Final frame stats: {:?}", stats);
        engine
            .output()
            .to_image()
            .save(&self.out)
            .map_err(|e| AppError::Output(format!("{}: {e}", self.out.display())))?;
        log::info!("Wrote {}", self.out.display());
        Ok(())
    }
}

fn run(args: Args) -> Result<(), ViewerError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };
    config.edit_mode |= args.edit;

    let text = std::fs::read_to_string(&args.scene).map_err(|source| ViewerError::Read {
        path: args.scene.clone(),
        source,
    })?;
    let root = args.scene.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let base_url = config.assets.base_url.clone();
    let cache = Arc::new(ResourceCache::new(Arc::new(FileFetcher::new(root)), base_url));

    let mut engine = Engine::new(config, cache);
    let parsed = SceneDocument::from_json(&text).map_err(EngineError::from)?;
    engine.start_load(parsed, None)?;

    let frames = args.frames.max(1);
    let mut app = Snapshot {
        out: args.out,
        frames,
        seen: 0,
    };
    engine.run(&mut app, frames, 1.0 / 60.0)?;
    engine.dispose();
    Ok(())
}

fn main() {
    diorama_engine::foundation::logging::init(log::LevelFilter::Info);

    if let Err(e) = run(Args::parse()) {
        log::error!("{e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("diorama_viewer").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_options() {
        let args = parse(&["scene.json", "--frames", "5", "--out", "x.png", "--edit"]).unwrap();
        assert_eq!(args.scene, PathBuf::from("scene.json"));
        assert_eq!(args.frames, 5);
        assert_eq!(args.out, PathBuf::from("x.png"));
        assert!(args.edit);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_parse_defaults() {
        let args = parse(&["scene.json", "--config", "engine.toml"]).unwrap();
        assert_eq!(args.frames, 60);
        assert_eq!(args.out, PathBuf::from("frame.png"));
        assert_eq!(args.config, Some(PathBuf::from("engine.toml")));
        assert!(!args.edit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["a.json", "--frames"]).is_err());
        assert!(parse(&["a.json", "--frames", "ten"]).is_err());
        assert!(parse(&["a.json", "b.json"]).is_err());
        assert!(parse(&["a.json", "--fast"]).is_err());
    }
}
