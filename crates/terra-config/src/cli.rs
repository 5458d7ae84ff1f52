//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, ViewKind};

/// Terra tile scheduler command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "terra", about = "Quadtree tile sampling session")]
pub struct CliArgs {
    /// Maximum number of simultaneously resident tiles.
    #[arg(long)]
    pub max_tiles: Option<usize>,

    /// Coarsest zoom level.
    #[arg(long)]
    pub min_zoom: Option<u32>,

    /// Finest zoom level.
    #[arg(long)]
    pub max_zoom: Option<u32>,

    /// Load one resolution level at a time.
    #[arg(long)]
    pub single_level: Option<bool>,

    /// Camera model driving the session.
    #[arg(long, value_enum)]
    pub view: Option<ViewKind>,

    /// Number of simulated frames.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(max_tiles) = args.max_tiles {
            self.sampling.max_tiles = max_tiles;
        }
        if let Some(min_zoom) = args.min_zoom {
            self.sampling.min_zoom = min_zoom;
        }
        if let Some(max_zoom) = args.max_zoom {
            self.sampling.max_zoom = max_zoom;
        }
        if let Some(single_level) = args.single_level {
            self.sampling.single_level = single_level;
        }
        if let Some(kind) = args.view {
            self.view.kind = kind;
        }
        if let Some(frames) = args.frames {
            self.view.frames = frames;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
