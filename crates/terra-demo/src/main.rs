//! Flies a simulated camera over a tile pyramid and reports what the
//! sampling session loads.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI
//! flags. Run with `cargo run -p terra-demo -- --view globe --frames 120`.

mod camera;
mod stats;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use terra_config::{CliArgs, Config, ConfigError, default_config_dir};
use terra_sampling::{QuadSamplingController, SamplingParams};
use tracing::{error, info};

use crate::camera::Flight;
use crate::stats::StatsDelegate;

/// Fetches the stats delegate completes per frame.
const FETCHES_PER_FRAME: usize = 16;

/// Frames to keep flushing after the flight so pending fetches settle.
const SETTLE_FRAMES: u32 = 64;

fn load_config(args: &CliArgs) -> Result<(Config, Option<std::path::PathBuf>), ConfigError> {
    let config_dir = args.config.clone().or_else(default_config_dir);
    let mut config = match &config_dir {
        Some(dir) => Config::load_or_create(dir)?,
        None => Config::default(),
    };
    config.apply_cli_overrides(args);
    config.sampling.validate()?;
    Ok((config, config_dir))
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let (config, config_dir) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            terra_log::init_logging(None, false, None);
            error!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_dir = config_dir.as_ref().map(|dir| dir.join("logs"));
    terra_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));

    let params = SamplingParams::from_config(&config.sampling);
    let flight = Flight::new(&config.view, &params.coord_sys);
    info!(
        "Flight: {:?} view, {} frames, height {} -> {}",
        config.view.kind, config.view.frames, config.view.start_height, config.view.end_height
    );

    let controller = QuadSamplingController::new();
    controller.start(params);
    let stats = Arc::new(StatsDelegate::new(FETCHES_PER_FRAME));
    controller.add_builder_delegate(stats.clone());

    let mut total_changes = 0;
    for frame in 0..flight.frames() {
        let view = flight.view_at(frame);
        let changes = controller.update_view(view.as_ref(), flight.frame_size());
        total_changes += changes.len();

        if config.debug.show_tile_stats {
            let tiles = controller.builder().map_or(0, |b| b.tile_count());
            let target = controller
                .with_display(|display| display.target_level())
                .unwrap_or_default();
            info!(
                "frame {frame:>4}: height {:.5} target level {target:>2} tiles {tiles:>4} changes {:>4} pending {}",
                flight.height_at(frame),
                changes.len(),
                stats.pending()
            );
        }
    }

    // Hold the final view until the simulated fetches drain.
    let last = flight.view_at(flight.frames().saturating_sub(1));
    let mut settle = 0;
    while controller.builder_is_loading() && settle < SETTLE_FRAMES {
        total_changes += controller
            .update_view(last.as_ref(), flight.frame_size())
            .len();
        settle += 1;
    }

    let removed = controller.stop();
    let summary = stats.stats();
    info!(
        "Done: loaded {} unloaded {} fetched {} stale {} toggled {} deepest level {} | {} scene changes, {} on stop, {} settle frames",
        summary.loaded,
        summary.unloaded,
        summary.fetched,
        summary.stale,
        summary.toggled,
        summary.deepest_level,
        total_changes,
        removed.len(),
        settle
    );
    ExitCode::SUCCESS
}
