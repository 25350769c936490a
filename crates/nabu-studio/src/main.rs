mod app;

use anyhow::{Context, Result};
use clap::Parser;
use nabu_engine::logging::{init_logging, LoggingConfig};
use winit::event_loop::EventLoop;

use crate::app::{Studio, StudioConfig};

#[derive(Parser, Debug)]
#[command(name = "nabu-studio")]
#[command(about = "Renders full-screen WGSL shaders on a worker thread")]
#[command(version)]
struct Cli {
    /// Target frame rate.
    #[arg(long, default_value_t = nabu_engine::DEFAULT_FRAME_RATE)]
    fps: f64,

    /// Draw the plasma shader alone instead of the two-pass chain.
    #[arg(long)]
    single: bool,

    /// Fetch fragment shaders from these URLs (one pass each).
    #[arg(long = "remote-fragment", value_name = "URL")]
    remote_fragments: Vec<String>,

    /// Log filter, e.g. "nabu_remote=debug,wgpu=warn".
    #[arg(long)]
    log: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.clone().map(LoggingConfig::with_filter).unwrap_or_default());

    let config = StudioConfig {
        fps: cli.fps,
        single: cli.single,
        remote_fragments: cli.remote_fragments,
        ..StudioConfig::default()
    };

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut studio = Studio::new(config)?;
    event_loop
        .run_app(&mut studio)
        .context("winit event loop terminated with error")?;

    studio.finish()
}
