//! guided - haptic object guidance daemon
//!
//! Waits for a button press, listens for the name of an object, then steers the
//! user toward it with vibration until the exit is confirmed with two presses.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use haptic_guide::{GuideConfig, GuideRuntime, MotorLayout, ShutdownSignal};

#[derive(Parser, Debug)]
#[command(author, version, about = "Guide a user toward an object with haptic cues")]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "GUIDE_CONFIG")]
    config: Option<PathBuf>,

    /// Use the synthetic camera and simulated motors and button.
    #[arg(long)]
    simulate: bool,

    /// Motor layout: two or eight.
    #[arg(long)]
    layout: Option<MotorLayout>,

    /// Object to guide to when nothing is spoken.
    #[arg(long)]
    target: Option<String>,

    /// Start guiding immediately instead of waiting for the first press.
    #[arg(long)]
    auto_start: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = GuideConfig::load_from(args.config.as_deref())?;
    if let Some(layout) = args.layout {
        config.set_layout(layout);
    }
    if args.simulate {
        config.force_simulation();
    }
    if args.auto_start {
        config.acquisition.auto_start = true;
    }
    config.validate()?;

    let shutdown = ShutdownSignal::new();
    shutdown.install_ctrlc()?;

    let mut runtime = GuideRuntime::from_config(&config, shutdown)?;
    if let Some(target) = args.target.as_deref() {
        runtime.preset_target(target);
    }
    log::info!("guided {} starting", env!("CARGO_PKG_VERSION"));
    runtime.run()
}
