//! motor_check - pulse each configured motor in turn to verify wiring.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use haptic_guide::haptic::open_backend;
use haptic_guide::{GuideConfig, HapticDriver, MotorIntensities, MotorLayout, ShutdownSignal};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pulse each vibration motor in table order")]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "GUIDE_CONFIG")]
    config: Option<PathBuf>,

    /// Motor layout: two or eight.
    #[arg(long)]
    layout: Option<MotorLayout>,

    /// Intensity per pulse, 0-100.
    #[arg(long, default_value_t = 80.0)]
    strength: f32,

    /// Pulse length in milliseconds.
    #[arg(long, default_value_t = 500)]
    pulse_ms: u64,

    /// Pause between motors in milliseconds.
    #[arg(long, default_value_t = 300)]
    gap_ms: u64,

    /// Number of passes over the motor table.
    #[arg(long, default_value_t = 1)]
    rounds: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if !(0.0..=100.0).contains(&args.strength) {
        return Err(anyhow!("--strength must be within [0, 100]"));
    }

    let mut config = GuideConfig::load_from(args.config.as_deref())?;
    if let Some(layout) = args.layout {
        config.set_layout(layout);
    }
    config.validate()?;

    let shutdown = ShutdownSignal::new();
    shutdown.install_ctrlc()?;

    let pulse = Duration::from_millis(args.pulse_ms);
    let gap = Duration::from_millis(args.gap_ms);
    let mut driver = HapticDriver::spawn(open_backend(&config.haptic), Some(pulse))?;
    let names: Vec<&str> = config.haptic.layout.motor_names();

    'rounds: for round in 1..=args.rounds {
        for motor in &config.haptic.motors {
            if shutdown.is_requested() {
                break 'rounds;
            }
            log::info!(
                "round {}: {} (GPIO {}) at {:.0}",
                round,
                motor.name,
                motor.pin,
                args.strength
            );
            let mut levels = MotorIntensities::silent(names.iter().copied());
            levels.set(&motor.name, args.strength);
            driver.actuate(&levels)?;
            thread::sleep(pulse + gap);
        }
    }

    driver.off()?;
    driver.flush()?;
    driver.shutdown();
    log::info!("motor check finished");
    Ok(())
}
