//! Haptic actuation: motor backends and the pulse driver that owns them.

mod backend;
mod driver;
#[cfg(feature = "gpio")]
mod gpio;

use crate::config::{HapticSettings, MotorBackendKind};

pub use backend::{MotorBackend, SimulatedMotors};
pub use driver::HapticDriver;
#[cfg(feature = "gpio")]
pub use gpio::GpioMotors;

/// Build the configured motor backend.
///
/// Hardware that cannot be opened is not fatal: the simulated backend takes over
/// and logs what it would have driven.
pub fn open_backend(settings: &HapticSettings) -> Box<dyn MotorBackend> {
    let names: Vec<String> = settings.motors.iter().map(|m| m.name.clone()).collect();
    match settings.backend {
        MotorBackendKind::Simulated => Box::new(SimulatedMotors::new(names)),
        MotorBackendKind::Gpio => open_gpio(settings).unwrap_or_else(|err| {
            log::warn!("motors: GPIO unavailable, simulating: {:#}", err);
            Box::new(SimulatedMotors::new(names))
        }),
    }
}

#[cfg(feature = "gpio")]
fn open_gpio(settings: &HapticSettings) -> anyhow::Result<Box<dyn MotorBackend>> {
    Ok(Box::new(GpioMotors::new(
        &settings.motors,
        settings.pwm_frequency_hz,
    )?))
}

#[cfg(not(feature = "gpio"))]
fn open_gpio(_settings: &HapticSettings) -> anyhow::Result<Box<dyn MotorBackend>> {
    Err(anyhow::anyhow!("built without the gpio feature"))
}
