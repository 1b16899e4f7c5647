use anyhow::Result;

use crate::direction::MotorIntensities;

/// Physical actuation boundary.
///
/// `off` must be safe to call any number of times. `release` gives up hardware
/// handles; a released backend may not be driven again.
pub trait MotorBackend: Send {
    fn name(&self) -> &'static str;

    /// Drive every named motor at its level; motors not present are left alone.
    fn set_intensities(&mut self, intensities: &MotorIntensities) -> Result<()>;

    fn off(&mut self) -> Result<()>;

    fn release(&mut self) -> Result<()> {
        self.off()
    }
}

/// Log-only motors. Used whenever real actuators are not configured or not present.
pub struct SimulatedMotors {
    motor_names: Vec<String>,
    active: bool,
}

impl SimulatedMotors {
    pub fn new<I, S>(motor_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            motor_names: motor_names.into_iter().map(Into::into).collect(),
            active: false,
        }
    }
}

impl MotorBackend for SimulatedMotors {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn set_intensities(&mut self, intensities: &MotorIntensities) -> Result<()> {
        let summary: Vec<String> = intensities
            .iter()
            .filter(|(_, level)| *level > 0.0)
            .map(|(name, level)| format!("{}={:.1}", name, level))
            .collect();
        if summary.is_empty() {
            log::info!("[sim motors] all silent");
        } else {
            log::info!("[sim motors] {}", summary.join(" "));
        }
        self.active = !intensities.is_silent();
        Ok(())
    }

    fn off(&mut self) -> Result<()> {
        if self.active {
            log::info!("[sim motors] off ({})", self.motor_names.join(", "));
        }
        self.active = false;
        Ok(())
    }
}
