#![cfg(feature = "gpio")]

use anyhow::{Context, Result};
use rppal::gpio::{Gpio, OutputPin};

use super::backend::MotorBackend;
use crate::config::MotorPin;
use crate::direction::{MotorIntensities, MAX_INTENSITY};

/// Vibration motors on GPIO pins, driven by software PWM.
pub struct GpioMotors {
    pins: Vec<(String, OutputPin)>,
    frequency_hz: f64,
}

impl GpioMotors {
    pub fn new(motors: &[MotorPin], frequency_hz: f64) -> Result<Self> {
        let gpio = Gpio::new().context("open GPIO controller")?;
        let mut pins = Vec::with_capacity(motors.len());
        for motor in motors {
            let pin = gpio
                .get(motor.pin)
                .with_context(|| format!("claim GPIO {} for motor {}", motor.pin, motor.name))?
                .into_output_low();
            pins.push((motor.name.clone(), pin));
        }
        log::info!("motors: claimed {} GPIO pins", pins.len());
        Ok(Self { pins, frequency_hz })
    }
}

impl MotorBackend for GpioMotors {
    fn name(&self) -> &'static str {
        "gpio"
    }

    fn set_intensities(&mut self, intensities: &MotorIntensities) -> Result<()> {
        for (name, pin) in self.pins.iter_mut() {
            let Some(level) = intensities.get(name) else {
                continue;
            };
            if level <= 0.0 {
                pin.clear_pwm()
                    .with_context(|| format!("stop PWM on motor {}", name))?;
                pin.set_low();
            } else {
                let duty = (level / MAX_INTENSITY) as f64;
                pin.set_pwm_frequency(self.frequency_hz, duty)
                    .with_context(|| format!("set PWM on motor {}", name))?;
            }
        }
        Ok(())
    }

    fn off(&mut self) -> Result<()> {
        for (name, pin) in self.pins.iter_mut() {
            pin.clear_pwm()
                .with_context(|| format!("stop PWM on motor {}", name))?;
            pin.set_low();
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.off()?;
        let count = self.pins.len();
        self.pins.clear();
        log::info!("motors: released {} GPIO pins", count);
        Ok(())
    }
}
