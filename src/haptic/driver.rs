use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::backend::MotorBackend;
use crate::direction::MotorIntensities;

enum Command {
    Set(MotorIntensities),
    Off,
    Flush(Sender<()>),
    Stop,
}

/// Owns the motor backend on a dedicated pulse thread.
///
/// `actuate` returns immediately; the worker applies the intensities and, when a
/// pulse length is configured, turns the motors off once it elapses unless a newer
/// command arrived first. The guidance loop never sleeps for a vibration.
pub struct HapticDriver {
    backend_name: &'static str,
    tx: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl HapticDriver {
    pub fn spawn(backend: Box<dyn MotorBackend>, pulse: Option<Duration>) -> Result<Self> {
        let backend_name = backend.name();
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("haptic-pulse".to_string())
            .spawn(move || pulse_worker(backend, rx, pulse))
            .map_err(|e| anyhow!("failed to spawn haptic worker: {}", e))?;
        Ok(Self {
            backend_name,
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Start vibrating at `intensities` now.
    pub fn actuate(&self, intensities: &MotorIntensities) -> Result<()> {
        self.send(Command::Set(intensities.clone()))
    }

    /// Stop all motors now.
    pub fn off(&self) -> Result<()> {
        self.send(Command::Off)
    }

    /// Block until every command sent so far has been applied.
    pub fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = mpsc::channel();
        self.send(Command::Flush(done_tx))?;
        done_rx
            .recv()
            .map_err(|_| anyhow!("haptic worker exited before flush"))
    }

    pub fn is_running(&self) -> bool {
        self.tx.is_some()
    }

    /// Turn motors off, release the backend and join the worker. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let _ = tx.send(Command::Stop);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("haptic worker panicked during shutdown");
            }
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("haptic driver is shut down"))?;
        tx.send(command)
            .map_err(|_| anyhow!("haptic worker is not running"))
    }
}

impl Drop for HapticDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pulse_worker(
    mut backend: Box<dyn MotorBackend>,
    rx: mpsc::Receiver<Command>,
    pulse: Option<Duration>,
) {
    let mut off_at: Option<Instant> = None;
    loop {
        let command = match off_at {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => {
                        off_at = None;
                        motors_off(backend.as_mut());
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            Command::Set(intensities) => {
                if let Err(err) = backend.set_intensities(&intensities) {
                    log::warn!("haptic: {} failed to set intensities: {:#}", backend.name(), err);
                }
                off_at = match pulse {
                    Some(pulse) if !intensities.is_silent() => Some(Instant::now() + pulse),
                    _ => None,
                };
            }
            Command::Off => {
                off_at = None;
                motors_off(backend.as_mut());
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
            Command::Stop => break,
        }
    }

    if let Err(err) = backend.release() {
        log::error!("haptic: failed to release {}: {:#}", backend.name(), err);
    }
}

fn motors_off(backend: &mut dyn MotorBackend) {
    if let Err(err) = backend.off() {
        log::warn!("haptic: {} failed to stop motors: {:#}", backend.name(), err);
    }
}
