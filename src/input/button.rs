use anyhow::{anyhow, Result};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{ButtonBackendKind, ButtonSettings};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Edge-consuming view of a push button.
pub trait ButtonSource: Send {
    /// True once per press; reading clears it.
    fn is_pressed(&mut self) -> bool;

    /// Wait up to `timeout` for a press. Consumes the press it reports.
    fn wait_for_button(&mut self, timeout: Duration) -> bool;

    /// Release hardware handles. Safe to call more than once.
    fn release(&mut self) {}
}

/// Pending-press flag shared between an edge producer and the main loop.
///
/// Producers only ever call `signal`.
#[derive(Clone, Debug, Default)]
pub struct ButtonLatch {
    pressed: Arc<AtomicBool>,
}

impl ButtonLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.pressed.store(true, Ordering::SeqCst);
    }

    pub fn take(&self) -> bool {
        self.pressed.swap(false, Ordering::SeqCst)
    }

    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.take() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

enum EdgeProducer {
    Stdin,
    #[cfg(feature = "gpio")]
    Gpio(rppal::gpio::InputPin),
    Detached,
}

/// A button backed by a latch and whatever produces its edges.
pub struct ButtonInput {
    latch: ButtonLatch,
    producer: EdgeProducer,
}

impl ButtonInput {
    /// Button fed by hand through the returned latch.
    pub fn from_latch(latch: ButtonLatch) -> Self {
        Self {
            latch,
            producer: EdgeProducer::Detached,
        }
    }

    /// Each line read from stdin is one press.
    pub fn stdin() -> Result<Self> {
        let latch = ButtonLatch::new();
        let producer = latch.clone();
        thread::Builder::new()
            .name("button-stdin".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    if line.is_err() {
                        break;
                    }
                    producer.signal();
                }
                log::debug!("button: stdin closed");
            })
            .map_err(|e| anyhow!("failed to spawn stdin button reader: {}", e))?;
        log::info!("button: press Enter to simulate a button press");
        Ok(Self {
            latch,
            producer: EdgeProducer::Stdin,
        })
    }

    /// Falling-edge interrupt on a pulled-up input pin.
    #[cfg(feature = "gpio")]
    pub fn gpio(pin: u8, debounce: Duration) -> Result<Self> {
        use anyhow::Context;
        use rppal::gpio::{Gpio, Trigger};

        let latch = ButtonLatch::new();
        let producer = latch.clone();
        let mut input = Gpio::new()
            .context("open GPIO controller")?
            .get(pin)
            .with_context(|| format!("claim GPIO {} for button", pin))?
            .into_input_pullup();
        input
            .set_async_interrupt(Trigger::FallingEdge, Some(debounce), move |_| {
                producer.signal()
            })
            .context("register button interrupt")?;
        log::info!("button: GPIO {} (debounce {:?})", pin, debounce);
        Ok(Self {
            latch,
            producer: EdgeProducer::Gpio(input),
        })
    }

    pub fn latch(&self) -> ButtonLatch {
        self.latch.clone()
    }
}

impl ButtonSource for ButtonInput {
    fn is_pressed(&mut self) -> bool {
        self.latch.take()
    }

    fn wait_for_button(&mut self, timeout: Duration) -> bool {
        self.latch.wait(timeout)
    }

    fn release(&mut self) {
        match std::mem::replace(&mut self.producer, EdgeProducer::Detached) {
            #[cfg(feature = "gpio")]
            EdgeProducer::Gpio(mut pin) => {
                if let Err(err) = pin.clear_async_interrupt() {
                    log::error!("button: failed to clear interrupt: {}", err);
                }
                log::info!("button: released GPIO {}", pin.pin());
            }
            EdgeProducer::Stdin | EdgeProducer::Detached => {}
        }
    }
}

/// Build the configured button. GPIO that cannot be opened falls back to stdin.
pub fn open_button(settings: &ButtonSettings) -> Result<ButtonInput> {
    match settings.backend {
        ButtonBackendKind::Stdin => ButtonInput::stdin(),
        ButtonBackendKind::Disabled => Ok(ButtonInput::from_latch(ButtonLatch::new())),
        ButtonBackendKind::Gpio => open_gpio(settings).or_else(|err| {
            log::warn!("button: GPIO unavailable, using stdin: {:#}", err);
            ButtonInput::stdin()
        }),
    }
}

#[cfg(feature = "gpio")]
fn open_gpio(settings: &ButtonSettings) -> Result<ButtonInput> {
    ButtonInput::gpio(settings.pin, settings.debounce)
}

#[cfg(not(feature = "gpio"))]
fn open_gpio(_settings: &ButtonSettings) -> Result<ButtonInput> {
    Err(anyhow!("built without the gpio feature"))
}
