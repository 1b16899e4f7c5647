//! Best-effort mirroring of motor state to an external dashboard.
//!
//! The guidance loop pushes events into a bounded queue and returns immediately. A
//! worker thread drains the queue and POSTs each event as JSON. A full queue drops
//! the new event; delivery failures are logged and forgotten.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::DashboardSettings;
use crate::direction::{MotorIntensities, MAX_INTENSITY};

const UPDATE_PATH: &str = "/api/motor/update";
const STOP_PATH: &str = "/api/motor/stop";

/// Which side of the user the target is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
    Center,
}

/// Motor state as the dashboard understands it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MotorEvent {
    pub left: bool,
    pub right: bool,
    /// `[0, 1]`
    pub intensity_left: f32,
    /// `[0, 1]`
    pub intensity_right: f32,
    pub target_object: Option<String>,
    pub position: Option<Position>,
}

impl MotorEvent {
    /// Summarise any layout as left/right. Motors named `*left` feed the left side,
    /// `*right` the right side, and `front`/`back` feed both.
    pub fn from_intensities(intensities: &MotorIntensities, target: Option<&str>) -> Self {
        let mut left: f32 = 0.0;
        let mut right: f32 = 0.0;
        for (name, level) in intensities.iter() {
            if name.ends_with("left") {
                left = left.max(level);
            } else if name.ends_with("right") {
                right = right.max(level);
            } else {
                left = left.max(level);
                right = right.max(level);
            }
        }
        let position = if left <= 0.0 && right <= 0.0 {
            None
        } else if left > right {
            Some(Position::Left)
        } else if right > left {
            Some(Position::Right)
        } else {
            Some(Position::Center)
        };
        Self {
            left: left > 0.0,
            right: right > 0.0,
            intensity_left: left / MAX_INTENSITY,
            intensity_right: right / MAX_INTENSITY,
            target_object: target.map(str::to_string),
            position,
        }
    }

    /// A named target is being looked for but is not in view.
    pub fn searching(target: &str) -> Self {
        Self {
            left: false,
            right: false,
            intensity_left: 0.0,
            intensity_right: 0.0,
            target_object: Some(target.to_string()),
            position: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DashboardEvent {
    Update(MotorEvent),
    /// All motors stopped and no target.
    Stop,
}

/// Receiver of advisory events. Must never block the caller.
pub trait EventSink: Send {
    fn emit(&mut self, event: DashboardEvent);
}

/// Discards everything.
#[derive(Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: DashboardEvent) {}
}

/// Delivery of one serialized event.
pub trait Transport: Send {
    fn post(&mut self, path: &str, body: &str) -> Result<()>;
}

/// HTTP delivery through a `ureq` agent with a per-request timeout.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Transport for HttpTransport {
    fn post(&mut self, path: &str, body: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        self.agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(body)
            .map_err(|e| anyhow!("POST {} failed: {}", url, e))?;
        Ok(())
    }
}

pub struct DashboardObserver {
    tx: SyncSender<DashboardEvent>,
    dropped: Arc<AtomicU64>,
    last_sent: Option<DashboardEvent>,
}

impl DashboardObserver {
    pub fn new(settings: &DashboardSettings) -> Result<Self> {
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("dashboard url is not configured"))?;
        log::info!("dashboard: mirroring motor state to {}", url);
        Self::with_transport(
            Box::new(HttpTransport::new(url, settings.timeout)),
            settings.queue_capacity,
        )
    }

    pub fn with_transport(transport: Box<dyn Transport>, capacity: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        thread::Builder::new()
            .name("dashboard".to_string())
            .spawn(move || deliver(transport, rx))
            .map_err(|e| anyhow!("failed to spawn dashboard worker: {}", e))?;
        Ok(Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            last_sent: None,
        })
    }

    /// Events discarded because the queue was full or the worker had exited.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for DashboardObserver {
    fn emit(&mut self, event: DashboardEvent) {
        if self.last_sent.as_ref() == Some(&event) {
            return;
        }
        match self.tx.try_send(event.clone()) {
            Ok(()) => self.last_sent = Some(event),
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::debug!("dashboard: event dropped ({} total)", total);
            }
        }
    }
}

fn deliver(mut transport: Box<dyn Transport>, rx: Receiver<DashboardEvent>) {
    for event in rx {
        let result = match &event {
            DashboardEvent::Update(update) => serde_json::to_string(update)
                .map_err(|e| anyhow!("serialize motor event: {}", e))
                .and_then(|body| transport.post(UPDATE_PATH, &body)),
            DashboardEvent::Stop => transport.post(STOP_PATH, "{}"),
        };
        if let Err(err) = result {
            log::debug!("dashboard: {:#}", err);
        }
    }
}

/// Dashboard observer when configured, otherwise a sink that discards events.
pub fn open_sink(settings: &DashboardSettings) -> Box<dyn EventSink> {
    if settings.url.is_none() {
        return Box::new(NullSink);
    }
    match DashboardObserver::new(settings) {
        Ok(observer) => Box::new(observer),
        Err(err) => {
            log::warn!("dashboard disabled: {:#}", err);
            Box::new(NullSink)
        }
    }
}
