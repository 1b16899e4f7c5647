//! Haptic object guidance.
//!
//! Turns camera detections into vibration cues that lead a user toward a named
//! object, behind a button and speech driven acquisition cycle.
//!
//! # Pipeline
//!
//! FrameSource -> Detector -> `select_target` -> `DirectionMapper` -> `HapticDriver`,
//! gated by the `AcquisitionMachine` and driven once per frame by `GuidanceLoop`.
//!
//! # Module Structure
//!
//! - `frame`: frames and frame geometry
//! - `ingest`: camera sources (synthetic, V4L2)
//! - `detect`: detector contract and backends (stub, tract)
//! - `select`: target selection
//! - `direction`: motor layouts and intensity mapping
//! - `haptic`: motor backends and the pulse driver
//! - `input`: button, speech capture, announcements
//! - `acquisition`: the Idle/Listening/Active/ExitDecision state machine
//! - `guidance`: per-frame orchestration
//! - `observer`: dashboard mirroring
//! - `runtime`: the daemon loop, transitions and teardown
//! - `config`, `shutdown`: ambient plumbing

pub mod acquisition;
pub mod config;
pub mod detect;
pub mod direction;
pub mod frame;
pub mod guidance;
pub mod haptic;
pub mod ingest;
pub mod input;
pub mod observer;
pub mod runtime;
pub mod select;
pub mod shutdown;

pub use acquisition::{
    AcquisitionMachine, AcquisitionState, ExitTimeoutAction, MachineSettings, Transition,
};
pub use config::GuideConfig;
pub use detect::{Detection, Detector};
pub use direction::{DirectionMapper, MotorIntensities, MotorLayout};
pub use frame::{Frame, FrameGeometry, Point};
pub use guidance::{GuidanceLoop, GuidanceSettings, TickOutcome, TickReport};
pub use haptic::{HapticDriver, MotorBackend, SimulatedMotors};
pub use ingest::{CameraSource, FrameSource};
pub use observer::{DashboardEvent, EventSink, MotorEvent, NullSink};
pub use runtime::{GuideRuntime, RuntimeParts};
pub use select::{select_target, Target};
pub use shutdown::{ShutdownSignal, Teardown};
