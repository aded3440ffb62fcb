//! Time Simulation & Windowing Engine
//!
//! Replays a bounded historical dataset of per-entity sensor readings as if it
//! were arriving now, and compresses per-sample states into timeline intervals.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      SimulationRunner                           │
//! │  (tokio task, fixed tick period, skips overlapping ticks)       │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      SimulationEngine                           │
//! │  (owns SimulationState, LIVE / REPLAY policy, atomic ticks)     │
//! └─────────────────────────────────────────────────────────────────┘
//!        │                       │                       │
//!        ▼                       ▼                       ▼
//! ┌─────────────┐        ┌─────────────┐        ┌──────────────┐
//! │ normalize   │        │ WindowSlicer│        │ segment      │
//! │ (Dataset)   │───────▶│ (+ jitter)  │───────▶│ (timelines)  │
//! └─────────────┘        └─────────────┘        └──────────────┘
//! ```
//!
//! # Determinism
//!
//! - REPLAY never perturbs data; identical inputs give identical frames.
//! - LIVE jitter uses `ChaCha8Rng`, reproducible when `noise_seed` is set.
//! - Sorting happens once, at normalization; ticks only slice.

pub mod clock;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod record;
pub mod runner;
pub mod segmentation;
pub mod window;

pub use clock::{
    FixedWallClock, Nanos, SystemWallClock, WallClock, NANOS_PER_DAY, NANOS_PER_HOUR,
    NANOS_PER_MIN, NANOS_PER_SEC,
};
pub use config::{SimConfig, SimMode};
pub use dataset::{normalize, Dataset, HorizonHours};
pub use engine::{ClockStatus, SimulationEngine, SimulationState, TickFrame};
pub use error::SimError;
pub use record::{EntityId, FieldValue, Record};
pub use runner::{Control, RunnerStatsSnapshot, SimulationHandle, SimulationRunner};
pub use segmentation::{
    group_by_entity, samples_from_records, segment, CategoryField, DominantFraction, Interval,
    StateExtractor, StateSample,
};
pub use window::{FieldNoise, NoiseProfile, Window, WindowSlicer};
