//! Simulation Engine
//!
//! Owns the simulation state and drives it one tick at a time.
//!
//! # State Machine
//!
//! ```text
//!            load(records) ok
//!  STOPPED ───────────────────▶ RUNNING(mode) ◀──┐
//!     ▲  load(empty) ─┐              │           │ set_mode / reset
//!     └───────────────┘              └───────────┘ (virtual_now = start,
//!                                                    window cleared)
//! ```
//!
//! There is no terminal state: REPLAY loops over the dataset and LIVE free-runs
//! with the wall clock. `pause()` halts ticks without discarding state.
//!
//! # Atomicity
//!
//! A tick computes the next time, progress and window into locals and commits them
//! together, so a consumer never sees a partially updated state.

use crate::sim::clock::{
    advance_replay, map_live_time, progress_percent, replay_step, Nanos, SystemWallClock,
    WallClock,
};
use crate::sim::config::{SimConfig, SimMode};
use crate::sim::dataset::{normalize, Dataset};
use crate::sim::error::Result;
use crate::sim::record::{EntityId, Record};
use crate::sim::segmentation::{
    group_by_entity, samples_from_records, segment, Interval, StateExtractor,
};
use crate::sim::window::{Window, WindowSlicer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Coarse clock status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClockStatus {
    /// No dataset yet, or paused.
    Stopped,
    Running(SimMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulationState {
    pub virtual_now: Nanos,
    pub mode: SimMode,
    pub is_running: bool,
}

/// Per-tick output handed to rendering collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct TickFrame {
    pub tick: u64,
    pub virtual_now: Nanos,
    pub progress_percent: f64,
    pub mode: SimMode,
    pub window: Arc<Window>,
}

pub struct SimulationEngine {
    config: SimConfig,
    mode: SimMode,
    dataset: Option<Dataset>,
    state: Option<SimulationState>,
    replay_step: Nanos,
    slicer: WindowSlicer,
    wall: Box<dyn WallClock>,
    window: Arc<Window>,
    progress: f64,
    ticks: u64,
}

impl SimulationEngine {
    /// Validates `config`; the engine starts STOPPED.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let slicer = WindowSlicer::new(config.noise.clone(), config.live_noise, config.noise_seed);
        Ok(Self {
            mode: config.mode,
            replay_step: replay_step(config.replay_speed, config.tick_period),
            config,
            dataset: None,
            state: None,
            slicer,
            wall: Box::new(SystemWallClock),
            window: Arc::new(Window::empty()),
            progress: 0.0,
            ticks: 0,
        })
    }

    /// Replace the LIVE time-of-day source.
    pub fn with_wall_clock(mut self, wall: impl WallClock + 'static) -> Self {
        self.wall = Box::new(wall);
        self
    }

    /// Normalize `records` and start the clock at the dataset start.
    ///
    /// On error the engine keeps whatever it had before (STOPPED if nothing).
    pub fn load(&mut self, records: Vec<Record>) -> Result<()> {
        match normalize(records, self.config.horizon_hours) {
            Ok(dataset) => {
                self.start(dataset);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Dataset rejected, clock unchanged");
                Err(e)
            }
        }
    }

    /// Start on an already normalized dataset.
    pub fn start(&mut self, dataset: Dataset) {
        info!(
            records = dataset.len(),
            entities = dataset.entities().len(),
            start = dataset.start(),
            end = dataset.end(),
            mode = %self.mode,
            "Simulation started"
        );
        self.state = Some(SimulationState {
            virtual_now: dataset.start(),
            mode: self.mode,
            is_running: true,
        });
        self.progress = progress_percent(dataset.start(), dataset.start(), dataset.end());
        self.dataset = Some(dataset);
        self.window = Arc::new(Window::empty());
    }

    /// Rewind to the dataset start and clear the window. No-op while STOPPED.
    pub fn reset(&mut self) {
        let (Some(dataset), Some(state)) = (self.dataset.as_ref(), self.state.as_mut()) else {
            return;
        };
        state.virtual_now = dataset.start();
        self.progress = progress_percent(dataset.start(), dataset.start(), dataset.end());
        self.window = Arc::new(Window::empty());
        debug!(virtual_now = state.virtual_now, "Simulation reset");
    }

    /// Switch policy; restarts the simulation from the dataset start.
    pub fn set_mode(&mut self, mode: SimMode) {
        self.mode = mode;
        if let Some(state) = self.state.as_mut() {
            state.mode = mode;
        }
        debug!(%mode, "Mode switched");
        self.reset();
    }

    pub fn pause(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.is_running = false;
        }
    }

    pub fn resume(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.is_running = true;
        }
    }

    /// Advance one step. `None` while STOPPED (no data or paused).
    pub fn tick(&mut self) -> Option<TickFrame> {
        let dataset = self.dataset.as_ref()?;
        let state = self.state.as_ref()?;
        if !state.is_running {
            return None;
        }

        let (start, end) = (dataset.start(), dataset.end());
        let virtual_now = match state.mode {
            SimMode::Live => map_live_time(self.wall.time_of_day(), start, end),
            SimMode::Replay => advance_replay(state.virtual_now, self.replay_step, start, end),
        };
        let progress = progress_percent(virtual_now, start, end);
        let window = Arc::new(self.slicer.slice(dataset, virtual_now, state.mode));
        let mode = state.mode;

        if let Some(state) = self.state.as_mut() {
            state.virtual_now = virtual_now;
        }
        self.progress = progress;
        self.window = Arc::clone(&window);
        self.ticks += 1;

        Some(TickFrame {
            tick: self.ticks,
            virtual_now,
            progress_percent: progress,
            mode,
            window,
        })
    }

    /// Current state as a frame, without advancing. `None` while no dataset is loaded.
    pub fn snapshot(&self) -> Option<TickFrame> {
        self.state.map(|state| TickFrame {
            tick: self.ticks,
            virtual_now: state.virtual_now,
            progress_percent: self.progress,
            mode: state.mode,
            window: Arc::clone(&self.window),
        })
    }

    pub fn status(&self) -> ClockStatus {
        match self.state {
            Some(state) if state.is_running => ClockStatus::Running(state.mode),
            _ => ClockStatus::Stopped,
        }
    }

    pub fn state(&self) -> Option<SimulationState> {
        self.state
    }

    pub fn current_time(&self) -> Option<Nanos> {
        self.state.map(|s| s.virtual_now)
    }

    pub fn progress(&self) -> Option<f64> {
        self.state.map(|_| self.progress)
    }

    pub fn current_window(&self) -> Arc<Window> {
        Arc::clone(&self.window)
    }

    pub fn mode(&self) -> SimMode {
        self.mode
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Run-length timelines of the current window, keyed by entity.
    pub fn timelines<E: StateExtractor>(
        &self,
        extractor: &E,
    ) -> BTreeMap<EntityId, Vec<Interval<E::State>>> {
        group_by_entity(segment(samples_from_records(self.window.records(), extractor)))
    }
}
