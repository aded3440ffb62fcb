//! Tick Runner
//!
//! Drives a `SimulationEngine` from one tokio task on a fixed real-time period.
//! Ticks never overlap: the task runs each tick to completion, and ticks that
//! fall due while it is busy are skipped rather than queued. Control commands are
//! drained before the next tick, so a mode switch or reset is fully applied before
//! any tick observes the state.
//!
//! Consumers either subscribe to frames (`watch`) or pull the latest one.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::anyhow;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::sim::config::SimMode;
use crate::sim::engine::{SimulationEngine, TickFrame};
use crate::sim::error::Result;
use crate::sim::record::Record;

const COMMAND_QUEUE_DEPTH: usize = 64;

/// Control operations accepted between ticks.
#[derive(Debug)]
pub enum Control {
    Load(Vec<Record>),
    SetMode(SimMode),
    Reset,
    Pause,
    Resume,
    Stop,
}

struct Command {
    control: Control,
    ack: oneshot::Sender<Result<()>>,
}

/// Statistics for the runner
#[derive(Debug, Default)]
pub struct RunnerStats {
    pub ticks: AtomicU64,
    pub idle_ticks: AtomicU64,
    pub commands: AtomicU64,
    pub rejected_loads: AtomicU64,
    pub mode_switches: AtomicU64,
    pub resets: AtomicU64,
}

impl RunnerStats {
    pub fn snapshot(&self) -> RunnerStatsSnapshot {
        RunnerStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            idle_ticks: self.idle_ticks.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            rejected_loads: self.rejected_loads.load(Ordering::Relaxed),
            mode_switches: self.mode_switches.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RunnerStatsSnapshot {
    pub ticks: u64,
    pub idle_ticks: u64,
    pub commands: u64,
    pub rejected_loads: u64,
    pub mode_switches: u64,
    pub resets: u64,
}

/// Owns the engine inside the tick task.
pub struct SimulationRunner {
    engine: SimulationEngine,
    tick_period: Duration,
    commands: mpsc::Receiver<Command>,
    frames: watch::Sender<Option<TickFrame>>,
    latest: Arc<RwLock<Option<TickFrame>>>,
    stats: Arc<RunnerStats>,
    running: Arc<AtomicBool>,
}

/// Cloneable control and observation side of a runner.
#[derive(Clone)]
pub struct SimulationHandle {
    commands: mpsc::Sender<Command>,
    frames: watch::Receiver<Option<TickFrame>>,
    latest: Arc<RwLock<Option<TickFrame>>>,
    stats: Arc<RunnerStats>,
    running: Arc<AtomicBool>,
}

impl SimulationRunner {
    pub fn new(engine: SimulationEngine) -> (Self, SimulationHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let initial = engine.snapshot();
        let (frame_tx, frame_rx) = watch::channel(initial.clone());
        let latest = Arc::new(RwLock::new(initial));
        let stats = Arc::new(RunnerStats::default());
        let running = Arc::new(AtomicBool::new(false));

        let runner = Self {
            tick_period: engine.config().tick_period,
            engine,
            commands: cmd_rx,
            frames: frame_tx,
            latest: Arc::clone(&latest),
            stats: Arc::clone(&stats),
            running: Arc::clone(&running),
        };
        let handle = SimulationHandle {
            commands: cmd_tx,
            frames: frame_rx,
            latest,
            stats,
            running,
        };
        (runner, handle)
    }

    /// Spawn the tick task on the current runtime.
    pub fn spawn(engine: SimulationEngine) -> (SimulationHandle, JoinHandle<()>) {
        let (runner, handle) = Self::new(engine);
        let task = tokio::spawn(runner.run());
        (handle, task)
    }

    /// Run until `Stop` or until every handle is dropped.
    pub async fn run(mut self) {
        self.running.store(true, Ordering::SeqCst);
        info!(tick_period_ms = self.tick_period.as_millis() as u64, "Simulation runner started");

        let mut interval = tokio::time::interval(self.tick_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                cmd = self.commands.recv() => {
                    let Some(Command { control, ack }) = cmd else {
                        debug!("All handles dropped");
                        break;
                    };
                    self.stats.commands.fetch_add(1, Ordering::Relaxed);
                    let stop = matches!(control, Control::Stop);
                    let result = self.apply(control);
                    let _ = ack.send(result);
                    if stop {
                        break;
                    }
                }

                _ = interval.tick() => self.on_tick(),
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(stats = ?self.stats.snapshot(), "Simulation runner stopped");
    }

    fn apply(&mut self, control: Control) -> Result<()> {
        match control {
            Control::Load(records) => {
                if let Err(e) = self.engine.load(records) {
                    self.stats.rejected_loads.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            }
            Control::SetMode(mode) => {
                self.engine.set_mode(mode);
                self.stats.mode_switches.fetch_add(1, Ordering::Relaxed);
            }
            Control::Reset => {
                self.engine.reset();
                self.stats.resets.fetch_add(1, Ordering::Relaxed);
            }
            Control::Pause => self.engine.pause(),
            Control::Resume => self.engine.resume(),
            Control::Stop => return Ok(()),
        }
        self.publish(self.engine.snapshot());
        Ok(())
    }

    fn on_tick(&mut self) {
        match self.engine.tick() {
            Some(frame) => {
                self.stats.ticks.fetch_add(1, Ordering::Relaxed);
                self.publish(Some(frame));
            }
            None => {
                self.stats.idle_ticks.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn publish(&self, frame: Option<TickFrame>) {
        *self.latest.write() = frame.clone();
        self.frames.send_replace(frame);
    }
}

impl SimulationHandle {
    async fn send(&self, control: Control) -> anyhow::Result<()> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command { control, ack })
            .await
            .map_err(|_| anyhow!("simulation runner has stopped"))?;
        let result = done
            .await
            .map_err(|_| anyhow!("simulation runner dropped the command"))?;
        result.map_err(|e| {
            warn!(error = %e, "Command rejected");
            e.into()
        })
    }

    /// Normalize and load a dataset; errors leave the clock as it was.
    pub async fn load(&self, records: Vec<Record>) -> anyhow::Result<()> {
        self.send(Control::Load(records)).await
    }

    pub async fn set_mode(&self, mode: SimMode) -> anyhow::Result<()> {
        self.send(Control::SetMode(mode)).await
    }

    pub async fn reset(&self) -> anyhow::Result<()> {
        self.send(Control::Reset).await
    }

    pub async fn pause(&self) -> anyhow::Result<()> {
        self.send(Control::Pause).await
    }

    pub async fn resume(&self) -> anyhow::Result<()> {
        self.send(Control::Resume).await
    }

    /// Halt future ticks and end the runner task.
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(Control::Stop).await
    }

    /// Push-side: notified on every published frame.
    pub fn subscribe(&self) -> watch::Receiver<Option<TickFrame>> {
        self.frames.clone()
    }

    /// Pull-side: most recently published frame.
    pub fn latest(&self) -> Option<TickFrame> {
        self.latest.read().clone()
    }

    pub fn stats(&self) -> RunnerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
