//! Bridge engine with statum state machine
//!
//! Owns the input sampler and the dispatcher and ticks them at a fixed
//! cadence inside one tokio task. Each tick runs sample, dispatch and compose
//! to completion before the next one starts.
//!
//! # State Machine
//!
//! ```text
//! Initializing ──► Running ──► Stopping ──► Stopped
//!                    │  ▲
//!                    └──┘ tick
//! ```
//!
//! Leaving `Stopping` cancels every timer, releases held buttons, zeroes the
//! axes, stops the vest and closes the chair connection.

use crate::chair::{await_chair_task, ChairSink, ConnectionState};
use crate::config::{AppConfig, EngineSettings};
use crate::controller::{InputSampler, InputSource, KeyStateSource};
use crate::effects::EffectLibrary;
use crate::mapping::{BindingTable, DispatchStats, Dispatcher, EngineError, Outputs};
use crate::output::gamepad::{GamepadError, GamepadSink};
use crate::output::haptic::HapticSink;
use chrono::{DateTime, Local};
use statum::{machine, state};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// States for the engine lifecycle using statum
#[state]
#[derive(Debug, Clone)]
pub enum BridgeEngineState {
    Initializing, // Table, library and sinks assembled
    Running,      // Ticking
    Stopping,     // Loop left, outputs still live
    Stopped,      // Outputs neutral, chair closed
}

/// Input side and the non-fatal sinks handed to the engine at start
pub struct EngineDevices {
    pub input: Box<dyn InputSource>,
    pub keys: Box<dyn KeyStateSource>,
    pub haptics: Box<dyn HapticSink>,
    pub chair: Box<dyn ChairSink>,
}

#[machine]
pub struct BridgeEngine<S: BridgeEngineState> {
    settings: EngineSettings,
    status_poll_ticks: u64,
    sampler: InputSampler,
    dispatcher: Dispatcher,
    ticks: u64,
    chair_status: ConnectionState,
    last_stats: DispatchStats,
    last_stats_time: DateTime<Local>,
}

impl<S: BridgeEngineState> BridgeEngine<S> {
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }
}

impl BridgeEngine<Initializing> {
    pub fn create(config: &AppConfig, pad: Box<dyn GamepadSink>, devices: EngineDevices) -> Self {
        let library = EffectLibrary::new(&config.custom_effects);
        let table = BindingTable::from_documents(&config.bindings, &library);
        info!(
            "Initializing bridge engine: {} of {} bindings loaded",
            table.len(),
            config.bindings.len()
        );

        let sampler = InputSampler::new(devices.input, devices.keys, table.polled_inputs());
        let outputs = Outputs {
            pad,
            haptics: devices.haptics,
            chair: devices.chair,
        };
        let dispatcher = Dispatcher::new(
            table,
            library,
            outputs,
            Duration::from_millis(config.engine.hold_poll_interval_ms),
            config.engine.haptic_position,
        );

        Self::new(
            config.engine.clone(),
            config.chair.status_poll_ticks.max(1),
            sampler,
            dispatcher,
            0,                           // ticks
            ConnectionState::default(),  // chair_status
            DispatchStats::default(),    // last_stats
            Local::now(),                // last_stats_time
        )
    }

    /// Registers with the haptic player and enters Running.
    /// A failed registration is logged; the vest may still work without it.
    pub fn start(mut self) -> BridgeEngine<Running> {
        let app_id = self.settings.haptic_app_id.clone();
        match self.dispatcher.haptics().register(&app_id) {
            Ok(()) => info!("Registered with haptic player as '{}'", app_id),
            Err(e) => warn!("Haptic registration failed, continuing without: {}", e),
        }
        self.last_stats_time = Local::now();
        self.transition()
    }
}

impl BridgeEngine<Running> {
    /// One full tick: sample, dispatch, compose.
    pub fn tick(&mut self, now: Instant) {
        let transitions = self.sampler.sample();
        if !transitions.is_empty() {
            debug!("Tick {}: {} transitions", self.ticks, transitions.len());
        }
        self.dispatcher.tick(now, &transitions, &self.sampler);

        self.ticks += 1;
        if self.ticks % self.status_poll_ticks == 0 {
            self.poll_chair_status();
        }
    }

    fn poll_chair_status(&mut self) {
        let status = self.dispatcher.chair_state();
        if status != self.chair_status {
            info!("Chair connection: {:?} -> {:?}", self.chair_status, status);
            self.chair_status = status;
        }
    }

    fn log_stats(&mut self) {
        if self.settings.stats_interval_s == 0 {
            return;
        }
        let now = Local::now();
        let stats_interval = chrono::Duration::seconds(self.settings.stats_interval_s as i64);
        if now - self.last_stats_time <= stats_interval {
            return;
        }

        let stats = self.dispatcher.stats();
        let elapsed_seconds = (now - self.last_stats_time).num_seconds();
        info!(
            "Engine stats: {} transitions, {} actions fired in {} seconds ({} active timers, {} ticks total)",
            stats.transitions - self.last_stats.transitions,
            stats.fired - self.last_stats.fired,
            elapsed_seconds,
            self.dispatcher.state().active_count(),
            self.ticks
        );
        self.last_stats = stats;
        self.last_stats_time = now;
    }

    /// Main loop with graceful shutdown support
    ///
    /// Ticks every `tick_interval_ms` until the shutdown signal arrives or
    /// its sender is dropped.
    pub async fn run_until_shutdown(
        mut self,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> BridgeEngine<Stopping> {
        let period = Duration::from_millis(self.settings.tick_interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Bridge engine running, {} ms per tick", period.as_millis());

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Shutdown signal received");
                    break;
                }

                at = interval.tick() => {
                    self.tick(at.into_std());
                    self.log_stats();
                }
            }
        }

        self.stop()
    }

    pub fn stop(self) -> BridgeEngine<Stopping> {
        info!("Stopping bridge engine after {} ticks", self.ticks);
        self.transition()
    }
}

impl BridgeEngine<Stopping> {
    /// Cancels all timers, drives every output back to neutral and waits
    /// until the chair connection is closed
    pub async fn shutdown(mut self) -> BridgeEngine<Stopped> {
        let active = self.dispatcher.state().active_count();
        if active > 0 {
            debug!("Cancelling {} active timers and effects", active);
        }
        if let Some(chair_task) = self.dispatcher.shutdown() {
            await_chair_task(chair_task).await;
        }
        info!("Bridge engine stopped");
        self.transition()
    }
}

impl BridgeEngine<Stopped> {}

/// Handle for the engine running in a tokio task
#[derive(Debug)]
pub struct EngineHandle {
    task_handle: Option<JoinHandle<DispatchStats>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl EngineHandle {
    /// Builds the engine and spawns its loop.
    ///
    /// The virtual gamepad is acquired first; if that fails nothing else is
    /// started and the error goes back to the caller.
    pub fn start<F>(config: &AppConfig, open_pad: F, devices: EngineDevices) -> Result<Self, EngineError>
    where
        F: FnOnce() -> Result<Box<dyn GamepadSink>, GamepadError>,
    {
        let pad = open_pad().map_err(|e| {
            error!("Cannot start without a virtual gamepad: {}", e);
            EngineError::GamepadUnavailable(e.to_string())
        })?;

        let engine = BridgeEngine::create(config, pad, devices).start();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task_handle = tokio::spawn(async move {
            let stopping = engine.run_until_shutdown(shutdown_rx).await;
            let stopped = stopping.shutdown().await;
            stopped.stats()
        });

        Ok(Self {
            task_handle: Some(task_handle),
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signals shutdown and waits until every output is neutral
    pub async fn stop(&mut self) -> Result<DispatchStats, EngineError> {
        debug!("Sending shutdown signal to bridge engine");
        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(()).is_err() {
                warn!("Engine task already terminated");
            }
        }

        match self.task_handle.take() {
            Some(handle) => handle.await.map_err(|e| {
                error!("Engine task panicked: {}", e);
                EngineError::Thread(format!("Engine task panicked: {}", e))
            }),
            None => Err(EngineError::Channel("engine already stopped".to_string())),
        }
    }
}
