//! Simulation state machine and real-time scheduler.
//!
//! A [`Simulation`] owns the state vectors, an [`AssemblyProblemSolver`] and
//! an [`IntegrationMethod`], and drives periodic, wall-clock-synchronized
//! ticks on a dedicated timer thread. Controls follow a strict state
//! machine:
//!
//! ```text
//! stopped → running ⇄ paused
//! running | paused → stopped
//! ```
//!
//! Illegal transitions are reported as [`SimError::IllegalTransition`] and
//! leave the state unchanged. Each tick measures elapsed wall time, advances
//! the simulated-time symbol, runs the integration prediction plus assembly
//! correction, notifies observers, and finally checks the optional time
//! limit (stopping, or wrapping around when looping is enabled).
//!
//! One instance-wide lock guards all shared mutable state; control calls and
//! ticks hold it for their whole duration, so ticks never overlap and
//! external readers observe complete states.

pub mod timer;

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::assembly::AssemblyProblemSolver;
use crate::config::SimulationConfig;
use crate::error::{SimError, SimResult};
use crate::integration::{method_by_name, ImprovedEuler, IntegrationMethod};
use crate::state::StateVectors;
use timer::Timer;

/// Number of recent wall-clock deltas kept for the update-frequency
/// estimate.
const DELTA_HISTORY_CAPACITY: usize = 100;

/// Lifecycle state of a [`Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationState {
    /// Not started, or stopped after running.
    Stopped,
    /// Ticking periodically.
    Running,
    /// Started but ticks are suspended.
    Paused,
}

impl std::fmt::Display for SimulationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
        };
        write!(f, "{name}")
    }
}

/// Notification published to simulation observers.
///
/// Rendering and UI layers subscribe via [`Simulation::subscribe`] and
/// redraw on [`SimulationEvent::StepCompleted`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimulationEvent {
    /// The simulation left the stopped state.
    Started,
    /// Ticking was suspended.
    Paused,
    /// Ticking was resumed.
    Resumed,
    /// The simulation returned to the stopped state.
    Stopped,
    /// A tick (or the restore on stop) finished and the state is ready to
    /// be observed.
    StepCompleted {
        /// Value of the simulated-time symbol after the step.
        time: f64,
    },
    /// A tick failed; no further ticks will fire until `stop()` is called.
    StepFailed {
        /// Rendered error message.
        message: String,
    },
}

struct Inner {
    state: StateVectors,
    snapshot: Option<StateVectors>,
    sim_state: SimulationState,
    solver: AssemblyProblemSolver,
    method: Box<dyn IntegrationMethod>,
    update_frequency: f64,
    time_multiplier: f64,
    delta_time: Option<f64>,
    time_limit: Option<f64>,
    looped: bool,
    elapsed_time: f64,
    last_tick: Option<Instant>,
    delta_history: VecDeque<f64>,
    subscribers: Vec<Sender<SimulationEvent>>,
    last_error: Option<String>,
    timer: Option<Timer>,
}

impl Inner {
    fn publish(&mut self, event: &SimulationEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn push_delta(&mut self, delta: f64) {
        self.delta_history.push_front(delta);
        self.delta_history.truncate(DELTA_HISTORY_CAPACITY);
    }

    fn real_update_frequency(&self) -> f64 {
        if self.delta_history.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.delta_history.iter().sum();
        if sum == 0.0 {
            return 0.0;
        }
        self.delta_history.len() as f64 / sum
    }

    fn restore_snapshot(&mut self) {
        if let Some(snapshot) = &self.snapshot {
            self.state.restore(snapshot);
        }
    }

    /// Timer-thread entry point: measure the wall delta, then tick.
    fn tick_at(&mut self, now: Instant) -> SimResult<ControlFlow<()>> {
        if self.sim_state != SimulationState::Running {
            return Ok(ControlFlow::Continue(()));
        }
        let measured = self
            .last_tick
            .map_or(0.0, |prev| now.duration_since(prev).as_secs_f64());
        self.last_tick = Some(now);
        self.tick_with_delta(measured)
    }

    /// The five tick phases. `measured` is the wall-clock delta since the
    /// previous tick (zero on the first).
    ///
    /// Errors have already been recorded and published when this returns
    /// `Err`; the driver maps them to `Break`.
    fn tick_with_delta(&mut self, measured: f64) -> SimResult<ControlFlow<()>> {
        // Phase 1: wall-clock bookkeeping.
        self.push_delta(measured);
        self.elapsed_time += measured;

        // Phase 2: advance the simulated-time symbol. A fixed delta, when
        // configured, overrides the measured value; the multiplier scales
        // measured time only.
        let effective = self
            .delta_time
            .unwrap_or(measured * self.time_multiplier);
        self.state.time += effective;

        // Phase 3: predict, then correct.
        if let Err(err) = self.method.step(&self.solver, &mut self.state, effective) {
            return Err(self.fail_tick(err));
        }

        // Phase 4: notify observers.
        self.publish(&SimulationEvent::StepCompleted {
            time: self.state.time,
        });

        // Phase 5: time-limit check.
        if let Some(limit) = self.time_limit {
            if self.state.time >= limit {
                if self.looped {
                    let residual = self.state.time % limit;
                    self.restore_snapshot();
                    self.state.time = residual;
                    let mut reassembled = self.method.init(&self.solver, &mut self.state);
                    if reassembled.is_ok() {
                        reassembled =
                            self.method.step(&self.solver, &mut self.state, residual);
                    }
                    if let Err(err) = reassembled {
                        return Err(self.fail_tick(err));
                    }
                    self.publish(&SimulationEvent::StepCompleted {
                        time: self.state.time,
                    });
                } else {
                    debug!("time limit {limit} reached, stopping");
                    self.halt_from_tick();
                    return Ok(ControlFlow::Break(()));
                }
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    fn fail_tick(&mut self, err: SimError) -> SimError {
        warn!("simulation tick failed: {err}");
        self.last_error = Some(err.to_string());
        self.publish(&SimulationEvent::StepFailed {
            message: err.to_string(),
        });
        err
    }

    /// Internal transition to stopped, invoked from the tick itself when the
    /// time limit is reached without looping. The timer handle is dropped
    /// here; dropping from the timer thread detaches it, and the driver loop
    /// ends right after via `Break`.
    fn halt_from_tick(&mut self) {
        self.sim_state = SimulationState::Stopped;
        self.restore_snapshot();
        self.state.time = 0.0;
        self.elapsed_time = 0.0;
        self.last_tick = None;
        drop(self.timer.take());
        self.publish(&SimulationEvent::StepCompleted { time: 0.0 });
        self.publish(&SimulationEvent::Stopped);
    }
}

/// Top-level state machine and real-time scheduler for a constrained
/// multibody simulation.
///
/// Cheap to share: control methods take `&self` and serialize through the
/// instance lock.
pub struct Simulation {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Simulation")
            .field("state", &inner.sim_state)
            .field("time", &inner.state.time)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Create a simulation over the given state and solver.
    ///
    /// The integration strategy defaults to [`ImprovedEuler`] and can be
    /// replaced with [`Simulation::set_integration_method`].
    ///
    /// # Errors
    ///
    /// Returns a configuration/validation error if `config` is invalid.
    pub fn new(
        state: StateVectors,
        solver: AssemblyProblemSolver,
        config: &SimulationConfig,
    ) -> SimResult<Self> {
        config.validate_all()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                snapshot: None,
                sim_state: SimulationState::Stopped,
                solver,
                method: Box::new(ImprovedEuler::new()),
                update_frequency: config.update_frequency,
                time_multiplier: config.time_multiplier,
                delta_time: config.delta_time,
                time_limit: config.time_limit,
                looped: config.looped,
                elapsed_time: 0.0,
                last_tick: None,
                delta_history: VecDeque::with_capacity(DELTA_HISTORY_CAPACITY),
                subscribers: Vec::new(),
                last_error: None,
                timer: None,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to simulation notifications.
    ///
    /// Dropped receivers are pruned on the next publish.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<SimulationEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Start the simulation.
    ///
    /// Legal only from the stopped state. Arguments override the configured
    /// run parameters (and persist for subsequent runs); `None` keeps the
    /// current values. Takes the snapshot, resets simulated and elapsed
    /// time, solves the assembly initialization, then begins periodic
    /// ticking at the configured update frequency.
    ///
    /// # Errors
    ///
    /// [`SimError::IllegalTransition`] if already running or paused (no
    /// state is changed); assembly errors if the initialization fails (the
    /// snapshot is restored and the simulation stays stopped).
    pub fn start(
        &self,
        delta_t: Option<f64>,
        time_limit: Option<f64>,
        looped: Option<bool>,
    ) -> SimResult<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.sim_state != SimulationState::Stopped {
            return Err(SimError::illegal_transition("start", inner.sim_state));
        }
        if let Some(dt) = delta_t {
            validate_positive("delta_t", dt)?;
            inner.delta_time = Some(dt);
        }
        if let Some(limit) = time_limit {
            validate_positive("time_limit", limit)?;
            inner.time_limit = Some(limit);
        }
        if let Some(looped) = looped {
            inner.looped = looped;
        }

        inner.state.time = 0.0;
        inner.elapsed_time = 0.0;
        inner.last_tick = None;
        inner.delta_history.clear();
        inner.last_error = None;
        inner.snapshot = Some(inner.state.clone());

        if let Err(err) = inner.method.init(&inner.solver, &mut inner.state) {
            inner.restore_snapshot();
            return Err(err);
        }

        inner.sim_state = SimulationState::Running;
        let weak = Arc::downgrade(&self.inner);
        let tick = move || -> ControlFlow<()> {
            let Some(arc) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            let now = Instant::now();
            let mut inner = arc.lock().unwrap_or_else(PoisonError::into_inner);
            match inner.tick_at(now) {
                Ok(flow) => flow,
                Err(_) => ControlFlow::Break(()),
            }
        };
        inner.timer = Some(Timer::spawn(1.0 / inner.update_frequency, tick));
        debug!("simulation started");
        inner.publish(&SimulationEvent::Started);
        Ok(())
    }

    /// Suspend ticking. Legal only from the running state.
    ///
    /// The timer keeps firing; ticks are no-ops until [`Simulation::resume`].
    ///
    /// # Errors
    ///
    /// [`SimError::IllegalTransition`] unless running.
    pub fn pause(&self) -> SimResult<()> {
        let mut inner = self.lock();
        if inner.sim_state != SimulationState::Running {
            return Err(SimError::illegal_transition("pause", inner.sim_state));
        }
        inner.sim_state = SimulationState::Paused;
        debug!("simulation paused");
        inner.publish(&SimulationEvent::Paused);
        Ok(())
    }

    /// Resume ticking. Legal only from the paused state.
    ///
    /// The wall-clock anchor is cleared so the pause gap is not measured
    /// into the next tick's delta.
    ///
    /// # Errors
    ///
    /// [`SimError::IllegalTransition`] unless paused.
    pub fn resume(&self) -> SimResult<()> {
        let mut inner = self.lock();
        if inner.sim_state != SimulationState::Paused {
            return Err(SimError::illegal_transition("resume", inner.sim_state));
        }
        inner.sim_state = SimulationState::Running;
        inner.last_tick = None;
        debug!("simulation resumed");
        inner.publish(&SimulationEvent::Resumed);
        Ok(())
    }

    /// Stop the simulation. Legal from running or paused.
    ///
    /// Synchronous: the timer thread is torn down before this returns. The
    /// snapshot taken at `start()` is restored bit-for-bit, simulated and
    /// elapsed time are zeroed, and a final [`SimulationEvent::StepCompleted`]
    /// is published so observers re-render the restored state.
    ///
    /// # Errors
    ///
    /// [`SimError::IllegalTransition`] if already stopped.
    pub fn stop(&self) -> SimResult<()> {
        let timer = {
            let mut inner = self.lock();
            if inner.sim_state == SimulationState::Stopped {
                return Err(SimError::illegal_transition("stop", inner.sim_state));
            }
            inner.sim_state = SimulationState::Stopped;
            inner.restore_snapshot();
            inner.state.time = 0.0;
            inner.elapsed_time = 0.0;
            inner.last_tick = None;
            let timer = inner.timer.take();
            inner.publish(&SimulationEvent::StepCompleted { time: 0.0 });
            inner.publish(&SimulationEvent::Stopped);
            timer
        };
        // Join outside the lock: an in-flight tick holds it until done.
        if let Some(mut timer) = timer {
            timer.kill();
        }
        debug!("simulation stopped");
        Ok(())
    }

    /// Drive one tick manually with an explicit wall-clock delta.
    ///
    /// Runs the exact tick pipeline the periodic driver runs, for headless
    /// or offline stepping. Intended to be used with a long timer interval
    /// (low `update_frequency`), so the background driver stays idle.
    ///
    /// # Errors
    ///
    /// [`SimError::IllegalTransition`] unless running; otherwise any error
    /// the tick itself produced (also recorded in
    /// [`Simulation::last_error`]).
    pub fn advance(&self, measured_delta: f64) -> SimResult<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.sim_state != SimulationState::Running {
            return Err(SimError::illegal_transition("advance", inner.sim_state));
        }
        inner.tick_with_delta(measured_delta).map(|_| ())
    }

    /// Replace the integration strategy. Takes effect on the next tick.
    pub fn set_integration_method(&self, method: Box<dyn IntegrationMethod>) {
        self.lock().method = method;
    }

    /// Replace the integration strategy by registered name.
    ///
    /// # Errors
    ///
    /// [`SimError::UnknownIntegrationMethod`] for unregistered names.
    pub fn set_integration_method_by_name(&self, name: &str) -> SimResult<()> {
        let method = method_by_name(name)?;
        self.lock().method = method;
        Ok(())
    }

    /// Name of the active integration strategy.
    #[must_use]
    pub fn integration_method_name(&self) -> &'static str {
        self.lock().method.name()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SimulationState {
        self.lock().sim_state
    }

    /// Whether the simulation is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SimulationState::Running
    }

    /// Whether the simulation is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state() == SimulationState::Paused
    }

    /// Whether the simulation is stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state() == SimulationState::Stopped
    }

    /// Current value of the simulated-time symbol.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.lock().state.time
    }

    /// Accumulated measured wall-clock time since `start()`.
    #[must_use]
    pub fn elapsed_time(&self) -> f64 {
        self.lock().elapsed_time
    }

    /// Effective update frequency over the recent delta history:
    /// `count / Σdeltas`, or 0 if the history is empty or sums to zero.
    #[must_use]
    pub fn real_update_frequency(&self) -> f64 {
        self.lock().real_update_frequency()
    }

    /// Configured fixed integration delta, if any.
    #[must_use]
    pub fn delta_time(&self) -> Option<f64> {
        self.lock().delta_time
    }

    /// Set or clear the fixed integration delta.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] if the value is not a positive real.
    pub fn set_delta_time(&self, delta_t: Option<f64>) -> SimResult<()> {
        if let Some(dt) = delta_t {
            validate_positive("delta_t", dt)?;
        }
        self.lock().delta_time = delta_t;
        Ok(())
    }

    /// Configured simulated-time limit, if any.
    #[must_use]
    pub fn time_limit(&self) -> Option<f64> {
        self.lock().time_limit
    }

    /// Set or clear the simulated-time limit.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] if the value is not a positive real.
    pub fn set_time_limit(&self, time_limit: Option<f64>) -> SimResult<()> {
        if let Some(limit) = time_limit {
            validate_positive("time_limit", limit)?;
        }
        self.lock().time_limit = time_limit;
        Ok(())
    }

    /// Whether the simulation wraps around at the time limit.
    #[must_use]
    pub fn is_looped(&self) -> bool {
        self.lock().looped
    }

    /// Enable or disable looping at the time limit.
    pub fn set_looped(&self, looped: bool) {
        self.lock().looped = looped;
    }

    /// Configured tick frequency in Hz.
    #[must_use]
    pub fn update_frequency(&self) -> f64 {
        self.lock().update_frequency
    }

    /// Change the tick frequency; retunes a live timer immediately.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] if the value is not a positive real.
    pub fn set_update_frequency(&self, frequency: f64) -> SimResult<()> {
        validate_positive("update_frequency", frequency)?;
        let mut inner = self.lock();
        inner.update_frequency = frequency;
        if let Some(timer) = &inner.timer {
            timer.set_interval(1.0 / frequency);
        }
        Ok(())
    }

    /// Multiplier applied to measured wall deltas when advancing simulated
    /// time.
    #[must_use]
    pub fn time_multiplier(&self) -> f64 {
        self.lock().time_multiplier
    }

    /// Change the time multiplier.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] if the value is not a positive real.
    pub fn set_time_multiplier(&self, multiplier: f64) -> SimResult<()> {
        validate_positive("time_multiplier", multiplier)?;
        self.lock().time_multiplier = multiplier;
        Ok(())
    }

    /// Message of the last tick failure, if any, since the last `start()`.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Run a closure against the current state vectors under the instance
    /// lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&StateVectors) -> R) -> R {
        f(&self.lock().state)
    }

    /// Clone of the current state vectors, for external readers.
    #[must_use]
    pub fn state_vectors(&self) -> StateVectors {
        self.lock().state.clone()
    }

    /// Clone of the current coordinate values.
    #[must_use]
    pub fn coordinates(&self) -> DVector<f64> {
        self.lock().state.q.clone()
    }

    /// Clone of the current velocity values.
    #[must_use]
    pub fn velocities(&self) -> DVector<f64> {
        self.lock().state.dq.clone()
    }

    /// Clone of the current acceleration values.
    #[must_use]
    pub fn accelerations(&self) -> DVector<f64> {
        self.lock().state.ddq.clone()
    }
}

fn validate_positive(name: &str, value: f64) -> SimResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SimError::config(format!(
            "{name} must be a positive real, got {value}"
        )));
    }
    Ok(())
}
