//! # mecsim
//!
//! Real-time simulation of constrained multibody mechanical systems.
//!
//! Given a set of generalized coordinates and nonlinear holonomic constraint
//! equations (supplied as compiled numeric callables), this crate enforces the
//! constraints at every simulation step and advances the system state in time:
//!
//! - [`assembly::AssemblyProblemSolver`] corrects coordinates and velocities
//!   against the constraint residuals with damped Newton–Raphson iterations
//!   and a pseudo-inverse of the constraint Jacobian.
//! - [`integration::IntegrationMethod`] strategies predict the next state from
//!   the accelerations before the correction is applied.
//! - [`simulation::Simulation`] is the state machine and wall-clock scheduler
//!   that drives periodic ticks and exposes start/pause/resume/stop/loop
//!   controls.
//!
//! ## Example
//!
//! ```rust
//! use mecsim::prelude::*;
//! use mecsim::scenarios::pendulum::{DrivenPendulum, DrivenPendulumConfig};
//!
//! let scenario = DrivenPendulum::new(DrivenPendulumConfig::default());
//! let (state, constraints) = scenario.build();
//! let solver = AssemblyProblemSolver::new(constraints);
//! let config = SimulationConfig::default();
//! let sim = Simulation::new(state, solver, &config)?;
//! sim.start(Some(0.01), None, None)?;
//! sim.stop()?;
//! # Ok::<(), mecsim::SimError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::many_single_char_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops,  // Numerical code choices are intentional
    clippy::imprecise_flops,
    clippy::too_many_lines,
    clippy::missing_const_for_fn,  // Many functions can't be const in stable Rust
    clippy::float_cmp  // Snapshot restore semantics are compared bit-for-bit
)]

pub mod assembly;
pub mod config;
pub mod error;
pub mod integration;
pub mod scenarios;
pub mod simulation;
pub mod state;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::assembly::{AssemblyProblemSolver, ConstraintSet, Evaluate, SolverParams};
    pub use crate::config::SimulationConfig;
    pub use crate::error::{SimError, SimResult};
    pub use crate::integration::{method_by_name, ImprovedEuler, IntegrationMethod};
    pub use crate::simulation::{Simulation, SimulationEvent, SimulationState};
    pub use crate::state::StateVectors;
}

/// Re-export for public API
pub use error::{SimError, SimResult};
