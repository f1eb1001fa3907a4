//! Driven planar pendulum.
//!
//! A single generalized coordinate `θ` rheonomically driven by
//! `θ(t) = A·cos(ω·t)`:
//!
//! ```text
//! Φ(q, t)  = [θ − A·cos(ω·t)]
//! Φ_q      = [[1]]
//! β(t)     = [−A·ω·sin(ω·t)]        (velocity-level right-hand side)
//! ```
//!
//! The initialization variants are identical to the steady-state ones.

use nalgebra::{dmatrix, dvector};
use serde::{Deserialize, Serialize};

use crate::assembly::ConstraintSet;
use crate::state::StateVectors;

/// Configuration for a driven planar pendulum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrivenPendulumConfig {
    /// Drive amplitude (radians).
    pub amplitude: f64,
    /// Drive angular frequency (rad/s).
    pub angular_frequency: f64,
    /// Initial angle guess (radians).
    pub initial_angle: f64,
}

impl Default for DrivenPendulumConfig {
    fn default() -> Self {
        Self {
            amplitude: std::f64::consts::FRAC_PI_6, // 30 degrees
            angular_frequency: 2.0 * std::f64::consts::PI,
            initial_angle: 0.1,
        }
    }
}

impl DrivenPendulumConfig {
    /// Drive period in seconds.
    #[must_use]
    pub fn period(&self) -> f64 {
        2.0 * std::f64::consts::PI / self.angular_frequency
    }
}

/// Driven planar pendulum scenario.
#[derive(Debug, Clone)]
pub struct DrivenPendulum {
    config: DrivenPendulumConfig,
}

impl DrivenPendulum {
    /// Create a new scenario.
    #[must_use]
    pub const fn new(config: DrivenPendulumConfig) -> Self {
        Self { config }
    }

    /// Scenario configuration.
    #[must_use]
    pub const fn config(&self) -> &DrivenPendulumConfig {
        &self.config
    }

    /// Angle prescribed by the drive at time `t`.
    #[must_use]
    pub fn driven_angle(&self, t: f64) -> f64 {
        self.config.amplitude * (self.config.angular_frequency * t).cos()
    }

    /// Build the initial state and the compiled constraint set.
    #[must_use]
    pub fn build(&self) -> (StateVectors, ConstraintSet) {
        let amplitude = self.config.amplitude;
        let omega = self.config.angular_frequency;

        let phi =
            move |s: &StateVectors| dvector![s.q[0] - amplitude * (omega * s.time).cos()];
        let phi_q = |_: &StateVectors| dmatrix![1.0];
        let beta = move |s: &StateVectors| dvector![-amplitude * omega * (omega * s.time).sin()];
        let dphi_dq = |_: &StateVectors| dmatrix![1.0];

        let constraints = ConstraintSet::assembly_problem(
            Box::new(phi),
            Box::new(phi_q),
            Box::new(beta),
            Box::new(phi),
            Box::new(phi_q),
            Box::new(beta),
            Box::new(dphi_dq),
            Box::new(dphi_dq),
        );

        let state = StateVectors::from_coordinates(dvector![self.config.initial_angle]);
        (state, constraints)
    }
}
