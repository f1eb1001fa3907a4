//! Crank-driven four-bar linkage.
//!
//! Ground of length `d` along the x-axis, crank `l1` driven at constant
//! angular rate `ω` (so `θ₁ = ω·t`), coupler `l2` and rocker `l3`. The two
//! generalized coordinates are the coupler and rocker angles `q = [θ₂, θ₃]`,
//! and the loop-closure equations are
//!
//! ```text
//! Φ₁ = l1·cos θ₁ + l2·cos θ₂ − l3·cos θ₃ − d
//! Φ₂ = l1·sin θ₁ + l2·sin θ₂ − l3·sin θ₃
//! ```
//!
//! with the 2×2 Jacobian
//!
//! ```text
//! Φ_q = [ −l2·sin θ₂   l3·sin θ₃ ]
//!       [  l2·cos θ₂  −l3·cos θ₃ ]
//! ```
//!
//! and velocity-level right-hand side `β = [l1·ω·sin θ₁, −l1·ω·cos θ₁]`.

use nalgebra::{dmatrix, dvector};
use serde::{Deserialize, Serialize};

use crate::assembly::ConstraintSet;
use crate::state::StateVectors;

/// Configuration for a crank-driven four-bar linkage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FourBarConfig {
    /// Crank length.
    pub crank: f64,
    /// Coupler length.
    pub coupler: f64,
    /// Rocker length.
    pub rocker: f64,
    /// Ground length (distance between the fixed pivots).
    pub ground: f64,
    /// Crank angular rate (rad/s).
    pub angular_rate: f64,
    /// Initial guess for the coupler angle θ₂ (radians).
    pub initial_coupler_angle: f64,
    /// Initial guess for the rocker angle θ₃ (radians).
    pub initial_rocker_angle: f64,
}

impl Default for FourBarConfig {
    fn default() -> Self {
        // Grashof crank-rocker: crank + ground < coupler + rocker.
        Self {
            crank: 1.0,
            coupler: 4.0,
            rocker: 3.0,
            ground: 4.0,
            angular_rate: 1.0,
            initial_coupler_angle: 0.8,
            initial_rocker_angle: 1.7,
        }
    }
}

impl FourBarConfig {
    /// Check the Grashof crank-rocker condition for full crank rotation.
    #[must_use]
    pub fn is_grashof(&self) -> bool {
        let mut lengths = [self.crank, self.coupler, self.rocker, self.ground];
        lengths.sort_by(|a, b| a.total_cmp(b));
        lengths[0] + lengths[3] <= lengths[1] + lengths[2]
    }
}

/// Crank-driven four-bar linkage scenario.
#[derive(Debug, Clone)]
pub struct FourBar {
    config: FourBarConfig,
}

impl FourBar {
    /// Create a new scenario.
    #[must_use]
    pub const fn new(config: FourBarConfig) -> Self {
        Self { config }
    }

    /// Scenario configuration.
    #[must_use]
    pub const fn config(&self) -> &FourBarConfig {
        &self.config
    }

    /// Loop-closure residual at the given angles and time, for inspection.
    #[must_use]
    pub fn closure_residual(&self, theta2: f64, theta3: f64, t: f64) -> (f64, f64) {
        let c = &self.config;
        let theta1 = c.angular_rate * t;
        (
            c.crank * theta1.cos() + c.coupler * theta2.cos() - c.rocker * theta3.cos() - c.ground,
            c.crank * theta1.sin() + c.coupler * theta2.sin() - c.rocker * theta3.sin(),
        )
    }

    /// Build the initial state and the compiled constraint set.
    #[must_use]
    pub fn build(&self) -> (StateVectors, ConstraintSet) {
        let c = self.config.clone();

        let phi = {
            let c = c.clone();
            move |s: &StateVectors| {
                let theta1 = c.angular_rate * s.time;
                dvector![
                    c.crank * theta1.cos() + c.coupler * s.q[0].cos()
                        - c.rocker * s.q[1].cos()
                        - c.ground,
                    c.crank * theta1.sin() + c.coupler * s.q[0].sin() - c.rocker * s.q[1].sin()
                ]
            }
        };
        let phi_q = {
            let c = c.clone();
            move |s: &StateVectors| {
                dmatrix![
                    -c.coupler * s.q[0].sin(), c.rocker * s.q[1].sin();
                     c.coupler * s.q[0].cos(), -c.rocker * s.q[1].cos()
                ]
            }
        };
        let beta = {
            let c = c.clone();
            move |s: &StateVectors| {
                let theta1 = c.angular_rate * s.time;
                dvector![
                    c.crank * c.angular_rate * theta1.sin(),
                    -c.crank * c.angular_rate * theta1.cos()
                ]
            }
        };

        let constraints = ConstraintSet::assembly_problem(
            Box::new(phi.clone()),
            Box::new(phi_q.clone()),
            Box::new(beta.clone()),
            Box::new(phi),
            Box::new(phi_q.clone()),
            Box::new(beta),
            Box::new(phi_q.clone()),
            Box::new(phi_q),
        );

        let state = StateVectors::from_coordinates(dvector![
            c.initial_coupler_angle,
            c.initial_rocker_angle
        ]);
        (state, constraints)
    }
}
