//! Numerical integration strategies.
//!
//! An [`IntegrationMethod`] predicts the next coordinates and velocities from
//! the current accelerations and a time step, then delegates to the assembly
//! solver to correct the prediction back onto the constraint manifold.
//! Strategies are interchangeable at runtime (between ticks) and can be
//! selected by registered name via [`method_by_name`].

use crate::assembly::AssemblyProblemSolver;
use crate::error::{SimError, SimResult};
use crate::state::StateVectors;

/// A replaceable integration strategy.
///
/// Both operations run to completion synchronously; the simulation lock
/// guarantees they never overlap with another tick or control call.
pub trait IntegrationMethod: Send + std::fmt::Debug {
    /// Registered name of this strategy.
    fn name(&self) -> &'static str;

    /// Initialization at t = 0: no prediction, assembly initialization only.
    ///
    /// # Errors
    ///
    /// Propagates assembly solver failures.
    fn init(&self, solver: &AssemblyProblemSolver, state: &mut StateVectors) -> SimResult<()> {
        solver.init(state)
    }

    /// Predict `q` and `dq` from `ddq` over `delta_t`, then correct with the
    /// assembly solver's `step`.
    ///
    /// # Errors
    ///
    /// Propagates assembly solver failures.
    fn step(
        &self,
        solver: &AssemblyProblemSolver,
        state: &mut StateVectors,
        delta_t: f64,
    ) -> SimResult<()>;
}

/// Explicit improved Euler strategy.
///
/// Algorithm:
/// ```text
/// q  ← q + Δt·(dq + 0.5·Δt·ddq)
/// dq ← dq + Δt·ddq
/// ```
/// followed by the assembly correction for the same `Δt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImprovedEuler;

impl ImprovedEuler {
    /// Create a new improved Euler strategy.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl IntegrationMethod for ImprovedEuler {
    fn name(&self) -> &'static str {
        "euler"
    }

    fn step(
        &self,
        solver: &AssemblyProblemSolver,
        state: &mut StateVectors,
        delta_t: f64,
    ) -> SimResult<()> {
        state.q += (&state.dq + &state.ddq * (0.5 * delta_t)) * delta_t;
        state.dq += &state.ddq * delta_t;
        solver.step(state, delta_t)
    }
}

/// Resolve an integration strategy by its registered name.
///
/// Names are case-insensitive. Currently registered: `"euler"`.
///
/// # Errors
///
/// [`SimError::UnknownIntegrationMethod`] for unregistered names.
pub fn method_by_name(name: &str) -> SimResult<Box<dyn IntegrationMethod>> {
    match name.to_ascii_lowercase().as_str() {
        "euler" => Ok(Box::new(ImprovedEuler::new())),
        _ => Err(SimError::UnknownIntegrationMethod(name.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::assembly::ConstraintSet;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn test_euler_prediction() {
        // q0 = 1, dq0 = 2, ddq0 = 4, dt = 0.5:
        // q  = 1 + 0.5*(2 + 0.5*0.5*4) = 2.5
        // dq = 2 + 0.5*4 = 4
        let solver = constrained_to_prediction();
        let mut state = StateVectors::from_coordinates(dvector![1.0]);
        state.dq[0] = 2.0;
        state.ddq[0] = 4.0;

        ImprovedEuler::new().step(&solver, &mut state, 0.5).unwrap();

        assert!((state.q[0] - 2.5).abs() < 1e-12, "q={}", state.q[0]);
        assert!((state.dq[0] - 4.0).abs() < 1e-12, "dq={}", state.dq[0]);
    }

    /// A constraint that is satisfied wherever the prediction lands, so the
    /// correction is a no-op and the raw prediction can be inspected.
    fn constrained_to_prediction() -> AssemblyProblemSolver {
        let phi = |_: &StateVectors| dvector![0.0];
        let jac = |_: &StateVectors| dmatrix![1.0];
        let beta = |s: &StateVectors| dvector![s.dq[0]];
        AssemblyProblemSolver::new(ConstraintSet::assembly_problem(
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(jac),
            Box::new(jac),
        ))
    }

    #[test]
    fn test_init_delegates_to_solver() {
        let phi = |s: &StateVectors| dvector![s.q[0] - 0.25];
        let jac = |_: &StateVectors| dmatrix![1.0];
        let beta = |_: &StateVectors| dvector![0.0];
        let solver = AssemblyProblemSolver::new(ConstraintSet::assembly_problem(
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(jac),
            Box::new(jac),
        ));
        let mut state = StateVectors::from_coordinates(dvector![0.0]);

        ImprovedEuler::new().init(&solver, &mut state).unwrap();

        assert!((state.q[0] - 0.25).abs() <= 1e-10);
    }

    #[test]
    fn test_method_by_name_euler() {
        let method = method_by_name("euler").unwrap();
        assert_eq!(method.name(), "euler");

        // Lookup is case-insensitive.
        assert!(method_by_name("Euler").is_ok());
        assert!(method_by_name("EULER").is_ok());
    }

    #[test]
    fn test_method_by_name_unknown() {
        let err = method_by_name("rk4").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("no integration method"));
        assert!(msg.contains("rk4"));
    }
}
