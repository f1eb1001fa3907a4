//! Assembly problem solver.
//!
//! The "assembly problem" is the task of adjusting coordinate and velocity
//! values so that all constraint equations are satisfied to within tolerance.
//! [`AssemblyProblemSolver::init`] solves it at simulation start (coordinate
//! and velocity levels); [`AssemblyProblemSolver::step`] solves it after each
//! numerical integration prediction.
//!
//! # Algorithm
//!
//! Position level (damped Newton–Raphson, pseudo-inverse of the Jacobian):
//!
//! ```text
//! q ← q − relax · pinv(Phi_q(q)) · Phi(q)      repeated while ‖Phi(q)‖ > tol
//! ```
//!
//! Velocity level (single correction, not iterated):
//!
//! ```text
//! dq ← dq + pinv(dPhi_dq(q)) · (beta(q) − dPhi_dq(q) · dq)
//! ```
//!
//! The pseudo-inverse handles redundant (rank-deficient) constraint sets.
//! The position loop is bounded by [`SolverParams::max_iterations`]; an
//! unreachable constraint set yields [`SimError::NonConvergence`] instead of
//! spinning forever.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

use crate::error::{SimError, SimResult};
use crate::state::StateVectors;

/// Singular-value cutoff for the pseudo-inverse.
const PINV_EPS: f64 = 1e-12;

/// Numeric-evaluation boundary.
///
/// Implementors evaluate a compiled matrix- or vector-valued expression using
/// the current values of all system symbols. Evaluation must be deterministic
/// given the state and must not mutate the state; it is called at least twice
/// per Newton iteration, so it should be cheap.
///
/// A blanket implementation covers plain closures, which is how the symbolic
/// front end hands its compiled functions to this crate.
pub trait Evaluate<T>: Send {
    /// Evaluate the expression against the given state.
    fn evaluate(&self, state: &StateVectors) -> T;
}

impl<T, F> Evaluate<T> for F
where
    F: Fn(&StateVectors) -> T + Send,
{
    fn evaluate(&self, state: &StateVectors) -> T {
        self(state)
    }
}

/// A compiled vector-valued constraint expression (residuals, right-hand
/// sides).
pub type VectorExpr = Box<dyn Evaluate<DVector<f64>>>;

/// A compiled matrix-valued constraint expression (Jacobians).
pub type MatrixExpr = Box<dyn Evaluate<DMatrix<f64>>>;

/// Tolerance and relaxation scalars of the assembly problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverParams {
    /// Position-residual tolerance for the steady-state phase.
    pub geom_eq_tol: f64,
    /// Relaxation (damping) factor for the steady-state phase.
    pub geom_eq_relax: f64,
    /// Position-residual tolerance for the initialization phase.
    pub geom_eq_init_tol: f64,
    /// Relaxation (damping) factor for the initialization phase.
    pub geom_eq_init_relax: f64,
    /// Upper bound on position-level Newton iterations per correction.
    pub max_iterations: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            geom_eq_tol: 5e-5,
            geom_eq_relax: 0.1,
            geom_eq_init_tol: 1e-10,
            geom_eq_init_relax: 0.1,
            max_iterations: 500,
        }
    }
}

impl SolverParams {
    /// Check that every scalar is non-negative and the iteration budget is
    /// not zero.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] naming the offending parameter.
    pub fn validate(&self) -> SimResult<()> {
        for (name, value) in [
            ("geom_eq_tol", self.geom_eq_tol),
            ("geom_eq_relax", self.geom_eq_relax),
            ("geom_eq_init_tol", self.geom_eq_init_tol),
            ("geom_eq_init_relax", self.geom_eq_init_relax),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::config(format!(
                    "{name} must be a non-negative real, got {value}"
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(SimError::config("max_iterations must be at least 1"));
        }
        Ok(())
    }
}

/// Immutable bundle of compiled constraint expressions plus solver scalars.
///
/// Created once via [`ConstraintSet::assembly_problem`]; read-only
/// thereafter. The `_init` variants are used exactly once, at simulation
/// start.
pub struct ConstraintSet {
    phi: VectorExpr,
    phi_q: MatrixExpr,
    beta: VectorExpr,
    phi_init: VectorExpr,
    phi_init_q: MatrixExpr,
    beta_init: VectorExpr,
    dphi_dq: MatrixExpr,
    dphi_init_dq: MatrixExpr,
    params: SolverParams,
}

impl std::fmt::Debug for ConstraintSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstraintSet")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ConstraintSet {
    /// Register the assembly problem from its eight compiled expressions, in
    /// this fixed positional order, with default tolerances.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn assembly_problem(
        phi: VectorExpr,
        phi_q: MatrixExpr,
        beta: VectorExpr,
        phi_init: VectorExpr,
        phi_init_q: MatrixExpr,
        beta_init: VectorExpr,
        dphi_dq: MatrixExpr,
        dphi_init_dq: MatrixExpr,
    ) -> Self {
        Self {
            phi,
            phi_q,
            beta,
            phi_init,
            phi_init_q,
            beta_init,
            dphi_dq,
            dphi_init_dq,
            params: SolverParams::default(),
        }
    }

    /// Replace the tolerance/relaxation scalars.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if any scalar is negative or non-finite.
    pub fn with_params(mut self, params: SolverParams) -> SimResult<Self> {
        params.validate()?;
        self.params = params;
        Ok(self)
    }

    /// The active tolerance/relaxation scalars.
    #[must_use]
    pub const fn params(&self) -> &SolverParams {
        &self.params
    }
}

/// Iteratively corrects `q` and `dq` so they satisfy the constraint
/// equations, at initialization and after every integration step.
#[derive(Debug)]
pub struct AssemblyProblemSolver {
    constraints: ConstraintSet,
}

impl AssemblyProblemSolver {
    /// Create a solver over a registered constraint set.
    #[must_use]
    pub const fn new(constraints: ConstraintSet) -> Self {
        Self { constraints }
    }

    /// The constraint set this solver corrects against.
    #[must_use]
    pub const fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Solve the assembly problem initialization (coordinate and velocity
    /// levels), using the `_init` constraint expressions.
    ///
    /// Mutates `q` and `dq` in place.
    ///
    /// # Errors
    ///
    /// [`SimError::NonConvergence`] if the position loop exhausts its
    /// iteration budget; [`SimError::Numeric`] if the pseudo-inverse fails.
    pub fn init(&self, state: &mut StateVectors) -> SimResult<()> {
        let c = &self.constraints;
        correct_coordinates(
            "init",
            &c.phi_init,
            &c.phi_init_q,
            c.params.geom_eq_init_tol,
            c.params.geom_eq_init_relax,
            c.params.max_iterations,
            state,
        )?;
        correct_velocities(&c.dphi_init_dq, &c.beta_init, state)
    }

    /// Solve the assembly problem after an integration prediction
    /// (coordinate and velocity levels), using the steady-state constraint
    /// expressions.
    ///
    /// `_delta_t` is accepted for signature parity with the integration
    /// contract and is not used by the correction itself.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`AssemblyProblemSolver::init`].
    pub fn step(&self, state: &mut StateVectors, _delta_t: f64) -> SimResult<()> {
        let c = &self.constraints;
        correct_coordinates(
            "step",
            &c.phi,
            &c.phi_q,
            c.params.geom_eq_tol,
            c.params.geom_eq_relax,
            c.params.max_iterations,
            state,
        )?;
        correct_velocities(&c.dphi_dq, &c.beta, state)
    }
}

/// Position-level damped Newton loop.
///
/// One correction is always applied before the residual is tested, then the
/// loop continues while the Euclidean norm of the residual exceeds `tol`.
/// The Jacobian is re-evaluated at the new `q` on every iteration.
fn correct_coordinates(
    phase: &str,
    phi: &VectorExpr,
    phi_q: &MatrixExpr,
    tol: f64,
    relax: f64,
    max_iterations: usize,
    state: &mut StateVectors,
) -> SimResult<()> {
    let mut residual = phi.evaluate(state);
    let mut iterations = 0;

    loop {
        let jacobian = phi_q.evaluate(state);
        let pinv = jacobian
            .pseudo_inverse(PINV_EPS)
            .map_err(SimError::numeric)?;
        state.q -= (pinv * &residual) * relax;

        residual = phi.evaluate(state);
        iterations += 1;

        if residual.norm() <= tol {
            debug!(
                "assembly {phase} converged in {iterations} iterations \
                 (residual {:.3e})",
                residual.norm()
            );
            return Ok(());
        }
        if iterations >= max_iterations {
            warn!(
                "assembly {phase} did not converge after {iterations} iterations \
                 (residual {:.3e}, tolerance {tol:.3e})",
                residual.norm()
            );
            return Err(SimError::NonConvergence {
                residual: residual.norm(),
                tolerance: tol,
                iterations,
            });
        }
    }
}

/// Velocity-level correction, applied exactly once (not iterated).
fn correct_velocities(
    dphi_dq: &MatrixExpr,
    beta: &VectorExpr,
    state: &mut StateVectors,
) -> SimResult<()> {
    let jacobian = dphi_dq.evaluate(state);
    let rhs = beta.evaluate(state) - &jacobian * &state.dq;
    let pinv = jacobian
        .pseudo_inverse(PINV_EPS)
        .map_err(SimError::numeric)?;
    state.dq += pinv * rhs;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    /// Scalar constraint q[0] = target: Phi = [q0 - target], Phi_q = [[1]].
    fn scalar_constraint(target: f64) -> ConstraintSet {
        let phi = move |s: &StateVectors| dvector![s.q[0] - target];
        let jac = |_: &StateVectors| dmatrix![1.0];
        let beta = |_: &StateVectors| dvector![0.0];
        ConstraintSet::assembly_problem(
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(jac),
            Box::new(jac),
        )
    }

    #[test]
    fn test_init_converges_to_tolerance() {
        let solver = AssemblyProblemSolver::new(scalar_constraint(0.5));
        let mut state = StateVectors::from_coordinates(dvector![0.1]);

        solver.init(&mut state).unwrap();

        assert!((state.q[0] - 0.5).abs() <= 1e-10, "q={}", state.q[0]);
    }

    #[test]
    fn test_step_converges_to_tolerance() {
        let solver = AssemblyProblemSolver::new(scalar_constraint(0.5));
        let mut state = StateVectors::from_coordinates(dvector![0.3]);

        solver.step(&mut state, 0.01).unwrap();

        assert!((state.q[0] - 0.5).abs() <= 5e-5, "q={}", state.q[0]);
    }

    #[test]
    fn test_velocity_level_single_correction() {
        // Velocity constraint: 1 * dq = beta = 2. A single correction with
        // pinv([[1]]) lands exactly on the solution.
        let phi = |s: &StateVectors| dvector![s.q[0]];
        let jac = |_: &StateVectors| dmatrix![1.0];
        let beta = |_: &StateVectors| dvector![2.0];
        let set = ConstraintSet::assembly_problem(
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(jac),
            Box::new(jac),
        );
        let solver = AssemblyProblemSolver::new(set);
        let mut state = StateVectors::from_coordinates(dvector![0.0]);
        state.dq[0] = 7.0;

        solver.init(&mut state).unwrap();

        assert!((state.dq[0] - 2.0).abs() < 1e-12, "dq={}", state.dq[0]);
    }

    #[test]
    fn test_unconditional_first_correction() {
        // Start exactly on the constraint manifold. One correction is still
        // applied before the residual test; for a satisfied constraint that
        // correction is zero, so q is unchanged.
        let solver = AssemblyProblemSolver::new(scalar_constraint(0.5));
        let mut state = StateVectors::from_coordinates(dvector![0.5]);

        solver.init(&mut state).unwrap();

        assert_eq!(state.q[0], 0.5);
    }

    #[test]
    fn test_non_convergence_is_reported() {
        // Phi = [1] has no root; the bounded loop must report failure.
        let phi = |_: &StateVectors| dvector![1.0];
        let jac = |_: &StateVectors| dmatrix![1.0];
        let beta = |_: &StateVectors| dvector![0.0];
        let set = ConstraintSet::assembly_problem(
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(jac),
            Box::new(jac),
        )
        .with_params(SolverParams {
            max_iterations: 10,
            ..SolverParams::default()
        })
        .unwrap();
        let solver = AssemblyProblemSolver::new(set);
        let mut state = StateVectors::from_coordinates(dvector![0.0]);

        let err = solver.init(&mut state).unwrap_err();
        match err {
            SimError::NonConvergence { iterations, .. } => assert_eq!(iterations, 10),
            other => panic!("expected NonConvergence, got {other:?}"),
        }
    }

    #[test]
    fn test_redundant_constraints_converge() {
        // Two identical rows: rank-deficient Jacobian, handled by the
        // pseudo-inverse.
        let phi = |s: &StateVectors| dvector![s.q[0] - 1.0, s.q[0] - 1.0];
        let jac = |_: &StateVectors| dmatrix![1.0; 1.0];
        let beta = |_: &StateVectors| dvector![0.0, 0.0];
        let set = ConstraintSet::assembly_problem(
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(phi),
            Box::new(jac),
            Box::new(beta),
            Box::new(jac),
            Box::new(jac),
        );
        let solver = AssemblyProblemSolver::new(set);
        let mut state = StateVectors::from_coordinates(dvector![0.3]);

        solver.init(&mut state).unwrap();

        assert!((state.q[0] - 1.0).abs() <= 1e-10, "q={}", state.q[0]);
    }

    #[test]
    fn test_params_validation_rejects_negative() {
        let params = SolverParams {
            geom_eq_tol: -1.0,
            ..SolverParams::default()
        };
        assert!(params.validate().is_err());

        let params = SolverParams {
            max_iterations: 0,
            ..SolverParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_default_params() {
        let params = SolverParams::default();
        assert_eq!(params.geom_eq_tol, 5e-5);
        assert_eq!(params.geom_eq_relax, 0.1);
        assert_eq!(params.geom_eq_init_tol, 1e-10);
        assert_eq!(params.geom_eq_init_relax, 0.1);
        params.validate().unwrap();
    }

    #[test]
    fn test_constraint_set_debug() {
        let set = scalar_constraint(0.0);
        let debug = format!("{set:?}");
        assert!(debug.contains("ConstraintSet"));
    }
}
