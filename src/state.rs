//! Mutable numeric state of a mechanical system.
//!
//! [`StateVectors`] bundles the generalized coordinates `q`, velocities `dq`,
//! accelerations `ddq` and parameters `p` as dense column vectors, together
//! with the simulated-time symbol. The vectors are mutated in place by the
//! assembly solver and the integration strategy; they are never resized
//! during a simulation run.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Dense numeric state of a mechanical system.
///
/// One entry per symbol of each category. The owning [`Simulation`] takes a
/// deep copy of all vectors at `start()` (the snapshot) and restores it on
/// `stop()` and on loop wrap-around.
///
/// [`Simulation`]: crate::simulation::Simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVectors {
    /// Generalized coordinates.
    pub q: DVector<f64>,
    /// Generalized velocities.
    pub dq: DVector<f64>,
    /// Generalized accelerations.
    pub ddq: DVector<f64>,
    /// System parameters.
    pub p: DVector<f64>,
    /// Current value of the simulated-time symbol.
    pub time: f64,
}

impl StateVectors {
    /// Create a zeroed state with `n_coords` coordinates and `n_params`
    /// parameters.
    #[must_use]
    pub fn zeros(n_coords: usize, n_params: usize) -> Self {
        Self {
            q: DVector::zeros(n_coords),
            dq: DVector::zeros(n_coords),
            ddq: DVector::zeros(n_coords),
            p: DVector::zeros(n_params),
            time: 0.0,
        }
    }

    /// Create a state from initial coordinate values, with zeroed
    /// derivatives and no parameters.
    #[must_use]
    pub fn from_coordinates(q: DVector<f64>) -> Self {
        let n = q.len();
        Self {
            q,
            dq: DVector::zeros(n),
            ddq: DVector::zeros(n),
            p: DVector::zeros(0),
            time: 0.0,
        }
    }

    /// Number of generalized coordinates.
    #[must_use]
    pub fn num_coordinates(&self) -> usize {
        self.q.len()
    }

    /// Number of system parameters.
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.p.len()
    }

    /// Check that every entry of every vector is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.time.is_finite()
            && self.q.iter().all(|v| v.is_finite())
            && self.dq.iter().all(|v| v.is_finite())
            && self.ddq.iter().all(|v| v.is_finite())
            && self.p.iter().all(|v| v.is_finite())
    }

    /// Overwrite this state with a previously taken deep copy.
    ///
    /// Restores every vector and the time symbol exactly, so a snapshot
    /// round-trip is bit-for-bit.
    pub fn restore(&mut self, snapshot: &Self) {
        self.q.copy_from(&snapshot.q);
        self.dq.copy_from(&snapshot.dq);
        self.ddq.copy_from(&snapshot.ddq);
        self.p.copy_from(&snapshot.p);
        self.time = snapshot.time;
    }
}
