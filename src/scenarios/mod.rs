//! Ready-made constraint sets for canonical mechanisms.
//!
//! Each scenario builds the initial [`StateVectors`] and the compiled
//! [`ConstraintSet`] for a classic constrained system, the way a symbolic
//! front end would hand them to this crate.
//!
//! [`StateVectors`]: crate::state::StateVectors
//! [`ConstraintSet`]: crate::assembly::ConstraintSet

pub mod four_bar;
pub mod pendulum;

pub use four_bar::{FourBar, FourBarConfig};
pub use pendulum::{DrivenPendulum, DrivenPendulumConfig};
