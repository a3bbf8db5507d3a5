//! Generalized-Bloch two-pool model.
//!
//! Lineshapes and the linearized R2sl precomputation feed the Hamiltonians;
//! propagators compose into sequences whose steady state yields signals and
//! their parameter derivatives.

pub mod hamiltonian;
pub mod jacobian;
pub mod lineshape;
pub mod propagator;
pub mod r2sl;
pub mod sequence;
