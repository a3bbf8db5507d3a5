//! Precision and bias analyses of quantitative MRI protocols under the
//! generalized-Bloch two-pool model.

pub mod afi;
pub mod crb;
pub mod fit;
pub mod model;
pub mod monte_carlo;
pub mod protocol;
pub mod sir;
pub mod sweep;
pub mod vfa;
