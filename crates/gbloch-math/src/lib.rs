//! Mathematical primitives for the gBloch qMRI workspace.

pub mod interp;
pub mod linalg;
pub mod quadrature;
