//! Mixed-model machinery shared by MLM and the iterative engines.

pub mod eigen;
pub mod reml;

pub use eigen::KinshipEigen;
pub use reml::{RemlConfig, VarianceComponentSolver, VarianceComponents};
