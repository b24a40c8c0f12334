//! panicle-linalg: Linear algebra wrappers for PANICLE
//!
//! Provides the dense matrix type, the decompositions used by the
//! association engines (Cholesky, rank-revealing orthonormal basis,
//! symmetric eigendecomposition) and a bracketed 1-D minimiser.

pub mod decomposition;
pub mod dense;
pub mod optimize;

pub use decomposition::LinalgError;
pub use dense::DenseMatrix;
