//! panicle-core: Association testing and kinship engine for PANICLE
//!
//! Implements kinship (VanRaden, IBS) and PCA construction, REML
//! variance components in the kinship eigenbasis, GLM and MLM marker
//! scans, and the multi-locus FarmCPU, FarmCPU resampling and BLINK
//! engines.

pub mod assoc;
pub mod cancel;
pub mod config;
pub mod design;
pub mod error;
pub mod iterative;
pub mod kinship;
pub mod mixed;
pub mod pca;
pub mod report;
pub mod util;

pub use assoc::{AssociationResult, GlmScanner, MlmScanner, ScanConfig, ScanResult};
pub use cancel::CancellationToken;
pub use config::GwasConfig;
pub use design::FixedEffects;
pub use error::{GwasError, Result, Warning};
pub use iterative::{
    Blink, BlinkConfig, FarmCpu, FarmCpuConfig, FarmCpuResampling, GlmRescan, IterativeResult,
    MlmRescan, ResamplingConfig, ResamplingResult,
};
pub use kinship::{KinshipConfig, KinshipEngine, KinshipMatrix, KinshipMethod};
pub use mixed::{RemlConfig, VarianceComponentSolver, VarianceComponents};
pub use pca::{PcaConfig, PcaEngine, PcaResult};
