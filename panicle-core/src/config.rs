//! Aggregate run configuration, loadable from JSON.
//!
//! Every section falls back to its defaults, so a file only needs the
//! values it overrides:
//!
//! ```json
//! { "farmcpu": { "bin_size": 1000000 }, "resampling": { "n_resamples": 50 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assoc::ScanConfig;
use crate::error::{GwasError, Result};
use crate::iterative::{BlinkConfig, FarmCpuConfig, ResamplingConfig};
use crate::kinship::KinshipConfig;
use crate::mixed::RemlConfig;
use crate::pca::PcaConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GwasConfig {
    pub kinship: KinshipConfig,
    pub pca: PcaConfig,
    pub reml: RemlConfig,
    pub scan: ScanConfig,
    pub farmcpu: FarmCpuConfig,
    pub blink: BlinkConfig,
    pub resampling: ResamplingConfig,
}

impl GwasConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| GwasError::Serialization(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| GwasError::Serialization(e.to_string()))
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.kinship.validate()?;
        self.pca.validate()?;
        self.reml.validate()?;
        self.scan.validate()?;
        self.farmcpu.validate()?;
        self.blink.validate()?;
        self.resampling.validate()?;
        Ok(())
    }
}
