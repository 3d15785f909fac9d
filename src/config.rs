use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::biomech::BiomechThresholds;
use crate::error::{Result, RiskError};
use crate::gbdt::BoostingParams;
use crate::record::LABEL_COLUMN;

pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";
const CONFIG_ENV: &str = "INJURY_RISK_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    pub features: FeatureConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(alias = "biomechanics")]
    pub biomech: BiomechThresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub raw_path: Option<PathBuf>,
    #[serde(default = "default_target")]
    pub target: String,
    pub random_state: u64,
    pub test_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Passed to the classifier as-is; validated on first use.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ModelConfig {
    pub fn boosting_params(&self) -> Result<BoostingParams> {
        BoostingParams::from_map(&self.params)
    }
}

fn default_target() -> String {
    LABEL_COLUMN.to_string()
}

impl AppConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw).map_err(|err| {
            let field = err
                .location()
                .map(|loc| format!("line {} column {}", loc.line(), loc.column()))
                .unwrap_or_else(|| "config".to_string());
            RiskError::config(field, err.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.biomech.validate()?;
        if self.data.target.trim().is_empty() {
            return Err(RiskError::config("data.target", "must not be empty"));
        }
        let ts = self.data.test_size;
        if !(ts > 0.0 && ts < 1.0) {
            return Err(RiskError::config(
                "data.test_size",
                format!("must be in (0, 1), got {ts}"),
            ));
        }
        for (field, names) in [
            ("features.numeric", &self.features.numeric),
            ("features.categorical", &self.features.categorical),
        ] {
            if let Some(blank) = names.iter().find(|n| n.trim().is_empty()) {
                return Err(RiskError::config(field, format!("blank column name {blank:?}")));
            }
        }
        self.model.boosting_params()?;
        Ok(())
    }
}

/// `explicit`, then `$INJURY_RISK_CONFIG`, then the bundled default path.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| {
            env::var(CONFIG_ENV)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
