use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::Result as RiskResult;
use crate::features::FeaturedRecord;
use crate::gbdt::GradientBoostingClassifier;
use crate::metrics::EvaluationMetrics;
use crate::preprocess::Preprocessor;

pub const ARTIFACT_VERSION: u32 = 1;

/// Fitted transform, classifier and held-out metrics. Built once by the
/// trainer; fields are private so a loaded or trained model cannot change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    version: u32,
    generated_at: String,
    target: String,
    numeric_features: Vec<String>,
    categorical_features: Vec<String>,
    random_state: u64,
    test_size: f64,
    preprocessor: Preprocessor,
    classifier: GradientBoostingClassifier,
    metrics: EvaluationMetrics,
}

impl TrainedModel {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        target: String,
        numeric_features: Vec<String>,
        categorical_features: Vec<String>,
        random_state: u64,
        test_size: f64,
        preprocessor: Preprocessor,
        classifier: GradientBoostingClassifier,
        metrics: EvaluationMetrics,
    ) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            target,
            numeric_features,
            categorical_features,
            random_state,
            test_size,
            preprocessor,
            classifier,
            metrics,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn generated_at(&self) -> &str {
        &self.generated_at
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn numeric_features(&self) -> &[String] {
        &self.numeric_features
    }

    pub fn categorical_features(&self) -> &[String] {
        &self.categorical_features
    }

    pub fn random_state(&self) -> u64 {
        self.random_state
    }

    pub fn test_size(&self) -> f64 {
        self.test_size
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn classifier(&self) -> &GradientBoostingClassifier {
        &self.classifier
    }

    pub fn metrics(&self) -> &EvaluationMetrics {
        &self.metrics
    }

    pub fn design_row(&self, row: &FeaturedRecord) -> RiskResult<Vec<f64>> {
        self.preprocessor.transform_row(row)
    }

    pub fn score_row(&self, row: &FeaturedRecord) -> RiskResult<f64> {
        Ok(self.classifier.predict_proba(&self.design_row(row)?))
    }

    /// Importances keyed by transformed column name, largest first.
    pub fn feature_importances(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .preprocessor
            .output_names()
            .into_iter()
            .zip(self.classifier.feature_importances().iter().copied())
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize trained model")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let model = serde_json::from_str::<Self>(raw).context("parse trained model")?;
        if model.version != ARTIFACT_VERSION {
            return Err(anyhow!(
                "trained model version {} is not supported (expected {ARTIFACT_VERSION})",
                model.version
            ));
        }
        if let Some(problem) = model.preprocessor.structure_problem() {
            return Err(anyhow!("trained model preprocessor is inconsistent: {problem}"));
        }
        if let Some(problem) = model.classifier.structure_problem() {
            return Err(anyhow!("trained model classifier is inconsistent: {problem}"));
        }
        if model.preprocessor.width() != model.classifier.n_features() {
            return Err(anyhow!(
                "preprocessor emits {} columns but the classifier expects {}",
                model.preprocessor.width(),
                model.classifier.n_features()
            ));
        }
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, self.to_json()?).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("load model {}", path.display()))
    }
}
