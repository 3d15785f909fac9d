use tracing::info;

use crate::config::AppConfig;
use crate::error::{Result, RiskError};
use crate::features::{DERIVED_FEATURE_NAMES, derive_features};
use crate::gbdt::{BoostingParams, GradientBoostingClassifier};
use crate::metrics::EvaluationMetrics;
use crate::model::TrainedModel;
use crate::preprocess::{Preprocessor, check_columns};
use crate::record::PlayerRecord;
use crate::split::stratified_split;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    pub target: String,
    /// Raw numeric columns; the derived features are always appended.
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
    pub params: BoostingParams,
    pub random_state: u64,
    pub test_size: f64,
}

impl TrainingOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            target: config.data.target.clone(),
            numeric: config.features.numeric.clone(),
            categorical: config.features.categorical.clone(),
            params: config.model.boosting_params()?,
            random_state: config.data.random_state,
            test_size: config.data.test_size,
        })
    }

    /// Numeric columns the scaler sees: configured raw columns, then every
    /// derived feature not already listed.
    pub fn numeric_features(&self) -> Vec<String> {
        let mut out = self.numeric.clone();
        for name in DERIVED_FEATURE_NAMES {
            if !out.iter().any(|c| c == name) {
                out.push(name.to_string());
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct TrainingResult {
    pub model: TrainedModel,
    pub metrics: EvaluationMetrics,
}

pub fn train_model(batch: &[PlayerRecord], options: &TrainingOptions) -> Result<TrainingResult> {
    if batch.is_empty() {
        return Err(RiskError::training("training batch is empty"));
    }
    let labels = batch
        .iter()
        .map(|r| r.label(&options.target))
        .collect::<Result<Vec<u8>>>()?;

    let rows = derive_features(batch);
    let numeric = options.numeric_features();
    check_columns(&rows, &numeric, &options.categorical)?;

    let positives = labels.iter().filter(|&&y| y == 1).count();
    if positives == 0 || positives == labels.len() {
        return Err(RiskError::training(format!(
            "`{}` has a single class across {} rows",
            options.target,
            labels.len()
        )));
    }

    let split = stratified_split(&labels, options.test_size, options.random_state)?;
    let train_rows: Vec<_> = split.train.iter().map(|&i| rows[i].clone()).collect();
    let test_rows: Vec<_> = split.test.iter().map(|&i| rows[i].clone()).collect();
    let train_y: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();
    let test_y: Vec<u8> = split.test.iter().map(|&i| labels[i]).collect();

    let preprocessor = Preprocessor::fit(&train_rows, &numeric, &options.categorical)?;
    let train_x = preprocessor.transform(&train_rows)?;
    let test_x = preprocessor.transform(&test_rows)?;

    let classifier =
        GradientBoostingClassifier::fit(&train_x, &train_y, &options.params, options.random_state)?;

    let proba: Vec<f64> = test_x.iter().map(|x| classifier.predict_proba(x)).collect();
    let metrics = EvaluationMetrics::evaluate(&test_y, &proba, train_y.len())
        .ok_or_else(|| RiskError::training("held-out split lacks one of the classes"))?;

    info!(
        rows = batch.len(),
        train = metrics.train_samples,
        test = metrics.test_samples,
        roc_auc = metrics.roc_auc,
        log_loss = metrics.log_loss,
        trees = classifier.n_trees(),
        "model trained"
    );

    let model = TrainedModel::new(
        options.target.clone(),
        numeric,
        options.categorical.clone(),
        options.random_state,
        options.test_size,
        preprocessor,
        classifier,
        metrics.clone(),
    );
    Ok(TrainingResult { model, metrics })
}
