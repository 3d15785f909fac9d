use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::{FeaturedRecord, derive_features};
use crate::model::TrainedModel;
use crate::record::PlayerRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPrediction {
    pub featured: FeaturedRecord,
    pub injury_risk_score: f64,
}

/// Scores a batch with a frozen model. The batch is checked against the
/// model's columns before anything is transformed.
pub fn predict_risk(model: &TrainedModel, batch: &[PlayerRecord]) -> Result<Vec<RiskPrediction>> {
    let rows = derive_features(batch);
    let preprocessor = model.preprocessor();
    preprocessor.check_schema(&rows)?;
    let design = preprocessor.transform(&rows)?;

    let classifier = model.classifier();
    let scores: Vec<f64> = design
        .par_iter()
        .map(|x| classifier.predict_proba(x))
        .collect();

    Ok(rows
        .into_iter()
        .zip(scores)
        .map(|(featured, injury_risk_score)| RiskPrediction {
            featured,
            injury_risk_score,
        })
        .collect())
}

pub fn rank_by_risk(mut predictions: Vec<RiskPrediction>) -> Vec<RiskPrediction> {
    predictions.sort_by(|a, b| {
        b.injury_risk_score
            .total_cmp(&a.injury_risk_score)
            .then(a.featured.record.player_id.cmp(&b.featured.record.player_id))
    });
    predictions
}
