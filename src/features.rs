use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::PlayerRecord;

pub const DERIVED_FEATURE_NAMES: [&str; 6] = [
    "acute_load",
    "chronic_load",
    "acute_chronic_ratio",
    "match_intensity",
    "travel_burden",
    "fatigue_score",
];

const ACUTE_WINDOW_DAYS: f64 = 30.0;
const CHRONIC_WINDOW_DAYS: f64 = 90.0;

/// Derived columns. Ratios with a zero or non-finite denominator are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub acute_load: f64,
    pub chronic_load: f64,
    pub acute_chronic_ratio: Option<f64>,
    pub match_intensity: Option<f64>,
    pub travel_burden: Option<f64>,
    pub fatigue_score: f64,
}

impl FeatureVector {
    pub fn from_record(r: &PlayerRecord) -> Self {
        let acute_load = r.minutes_last_30d / ACUTE_WINDOW_DAYS;
        let chronic_load = r.minutes_last_30d / CHRONIC_WINDOW_DAYS;
        let matches = r.matches_last_30d as f64;
        Self {
            acute_load,
            chronic_load,
            acute_chronic_ratio: safe_ratio(acute_load, chronic_load),
            match_intensity: safe_ratio(r.minutes_last_30d, matches),
            travel_burden: safe_ratio(r.travel_km_last_30d, matches),
            fatigue_score: r.muscle_fatigue_index * 0.6 + (10.0 - r.sleep_quality) * 0.4 / 10.0,
        }
    }

    pub fn get(&self, column: &str) -> Option<Option<f64>> {
        let value = match column {
            "acute_load" => Some(self.acute_load),
            "chronic_load" => Some(self.chronic_load),
            "acute_chronic_ratio" => self.acute_chronic_ratio,
            "match_intensity" => self.match_intensity,
            "travel_burden" => self.travel_burden,
            "fatigue_score" => Some(self.fatigue_score),
            _ => return None,
        };
        Some(value.filter(|v| v.is_finite()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturedRecord {
    pub record: PlayerRecord,
    pub features: FeatureVector,
}

impl FeaturedRecord {
    pub fn new(record: PlayerRecord) -> Self {
        let features = FeatureVector::from_record(&record);
        Self { record, features }
    }

    pub fn numeric(&self, column: &str) -> Result<Option<f64>> {
        match self.features.get(column) {
            Some(value) => Ok(value),
            None => self.record.numeric(column),
        }
    }

    pub fn categorical(&self, column: &str) -> Result<&str> {
        self.record.categorical(column)
    }
}

pub fn derive_features(batch: &[PlayerRecord]) -> Vec<FeaturedRecord> {
    batch.iter().cloned().map(FeaturedRecord::new).collect()
}

/// `num / den`, or `None` when the denominator is zero or either side is not
/// finite.
pub fn safe_ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 || !den.is_finite() || !num.is_finite() {
        return None;
    }
    Some(num / den).filter(|v| v.is_finite())
}
