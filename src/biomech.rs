//! Rule-based biomechanical flags. Informational only; never feeds the model.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};
use crate::features::{FeaturedRecord, safe_ratio};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiomechThresholds {
    pub acute_chronic_ratio_threshold: f64,
    pub workload_spike_threshold: f64,
    pub fatigue_threshold: f64,
}

impl BiomechThresholds {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            (
                "biomech.acute_chronic_ratio_threshold",
                self.acute_chronic_ratio_threshold,
            ),
            (
                "biomech.workload_spike_threshold",
                self.workload_spike_threshold,
            ),
            ("biomech.fatigue_threshold", self.fatigue_threshold),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(RiskError::config(field, format!("not a finite number: {value}")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BiomechFlags {
    pub flag_acute_chronic: bool,
    pub flag_workload_spike: bool,
    pub flag_fatigue: bool,
}

impl BiomechFlags {
    /// A missing ratio never raises a flag.
    pub fn evaluate(row: &FeaturedRecord, t: &BiomechThresholds) -> Self {
        let spike = safe_ratio(row.record.sprint_distance_km, row.record.total_distance_km);
        Self {
            flag_acute_chronic: row
                .features
                .acute_chronic_ratio
                .is_some_and(|v| v >= t.acute_chronic_ratio_threshold),
            flag_workload_spike: spike.is_some_and(|v| v >= t.workload_spike_threshold),
            flag_fatigue: row.features.fatigue_score >= t.fatigue_threshold,
        }
    }

    pub fn count(&self) -> u8 {
        [
            self.flag_acute_chronic,
            self.flag_workload_spike,
            self.flag_fatigue,
        ]
        .into_iter()
        .filter(|f| *f)
        .count() as u8
    }

    pub fn risk_score(&self) -> f64 {
        f64::from(self.count()) / 3.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomechAssessment {
    pub featured: FeaturedRecord,
    pub flags: BiomechFlags,
    pub biomech_risk_score: f64,
}

pub fn compute_biomech_flags(
    batch: &[FeaturedRecord],
    thresholds: &BiomechThresholds,
) -> Result<Vec<BiomechAssessment>> {
    thresholds.validate()?;
    Ok(batch
        .iter()
        .map(|row| {
            let flags = BiomechFlags::evaluate(row, thresholds);
            BiomechAssessment {
                featured: row.clone(),
                flags,
                biomech_risk_score: flags.risk_score(),
            }
        })
        .collect())
}
