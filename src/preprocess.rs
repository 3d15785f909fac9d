//! Column transform fitted on the training split and frozen afterwards:
//! standard scaling for numeric columns, one-hot encoding for categoricals.
//!
//! Missing numeric values are imputed with the fitted mean, so they
//! standardize to exactly 0.0. Categorical levels not seen at fit time encode
//! as an all-zero block.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, RiskError};
use crate::features::FeaturedRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Population mean/std per column over present values. Columns with no
    /// present values get mean 0; zero variance gets scale 1.
    pub fn fit(rows: &[FeaturedRecord], columns: &[String]) -> Result<Self> {
        let mut means = Vec::with_capacity(columns.len());
        let mut scales = Vec::with_capacity(columns.len());
        for column in columns {
            let mut values = Vec::with_capacity(rows.len());
            for row in rows {
                if let Some(v) = row.numeric(column)? {
                    values.push(v);
                }
            }
            if values.is_empty() {
                means.push(0.0);
                scales.push(1.0);
                continue;
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            means.push(mean);
            scales.push(if std > f64::EPSILON * mean.abs().max(1.0) {
                std
            } else {
                1.0
            });
        }
        Ok(Self {
            columns: columns.to_vec(),
            means,
            scales,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    fn transform_into(&self, row: &FeaturedRecord, out: &mut Vec<f64>) -> Result<()> {
        for (idx, column) in self.columns.iter().enumerate() {
            let z = match row.numeric(column)? {
                Some(v) => (v - self.means[idx]) / self.scales[idx],
                None => 0.0,
            };
            out.push(z);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    columns: Vec<String>,
    categories: Vec<Vec<String>>,
}

impl OneHotEncoder {
    pub fn fit(rows: &[FeaturedRecord], columns: &[String]) -> Result<Self> {
        let mut categories = Vec::with_capacity(columns.len());
        for column in columns {
            let mut levels = BTreeSet::new();
            for row in rows {
                levels.insert(row.categorical(column)?.to_string());
            }
            categories.push(levels.into_iter().collect());
        }
        Ok(Self {
            columns: columns.to_vec(),
            categories,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn categories(&self) -> &[Vec<String>] {
        &self.categories
    }

    pub fn width(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    /// Returns the unseen `(column, value)` pairs of this row, if any.
    fn transform_into<'r>(
        &self,
        row: &'r FeaturedRecord,
        out: &mut Vec<f64>,
    ) -> Result<Vec<(usize, &'r str)>> {
        let mut unseen = Vec::new();
        for (idx, column) in self.columns.iter().enumerate() {
            let value = row.categorical(column)?;
            let levels = &self.categories[idx];
            let hit = levels.binary_search_by(|level| level.as_str().cmp(value)).ok();
            if hit.is_none() {
                unseen.push((idx, value));
            }
            out.extend((0..levels.len()).map(|i| if Some(i) == hit { 1.0 } else { 0.0 }));
        }
        Ok(unseen)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    scaler: StandardScaler,
    encoder: OneHotEncoder,
}

impl Preprocessor {
    pub fn fit(rows: &[FeaturedRecord], numeric: &[String], categorical: &[String]) -> Result<Self> {
        Ok(Self {
            scaler: StandardScaler::fit(rows, numeric)?,
            encoder: OneHotEncoder::fit(rows, categorical)?,
        })
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn encoder(&self) -> &OneHotEncoder {
        &self.encoder
    }

    pub fn width(&self) -> usize {
        self.scaler.columns.len() + self.encoder.width()
    }

    pub fn output_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scaler
            .columns
            .iter()
            .map(|c| format!("num__{c}"))
            .collect();
        for (column, levels) in self.encoder.columns.iter().zip(&self.encoder.categories) {
            names.extend(levels.iter().map(|level| format!("cat__{column}_{level}")));
        }
        names
    }

    /// Describes the first inconsistency in a deserialized transform, if any.
    pub(crate) fn structure_problem(&self) -> Option<String> {
        let s = &self.scaler;
        if s.means.len() != s.columns.len() || s.scales.len() != s.columns.len() {
            return Some(format!(
                "scaler has {} columns, {} means and {} scales",
                s.columns.len(),
                s.means.len(),
                s.scales.len()
            ));
        }
        if let Some(column) = s
            .columns
            .iter()
            .zip(&s.scales)
            .find(|(_, scale)| !(scale.is_finite() && **scale > 0.0))
            .map(|(c, _)| c)
        {
            return Some(format!("scaler column `{column}` has an unusable scale"));
        }
        let e = &self.encoder;
        if e.categories.len() != e.columns.len() {
            return Some(format!(
                "encoder has {} columns but {} vocabularies",
                e.columns.len(),
                e.categories.len()
            ));
        }
        for (column, levels) in e.columns.iter().zip(&e.categories) {
            if levels.windows(2).any(|w| w[0] >= w[1]) {
                return Some(format!("vocabulary of `{column}` is not sorted and unique"));
            }
        }
        None
    }

    pub fn check_schema(&self, rows: &[FeaturedRecord]) -> Result<()> {
        check_columns(rows, &self.scaler.columns, &self.encoder.columns)
    }

    pub fn transform_row(&self, row: &FeaturedRecord) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.width());
        self.scaler.transform_into(row, &mut out)?;
        self.encoder.transform_into(row, &mut out)?;
        Ok(out)
    }

    /// Transforms a batch, warning once per distinct unseen category.
    pub fn transform(&self, rows: &[FeaturedRecord]) -> Result<Vec<Vec<f64>>> {
        let mut unseen: BTreeSet<(usize, &str)> = BTreeSet::new();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut encoded = Vec::with_capacity(self.width());
            self.scaler.transform_into(row, &mut encoded)?;
            unseen.extend(self.encoder.transform_into(row, &mut encoded)?);
            out.push(encoded);
        }
        for (idx, value) in unseen {
            warn!(
                column = %self.encoder.columns[idx],
                value,
                "unseen category encoded as all-zero indicators"
            );
        }
        Ok(out)
    }
}

pub fn check_columns(
    rows: &[FeaturedRecord],
    numeric: &[String],
    categorical: &[String],
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for column in numeric.iter().chain(categorical) {
        if !seen.insert(column.as_str()) {
            return Err(RiskError::schema(column.clone(), "declared more than once"));
        }
    }
    for row in rows {
        for column in numeric {
            row.numeric(column)?;
        }
        for column in categorical {
            row.categorical(column)?;
        }
    }
    Ok(())
}
