use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::biomech::BiomechAssessment;
use crate::model::TrainedModel;
use crate::predict::RiskPrediction;

pub struct ExportReport {
    pub players: usize,
    pub metric_rows: usize,
}

pub fn export_risk_report(
    path: &Path,
    model: &TrainedModel,
    predictions: &[RiskPrediction],
    biomech: &[BiomechAssessment],
) -> Result<ExportReport> {
    let risk_rows = risk_rows(predictions, biomech)?;

    let m = model.metrics();
    let mut model_rows = vec![
        vec!["Metric".to_string(), "Value".to_string()],
        vec!["generated_at".to_string(), model.generated_at().to_string()],
        vec!["target".to_string(), model.target().to_string()],
        vec!["roc_auc".to_string(), format!("{:.4}", m.roc_auc)],
        vec!["log_loss".to_string(), format!("{:.4}", m.log_loss)],
        vec!["brier".to_string(), format!("{:.4}", m.brier)],
        vec!["accuracy".to_string(), format!("{:.4}", m.report.accuracy)],
        vec!["train_samples".to_string(), m.train_samples.to_string()],
        vec!["test_samples".to_string(), m.test_samples.to_string()],
    ];
    for (class, cm) in &m.report.classes {
        model_rows.push(vec![format!("precision[{class}]"), format!("{:.4}", cm.precision)]);
        model_rows.push(vec![format!("recall[{class}]"), format!("{:.4}", cm.recall)]);
        model_rows.push(vec![format!("f1[{class}]"), format!("{:.4}", cm.f1_score)]);
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Risk")?;
        write_rows(sheet, &risk_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Model")?;
        write_rows(sheet, &model_rows)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        players: risk_rows.len().saturating_sub(1),
        metric_rows: model_rows.len().saturating_sub(1),
    })
}

/// `biomech` is either empty or parallel to `predictions`.
fn risk_rows(
    predictions: &[RiskPrediction],
    biomech: &[BiomechAssessment],
) -> Result<Vec<Vec<String>>> {
    if !biomech.is_empty() && biomech.len() != predictions.len() {
        return Err(anyhow!(
            "{} biomech assessments for {} predictions",
            biomech.len(),
            predictions.len()
        ));
    }

    let mut rows = vec![vec![
        "Player ID".to_string(),
        "Player".to_string(),
        "Team".to_string(),
        "Position".to_string(),
        "Injury Risk".to_string(),
        "A:C Ratio".to_string(),
        "Fatigue Score".to_string(),
        "Flag A:C".to_string(),
        "Flag Spike".to_string(),
        "Flag Fatigue".to_string(),
        "Biomech Score".to_string(),
    ]];
    for (idx, p) in predictions.iter().enumerate() {
        let r = &p.featured.record;
        let f = &p.featured.features;
        let mut row = vec![
            r.player_id.to_string(),
            r.name.clone(),
            r.team.clone(),
            r.position.clone(),
            format!("{:.4}", p.injury_risk_score),
            opt_to_string(f.acute_chronic_ratio.map(|v| format!("{v:.3}"))),
            format!("{:.3}", f.fatigue_score),
        ];
        match biomech.get(idx) {
            Some(b) => row.extend([
                yes_no(b.flags.flag_acute_chronic),
                yes_no(b.flags.flag_workload_spike),
                yes_no(b.flags.flag_fatigue),
                format!("{:.3}", b.biomech_risk_score),
            ]),
            None => row.extend(std::iter::repeat_n(String::new(), 4)),
        }
        rows.push(row);
    }
    Ok(rows)
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biomech::{BiomechThresholds, compute_biomech_flags};
    use crate::features::derive_features;
    use crate::record::sample_record;

    #[test]
    fn flags_follow_row_order_when_player_ids_repeat() {
        let mut tired = sample_record(1);
        tired.muscle_fatigue_index = 1.0;
        tired.sleep_quality = 3.0;
        let mut fresh = sample_record(1);
        fresh.muscle_fatigue_index = 0.1;
        fresh.sleep_quality = 9.0;

        let rows = derive_features(&[tired, fresh]);
        let thresholds = BiomechThresholds {
            acute_chronic_ratio_threshold: 1.5,
            workload_spike_threshold: 0.12,
            fatigue_threshold: 0.7,
        };
        let biomech = compute_biomech_flags(&rows, &thresholds).expect("finite thresholds");
        let predictions: Vec<RiskPrediction> = rows
            .into_iter()
            .map(|featured| RiskPrediction {
                featured,
                injury_risk_score: 0.5,
            })
            .collect();

        let sheet = risk_rows(&predictions, &biomech).expect("parallel slices");
        assert_eq!(sheet.len(), 3);
        assert_eq!(sheet[1][9], "yes");
        assert_eq!(sheet[2][9], "no");
    }

    #[test]
    fn mismatched_flag_rows_are_rejected() {
        let rows = derive_features(&[sample_record(1), sample_record(2)]);
        let thresholds = BiomechThresholds {
            acute_chronic_ratio_threshold: 1.5,
            workload_spike_threshold: 0.12,
            fatigue_threshold: 0.7,
        };
        let biomech = compute_biomech_flags(&rows[..1], &thresholds).expect("finite thresholds");
        let predictions: Vec<RiskPrediction> = rows
            .into_iter()
            .map(|featured| RiskPrediction {
                featured,
                injury_risk_score: 0.2,
            })
            .collect();
        assert!(risk_rows(&predictions, &biomech).is_err());
        assert_eq!(risk_rows(&predictions, &[]).expect("flags optional")[1][9], "");
    }
}
