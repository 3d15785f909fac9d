use std::sync::OnceLock;

use injury_risk::error::RiskError;
use injury_risk::features::derive_features;
use injury_risk::gbdt::BoostingParams;
use injury_risk::model::TrainedModel;
use injury_risk::predict::{predict_risk, rank_by_risk};
use injury_risk::synthetic::generate_synthetic_players;
use injury_risk::train::{TrainingOptions, train_model};

fn options() -> TrainingOptions {
    TrainingOptions {
        target: "injury_next_30d".to_string(),
        numeric: [
            "age",
            "minutes_last_30d",
            "matches_last_30d",
            "sprint_distance_km",
            "total_distance_km",
            "previous_injuries",
            "muscle_fatigue_index",
            "sleep_quality",
            "travel_km_last_30d",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        categorical: vec!["position".to_string(), "dominant_foot".to_string()],
        params: BoostingParams {
            n_estimators: 30,
            ..BoostingParams::default()
        },
        random_state: 42,
        test_size: 0.2,
    }
}

fn model() -> &'static TrainedModel {
    static MODEL: OnceLock<TrainedModel> = OnceLock::new();
    MODEL.get_or_init(|| {
        train_model(&generate_synthetic_players(200, 42), &options())
            .expect("two-class batch trains")
            .model
    })
}

#[test]
fn scores_are_probabilities_in_input_order() {
    let batch = generate_synthetic_players(60, 99);
    let scored = predict_risk(model(), &batch).expect("batch scores");
    assert_eq!(scored.len(), batch.len());
    for (p, raw) in scored.iter().zip(&batch) {
        assert_eq!(p.featured.record.player_id, raw.player_id);
        assert!((0.0..=1.0).contains(&p.injury_risk_score));
    }
}

#[test]
fn batch_scores_match_single_row_scoring() {
    let batch = generate_synthetic_players(20, 7);
    let scored = predict_risk(model(), &batch).expect("batch scores");
    for p in &scored {
        let single = model().score_row(&p.featured).expect("row scores");
        assert_eq!(single, p.injury_risk_score);
    }
}

#[test]
fn unseen_position_scores_without_failure() {
    let mut batch = generate_synthetic_players(3, 12);
    batch[1].position = "Unknown".to_string();

    let scored = predict_risk(model(), &batch).expect("batch scores");
    let risk = scored[1].injury_risk_score;
    assert!(risk.is_finite());
    assert!((0.0..=1.0).contains(&risk));

    let names = model().preprocessor().output_names();
    let design = model().design_row(&scored[1].featured).expect("row encodes");
    for (name, value) in names.iter().zip(&design) {
        if name.starts_with("cat__position_") {
            assert_eq!(*value, 0.0, "{name}");
        }
    }
}

#[test]
fn label_is_not_needed_for_scoring() {
    let mut batch = generate_synthetic_players(5, 3);
    for r in &mut batch {
        r.injury_next_30d = None;
    }
    assert_eq!(predict_risk(model(), &batch).expect("batch scores").len(), 5);
}

#[test]
fn missing_model_column_is_a_schema_error() {
    let mut train = generate_synthetic_players(150, 21);
    for (i, r) in train.iter_mut().enumerate() {
        r.extra_numeric.insert("hsr_km".to_string(), (i % 5) as f64);
    }
    let mut opts = options();
    opts.numeric.push("hsr_km".to_string());
    let model = train_model(&train, &opts).expect("two-class batch trains").model;

    let err = predict_risk(&model, &generate_synthetic_players(4, 22)).unwrap_err();
    assert_eq!(err, RiskError::missing_column("hsr_km"));
}

#[test]
fn ranking_orders_by_descending_risk() {
    let scored = predict_risk(model(), &generate_synthetic_players(40, 5)).expect("batch scores");
    let ranked = rank_by_risk(scored);
    assert!(
        ranked
            .windows(2)
            .all(|w| w[0].injury_risk_score >= w[1].injury_risk_score)
    );
}

#[test]
fn saved_artifact_scores_like_the_in_memory_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("models").join("injury_model.json");
    model().save(&path).expect("model saved");
    assert!(!path.with_extension("json.tmp").exists());

    let loaded = TrainedModel::load(&path).expect("model loads");
    assert_eq!(loaded.version(), model().version());
    assert_eq!(loaded.generated_at(), model().generated_at());
    assert_eq!(loaded.numeric_features(), model().numeric_features());
    assert_eq!(
        loaded.preprocessor().encoder().categories(),
        model().preprocessor().encoder().categories()
    );

    let rows = derive_features(&generate_synthetic_players(25, 77));
    for row in &rows {
        let a = model().score_row(row).expect("row scores");
        let b = loaded.score_row(row).expect("row scores");
        assert!((a - b).abs() < 1e-9, "{a} vs {b}");
    }
}

#[test]
fn artifact_with_another_version_is_rejected() {
    let raw = model().to_json().expect("serializable");
    let bumped = raw.replacen("\"version\": 1", "\"version\": 99", 1);
    assert_ne!(raw, bumped);
    assert!(TrainedModel::from_json(&bumped).is_err());
}

#[test]
fn risk_report_workbook_is_written() {
    use injury_risk::biomech::{BiomechThresholds, compute_biomech_flags};
    use injury_risk::export::export_risk_report;

    let scored = rank_by_risk(predict_risk(model(), &generate_synthetic_players(12, 4)).expect("batch scores"));
    let rows: Vec<_> = scored.iter().map(|p| p.featured.clone()).collect();
    let thresholds = BiomechThresholds {
        acute_chronic_ratio_threshold: 1.5,
        workload_spike_threshold: 0.12,
        fatigue_threshold: 0.7,
    };
    let biomech = compute_biomech_flags(&rows, &thresholds).expect("finite thresholds");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("risk.xlsx");
    let report = export_risk_report(&path, model(), &scored, &biomech).expect("workbook written");
    assert_eq!(report.players, 12);
    assert!(report.metric_rows >= 8);
    assert!(std::fs::metadata(&path).expect("workbook on disk").len() > 0);
}

#[test]
fn training_rows_rebuild_the_training_design_exactly() {
    let mut train = generate_synthetic_players(120, 31);
    train[5].matches_last_30d = 0;
    train[6].matches_last_30d = 0;
    train[6].minutes_last_30d = 0.0;
    let model = train_model(&train, &options())
        .expect("two-class batch trains")
        .model;

    let training_design = model
        .preprocessor()
        .transform(&derive_features(&train))
        .expect("training columns resolve");
    let scored = predict_risk(&model, &train).expect("training rows score");
    assert_eq!(scored.len(), training_design.len());
    for (p, expected) in scored.iter().zip(&training_design) {
        let rebuilt = model.design_row(&p.featured).expect("same schema");
        let same_bits = rebuilt.len() == expected.len()
            && rebuilt
                .iter()
                .zip(expected)
                .all(|(a, b)| a.to_bits() == b.to_bits());
        assert!(same_bits, "player {}", p.featured.record.player_id);
    }

    let names = model.preprocessor().output_names();
    let intensity = names
        .iter()
        .position(|n| n == "num__match_intensity")
        .expect("derived column is scaled");
    assert_eq!(training_design[5][intensity], 0.0);
    assert_eq!(training_design[6][intensity], 0.0);
}

#[test]
fn edited_artifact_with_broken_structure_is_rejected() {
    let mut doc: serde_json::Value =
        serde_json::from_str(&model().to_json().expect("serializable")).expect("valid json");
    let root = doc
        .pointer_mut("/classifier/trees/0/nodes/0/Split/left")
        .expect("first tree splits at the root");
    *root = serde_json::json!(9_999);
    let raw = serde_json::to_string(&doc).expect("serializable");
    assert!(TrainedModel::from_json(&raw).is_err());

    let mut doc: serde_json::Value =
        serde_json::from_str(&model().to_json().expect("serializable")).expect("valid json");
    doc.pointer_mut("/preprocessor/encoder/categories/0")
        .and_then(serde_json::Value::as_array_mut)
        .expect("position vocabulary")
        .pop();
    let raw = serde_json::to_string(&doc).expect("serializable");
    let err = TrainedModel::from_json(&raw).expect_err("width no longer matches");
    assert!(format!("{err:#}").contains("columns"), "{err:#}");
}
