use injury_risk::dataset::{load_players, parse_players_json, write_players_csv};
use injury_risk::error::RiskError;
use injury_risk::synthetic::generate_synthetic_players;

#[test]
fn csv_written_batch_loads_back_identically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("raw").join("players.csv");
    let batch = generate_synthetic_players(50, 42);

    write_players_csv(&path, &batch).expect("csv written");
    let loaded = load_players(&path).expect("batch loads");
    assert_eq!(loaded, batch);
}

#[test]
fn unlabeled_batch_writes_without_label_column() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("upcoming.csv");
    let mut batch = generate_synthetic_players(5, 1);
    for r in &mut batch {
        r.injury_next_30d = None;
    }

    write_players_csv(&path, &batch).expect("csv written");
    let header = std::fs::read_to_string(&path).expect("read back");
    assert!(!header.lines().next().expect("header line").contains("injury_next_30d"));
    assert_eq!(load_players(&path).expect("batch loads"), batch);
}

#[test]
fn json_batch_loads_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("players.json");
    let raw = r#"[
        {"player_id": 9, "name": "Ion", "team": "SC Dunarea", "position": "Forward",
         "dominant_foot": "Right", "age": 27, "height_cm": 181, "weight_kg": 77,
         "minutes_last_30d": 610, "matches_last_30d": 7, "sprint_distance_km": 11.2,
         "total_distance_km": 88.4, "travel_km_last_30d": 2100, "previous_injuries": 2,
         "days_since_last_injury": 45, "muscle_fatigue_index": 0.81, "sleep_quality": 6.1,
         "injury_next_30d": true}
    ]"#;
    std::fs::write(&path, raw).expect("write fixture");

    let batch = load_players(&path).expect("batch loads");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].name, "Ion");
    assert_eq!(batch[0].injury_next_30d, Some(1));
    assert_eq!(batch[0].sprint_distance_km, 11.2);
}

#[test]
fn missing_required_column_is_a_schema_error() {
    let err = parse_players_json(r#"[{"player_id": 1, "name": "Ana"}]"#).unwrap_err();
    assert!(matches!(err, RiskError::Schema { .. }), "{err}");
}

#[test]
fn unsupported_extension_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("players.parquet");
    std::fs::write(&path, b"").expect("write fixture");
    assert!(load_players(&path).is_err());
}
