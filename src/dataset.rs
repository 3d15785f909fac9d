use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, anyhow};
use serde_json::Value;

use crate::error::{Result, RiskError};
use crate::record::{COUNT_COLUMNS, LABEL_COLUMN, PlayerRecord, REQUIRED_COLUMNS};

// Largest id an f64 cell still holds exactly.
const MAX_EXACT_ID: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    // Parsed value plus the source text, which text columns keep verbatim.
    Num(f64, String),
    Text(String),
    Empty,
}

impl Cell {
    fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(v) => Cell::Num(v, trimmed.to_string()),
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Empty,
            Value::Bool(b) => Cell::Num(if *b { 1.0 } else { 0.0 }, b.to_string()),
            Value::Number(n) => n
                .as_f64()
                .map(|v| Cell::Num(v, n.to_string()))
                .unwrap_or(Cell::Empty),
            Value::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Cell::Num(_, raw) => Some(raw.clone()),
            Cell::Text(s) => Some(s.clone()),
            Cell::Empty => None,
        }
    }
}

pub fn load_players(path: &Path) -> anyhow::Result<Vec<PlayerRecord>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => {
            let file =
                fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
            parse_players_csv(file).with_context(|| format!("parse {}", path.display()))
        }
        "json" => {
            let raw =
                fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            parse_players_json(&raw).with_context(|| format!("parse {}", path.display()))
        }
        _ => Err(anyhow!(
            "unsupported batch format for {} (expected .csv or .json)",
            path.display()
        )),
    }
}

pub fn parse_players_csv<R: Read>(reader: R) -> Result<Vec<PlayerRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| RiskError::schema("<header>", err.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    check_header(&headers)?;

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result
            .map_err(|err| RiskError::schema("<row>", format!("row {}: {err}", idx + 1)))?;
        let cells: HashMap<&str, Cell> = headers
            .iter()
            .map(String::as_str)
            .zip(record.iter().map(Cell::from_raw))
            .collect();
        rows.push(cells);
    }
    build_batch(&headers, rows)
}

pub fn parse_players_json(raw: &str) -> Result<Vec<PlayerRecord>> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| RiskError::schema("<document>", err.to_string()))?;
    let Value::Array(items) = value else {
        return Err(RiskError::schema("<document>", "expected an array of player objects"));
    };

    let mut headers: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let Value::Object(obj) = item else {
            return Err(RiskError::schema("<row>", format!("row {} is not an object", idx + 1)));
        };
        for key in obj.keys() {
            if !headers.iter().any(|h| h == key) {
                headers.push(key.clone());
            }
        }
        rows.push(obj);
    }
    check_header(&headers)?;

    let rows = rows
        .into_iter()
        .map(|obj| {
            headers
                .iter()
                .map(|h| {
                    let cell = obj.get(h).map(Cell::from_json).unwrap_or(Cell::Empty);
                    (h.as_str(), cell)
                })
                .collect::<HashMap<&str, Cell>>()
        })
        .collect();
    build_batch(&headers, rows)
}

fn check_header(headers: &[String]) -> Result<()> {
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(RiskError::missing_column(column));
        }
    }
    Ok(())
}

fn build_batch(headers: &[String], rows: Vec<HashMap<&str, Cell>>) -> Result<Vec<PlayerRecord>> {
    let extras: Vec<&str> = headers
        .iter()
        .map(String::as_str)
        .filter(|h| !REQUIRED_COLUMNS.contains(h) && *h != LABEL_COLUMN)
        .collect();
    // An extra column is numeric when every non-empty value parses.
    let numeric_extras: Vec<&str> = extras
        .iter()
        .copied()
        .filter(|col| {
            rows.iter()
                .all(|row| matches!(row.get(col), Some(Cell::Num(..)) | Some(Cell::Empty) | None))
        })
        .collect();

    rows.iter()
        .enumerate()
        .map(|(idx, row)| build_record(idx + 1, row, &extras, &numeric_extras))
        .collect()
}

fn build_record(
    row_no: usize,
    row: &HashMap<&str, Cell>,
    extras: &[&str],
    numeric_extras: &[&str],
) -> Result<PlayerRecord> {
    let num = |column: &str| -> Result<f64> {
        match row.get(column) {
            Some(Cell::Num(v, _)) if v.is_finite() => {
                if COUNT_COLUMNS.contains(&column) {
                    let max = if column == "player_id" {
                        MAX_EXACT_ID
                    } else {
                        f64::from(u32::MAX)
                    };
                    if v.fract() != 0.0 || *v < 0.0 || *v > max {
                        return Err(RiskError::schema(
                            column,
                            format!(
                                "row {row_no}: expected a non-negative integer up to {max}, got {v}"
                            ),
                        ));
                    }
                }
                Ok(*v)
            }
            Some(Cell::Empty) | None => Err(RiskError::schema(
                column,
                format!("row {row_no}: value is empty"),
            )),
            Some(other) => Err(RiskError::schema(
                column,
                format!("row {row_no}: expected a number, got {other:?}"),
            )),
        }
    };
    let text = |column: &str| -> Result<String> {
        row.get(column)
            .and_then(Cell::as_text)
            .ok_or_else(|| RiskError::schema(column, format!("row {row_no}: value is empty")))
    };
    let count = |column: &str| -> Result<u32> { num(column).map(|v| v as u32) };

    let injury_next_30d = match row.get(LABEL_COLUMN) {
        None | Some(Cell::Empty) => None,
        Some(Cell::Num(v, _)) if *v == 0.0 || *v == 1.0 => Some(*v as u8),
        Some(Cell::Text(s)) if s.eq_ignore_ascii_case("true") => Some(1),
        Some(Cell::Text(s)) if s.eq_ignore_ascii_case("false") => Some(0),
        Some(other) => {
            return Err(RiskError::schema(
                LABEL_COLUMN,
                format!("row {row_no}: expected 0/1, got {other:?}"),
            ));
        }
    };

    let mut extra_numeric = BTreeMap::new();
    let mut extra_text = BTreeMap::new();
    for &column in extras {
        let Some(cell) = row.get(column) else {
            continue;
        };
        match cell {
            Cell::Num(v, _) if numeric_extras.contains(&column) => {
                extra_numeric.insert(column.to_string(), *v);
            }
            Cell::Empty => {}
            other => {
                if let Some(s) = other.as_text() {
                    extra_text.insert(column.to_string(), s);
                }
            }
        }
    }

    Ok(PlayerRecord {
        player_id: num("player_id")? as u64,
        name: text("name")?,
        team: text("team")?,
        position: text("position")?,
        dominant_foot: text("dominant_foot")?,
        age: count("age")?,
        height_cm: num("height_cm")?,
        weight_kg: num("weight_kg")?,
        minutes_last_30d: num("minutes_last_30d")?,
        matches_last_30d: count("matches_last_30d")?,
        sprint_distance_km: num("sprint_distance_km")?,
        total_distance_km: num("total_distance_km")?,
        travel_km_last_30d: num("travel_km_last_30d")?,
        previous_injuries: count("previous_injuries")?,
        days_since_last_injury: count("days_since_last_injury")?,
        muscle_fatigue_index: num("muscle_fatigue_index")?,
        sleep_quality: num("sleep_quality")?,
        injury_next_30d,
        extra_numeric,
        extra_text,
    })
}

/// Writes the fixed-schema columns (and the label when any record has one).
pub fn write_players_csv(path: &Path, batch: &[PlayerRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    let with_label = batch.iter().any(|r| r.injury_next_30d.is_some());

    let mut header: Vec<&str> = REQUIRED_COLUMNS.to_vec();
    if with_label {
        header.push(LABEL_COLUMN);
    }
    writer.write_record(&header).context("write csv header")?;

    for r in batch {
        let mut row = vec![
            r.player_id.to_string(),
            r.name.clone(),
            r.team.clone(),
            r.position.clone(),
            r.dominant_foot.clone(),
            r.age.to_string(),
            r.height_cm.to_string(),
            r.weight_kg.to_string(),
            r.minutes_last_30d.to_string(),
            r.matches_last_30d.to_string(),
            r.sprint_distance_km.to_string(),
            r.total_distance_km.to_string(),
            r.travel_km_last_30d.to_string(),
            r.previous_injuries.to_string(),
            r.days_since_last_injury.to_string(),
            r.muscle_fatigue_index.to_string(),
            r.sleep_quality.to_string(),
        ];
        if with_label {
            row.push(r.injury_next_30d.map(|v| v.to_string()).unwrap_or_default());
        }
        writer
            .write_record(&row)
            .with_context(|| format!("write player {}", r.player_id))?;
    }
    writer.flush().context("flush csv")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "player_id,name,team,position,dominant_foot,age,height_cm,weight_kg,minutes_last_30d,matches_last_30d,sprint_distance_km,total_distance_km,travel_km_last_30d,previous_injuries,days_since_last_injury,muscle_fatigue_index,sleep_quality";

    #[test]
    fn csv_row_parses_with_label_and_extras() {
        let raw = format!(
            "{HEADER},injury_next_30d,gps_unit,hsr_km\n1,Ana,FC Carpathia,Defender,Left,22,178,72,450,5,8.5,80.2,900,1,60,0.55,7.2,1,A7,3.4\n"
        );
        let batch = parse_players_csv(raw.as_bytes()).expect("valid csv");
        assert_eq!(batch.len(), 1);
        let r = &batch[0];
        assert_eq!(r.position, "Defender");
        assert_eq!(r.matches_last_30d, 5);
        assert_eq!(r.injury_next_30d, Some(1));
        assert_eq!(r.extra_text.get("gps_unit").map(String::as_str), Some("A7"));
        assert_eq!(r.extra_numeric.get("hsr_km"), Some(&3.4));
    }

    #[test]
    fn missing_required_column_is_named() {
        let raw = HEADER.replace(",sleep_quality", "") + "\n";
        let err = parse_players_csv(raw.as_bytes()).unwrap_err();
        assert_eq!(err, RiskError::missing_column("sleep_quality"));
    }

    #[test]
    fn wrong_type_reports_row_and_column() {
        let raw = format!(
            "{HEADER}\n1,Ana,FC Carpathia,Defender,Left,22,178,72,lots,5,8.5,80.2,900,1,60,0.55,7.2\n"
        );
        match parse_players_csv(raw.as_bytes()).unwrap_err() {
            RiskError::Schema { column, reason } => {
                assert_eq!(column, "minutes_last_30d");
                assert!(reason.contains("row 1"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn numeric_looking_text_is_kept_verbatim() {
        let raw = format!(
            "{HEADER},kit_code\n1,007,1.50,10,Left,22,178,72,450,5,8.5,80.2,900,1,60,0.55,7.2,01\n2,Bo,1,10,Right,23,180,75,400,4,7.0,70.0,800,0,90,0.5,7.0,B2\n"
        );
        let batch = parse_players_csv(raw.as_bytes()).expect("valid csv");
        assert_eq!(batch[0].name, "007");
        assert_eq!(batch[0].team, "1.50");
        assert_eq!(batch[0].position, "10");
        assert_eq!(batch[1].team, "1");
        assert_eq!(
            batch[0].extra_text.get("kit_code").map(String::as_str),
            Some("01")
        );
    }

    #[test]
    fn out_of_range_counts_are_rejected() {
        let raw = format!(
            "{HEADER}\n1,Ana,FC Carpathia,Defender,Left,22,178,72,450,5,8.5,80.2,900,1,4294967296,0.55,7.2\n"
        );
        assert!(matches!(
            parse_players_csv(raw.as_bytes()),
            Err(RiskError::Schema { ref column, .. }) if column == "days_since_last_injury"
        ));

        let raw = format!(
            "{HEADER}\n9007199254740993000,Ana,FC Carpathia,Defender,Left,22,178,72,450,5,8.5,80.2,900,1,60,0.55,7.2\n"
        );
        assert!(matches!(
            parse_players_csv(raw.as_bytes()),
            Err(RiskError::Schema { ref column, .. }) if column == "player_id"
        ));
    }

    #[test]
    fn fractional_match_count_is_rejected() {
        let raw = format!(
            "{HEADER}\n1,Ana,FC Carpathia,Defender,Left,22,178,72,450,5.5,8.5,80.2,900,1,60,0.55,7.2\n"
        );
        assert!(matches!(
            parse_players_csv(raw.as_bytes()),
            Err(RiskError::Schema { ref column, .. }) if column == "matches_last_30d"
        ));
    }
}
