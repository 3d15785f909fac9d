use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};

pub const LABEL_COLUMN: &str = "injury_next_30d";

/// Columns every ingested batch must carry. The label is optional.
pub const REQUIRED_COLUMNS: [&str; 17] = [
    "player_id",
    "name",
    "team",
    "position",
    "dominant_foot",
    "age",
    "height_cm",
    "weight_kg",
    "minutes_last_30d",
    "matches_last_30d",
    "sprint_distance_km",
    "total_distance_km",
    "travel_km_last_30d",
    "previous_injuries",
    "days_since_last_injury",
    "muscle_fatigue_index",
    "sleep_quality",
];

pub const TEXT_COLUMNS: [&str; 4] = ["name", "team", "position", "dominant_foot"];

pub const COUNT_COLUMNS: [&str; 5] = [
    "age",
    "matches_last_30d",
    "previous_injuries",
    "days_since_last_injury",
    "player_id",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: u64,
    pub name: String,
    pub team: String,
    pub position: String,
    pub dominant_foot: String,
    pub age: u32,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub minutes_last_30d: f64,
    pub matches_last_30d: u32,
    pub sprint_distance_km: f64,
    pub total_distance_km: f64,
    pub travel_km_last_30d: f64,
    pub previous_injuries: u32,
    pub days_since_last_injury: u32,
    pub muscle_fatigue_index: f64,
    pub sleep_quality: f64,
    #[serde(default)]
    pub injury_next_30d: Option<u8>,
    // Columns ingestion saw beyond the fixed schema.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_numeric: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_text: BTreeMap<String, String>,
}

impl PlayerRecord {
    /// Raw numeric column by name. `Ok(None)` means the column is known but the
    /// value is absent on this record (only possible for extras).
    pub fn numeric(&self, column: &str) -> Result<Option<f64>> {
        let value = match column {
            "player_id" => self.player_id as f64,
            "age" => self.age as f64,
            "height_cm" => self.height_cm,
            "weight_kg" => self.weight_kg,
            "minutes_last_30d" => self.minutes_last_30d,
            "matches_last_30d" => self.matches_last_30d as f64,
            "sprint_distance_km" => self.sprint_distance_km,
            "total_distance_km" => self.total_distance_km,
            "travel_km_last_30d" => self.travel_km_last_30d,
            "previous_injuries" => self.previous_injuries as f64,
            "days_since_last_injury" => self.days_since_last_injury as f64,
            "muscle_fatigue_index" => self.muscle_fatigue_index,
            "sleep_quality" => self.sleep_quality,
            LABEL_COLUMN => return Ok(self.injury_next_30d.map(f64::from)),
            other => {
                if let Some(v) = self.extra_numeric.get(other) {
                    return Ok(Some(*v).filter(|v| v.is_finite()));
                }
                if TEXT_COLUMNS.contains(&other) || self.extra_text.contains_key(other) {
                    return Err(RiskError::schema(other, "expected a numeric column"));
                }
                return Err(RiskError::missing_column(other));
            }
        };
        Ok(Some(value).filter(|v| v.is_finite()))
    }

    pub fn categorical(&self, column: &str) -> Result<&str> {
        match column {
            "name" => Ok(&self.name),
            "team" => Ok(&self.team),
            "position" => Ok(&self.position),
            "dominant_foot" => Ok(&self.dominant_foot),
            other => self
                .extra_text
                .get(other)
                .map(String::as_str)
                .ok_or_else(|| RiskError::missing_column(other)),
        }
    }

    /// Binary label for `target`. Errors when the column is unknown, the value
    /// is absent, or it is not 0/1.
    pub fn label(&self, target: &str) -> Result<u8> {
        let raw = self.numeric(target)?.ok_or_else(|| {
            RiskError::schema(
                target,
                format!("label missing for player {}", self.player_id),
            )
        })?;
        if raw == 0.0 {
            Ok(0)
        } else if raw == 1.0 {
            Ok(1)
        } else {
            Err(RiskError::schema(
                target,
                format!("label must be 0 or 1, got {raw} for player {}", self.player_id),
            ))
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_record(player_id: u64) -> PlayerRecord {
    PlayerRecord {
        player_id,
        name: format!("Player {player_id}"),
        team: "FC Carpathia".to_string(),
        position: "Midfielder".to_string(),
        dominant_foot: "Right".to_string(),
        age: 24,
        height_cm: 180.0,
        weight_kg: 75.0,
        minutes_last_30d: 540.0,
        matches_last_30d: 6,
        sprint_distance_km: 9.0,
        total_distance_km: 75.0,
        travel_km_last_30d: 1200.0,
        previous_injuries: 1,
        days_since_last_injury: 120,
        muscle_fatigue_index: 0.5,
        sleep_quality: 7.0,
        injury_next_30d: Some(0),
        extra_numeric: BTreeMap::new(),
        extra_text: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_lookup_covers_counts_and_extras() {
        let mut r = sample_record(7);
        r.extra_numeric.insert("hsr_km".to_string(), 4.5);
        assert_eq!(r.numeric("age").expect("known column"), Some(24.0));
        assert_eq!(r.numeric("hsr_km").expect("known column"), Some(4.5));
        assert!(matches!(
            r.numeric("position"),
            Err(RiskError::Schema { .. })
        ));
        assert!(matches!(r.numeric("nope"), Err(RiskError::Schema { .. })));
    }

    #[test]
    fn label_rejects_non_binary_values() {
        let mut r = sample_record(1);
        assert_eq!(r.label(LABEL_COLUMN).expect("binary label"), 0);
        r.injury_next_30d = None;
        assert!(r.label(LABEL_COLUMN).is_err());
        r.extra_numeric.insert("grade".to_string(), 2.0);
        assert!(r.label("grade").is_err());
    }
}
