use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A microplate as served by `/api/plates`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Unique barcode; dispense requests address plates by it
    pub barcode: String,

    pub rows: u32,
    pub columns: u32,

    /// Free-form plate format label (e.g. "96-well")
    #[serde(default)]
    pub plate_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<NaiveDateTime>,

    /// Embedded wells, only present on some responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wells: Option<Vec<Well>>,
}

impl Plate {
    pub fn new(barcode: impl Into<String>, rows: u32, columns: u32) -> Self {
        Self {
            id: None,
            barcode: barcode.into(),
            rows,
            columns,
            plate_type: String::new(),
            created_date: None,
            wells: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_plate_type(mut self, plate_type: impl Into<String>) -> Self {
        self.plate_type = plate_type.into();
        self
    }

    /// Whether `position` addresses a well inside this plate's grid
    pub fn contains_position(&self, position: &str) -> bool {
        match parse_position(position) {
            Some((row, column)) => row < self.rows && column >= 1 && column <= self.columns,
            None => false,
        }
    }
}

/// A single well and its cached volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Well {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Row letter followed by column number, e.g. "A1"
    pub position: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate_id: Option<i64>,

    /// Current volume; the backend sends null for an untouched well
    #[serde(default)]
    pub volume: Option<f64>,

    pub max_volume: f64,
}

impl Well {
    pub fn new(position: impl Into<String>, max_volume: f64) -> Self {
        Self {
            id: None,
            position: position.into(),
            plate_id: None,
            volume: None,
            max_volume,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn current_volume(&self) -> f64 {
        self.volume.unwrap_or(0.0)
    }

    /// Remaining capacity (`maxVolume - currentVolume`), never negative
    pub fn available_volume(&self) -> f64 {
        (self.max_volume - self.current_volume()).max(0.0)
    }

    /// Fill ratio in `[0, 1]`
    pub fn fill_ratio(&self) -> f64 {
        if self.max_volume <= 0.0 {
            return 0.0;
        }
        (self.current_volume() / self.max_volume).clamp(0.0, 1.0)
    }

    /// Overwrite the cached volume, clamped into `[0, maxVolume]`.
    ///
    /// Returns the value actually stored.
    pub fn apply_volume(&mut self, volume: f64) -> f64 {
        let clamped = if volume.is_finite() {
            volume.clamp(0.0, self.max_volume.max(0.0))
        } else {
            self.current_volume()
        };
        self.volume = Some(clamped);
        clamped
    }
}

/// Split a well label into a zero-based row index and a one-based column.
///
/// Accepts one or more row letters (A..Z, AA..) followed by a column number.
pub fn parse_position(position: &str) -> Option<(u32, u32)> {
    let position = position.trim();
    let split = position.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = position.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }

    let mut row: u32 = 0;
    for c in letters.chars() {
        row = row.checked_mul(26)?.checked_add(c as u32 - 'A' as u32 + 1)?;
    }
    let column: u32 = digits.parse().ok()?;

    Some((row - 1, column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_volume_untouched_well() {
        let well = Well::new("A1", 200.0);
        assert_eq!(well.available_volume(), 200.0);
        assert_eq!(well.fill_ratio(), 0.0);
    }

    #[test]
    fn test_apply_volume_clamps_to_capacity() {
        let mut well = Well::new("B3", 100.0).with_volume(40.0);

        assert_eq!(well.apply_volume(150.0), 100.0);
        assert_eq!(well.current_volume(), 100.0);
        assert_eq!(well.available_volume(), 0.0);

        assert_eq!(well.apply_volume(-5.0), 0.0);
    }

    #[test]
    fn test_apply_volume_ignores_nan() {
        let mut well = Well::new("C1", 100.0).with_volume(25.0);
        assert_eq!(well.apply_volume(f64::NAN), 25.0);
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position("A1"), Some((0, 1)));
        assert_eq!(parse_position("H12"), Some((7, 12)));
        assert_eq!(parse_position("AA3"), Some((26, 3)));
        assert_eq!(parse_position("a1"), None);
        assert_eq!(parse_position("12"), None);
        assert_eq!(parse_position("B"), None);
    }

    #[test]
    fn test_plate_contains_position() {
        let plate = Plate::new("PLATE-001", 8, 12);
        assert!(plate.contains_position("A1"));
        assert!(plate.contains_position("H12"));
        assert!(!plate.contains_position("I1"));
        assert!(!plate.contains_position("A13"));
        assert!(!plate.contains_position("A0"));
    }

    #[test]
    fn test_well_deserializes_null_volume() {
        let well: Well =
            serde_json::from_str(r#"{"id":7,"position":"A1","plateId":1,"volume":null,"maxVolume":200.0}"#)
                .unwrap();
        assert_eq!(well.id, Some(7));
        assert_eq!(well.volume, None);
        assert_eq!(well.max_volume, 200.0);
    }
}
