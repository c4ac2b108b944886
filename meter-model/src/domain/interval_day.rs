use time::Date;

use crate::domain::RegisterKey;

/// Identity of an interval day: owning register plus calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DayKey {
    pub register: RegisterKey,
    pub interval_date: Date,
}

/// A `300` (interval data) record.
///
/// `register` refers back to the owning [`crate::domain::MeterRegister`] by
/// identity; the register owns the day.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntervalDay {
    pub register: RegisterKey,
    pub interval_date: Date,
    pub quality: String,
    pub interval_values: Vec<f64>,
    pub variable_qualities: Vec<VariableQuality>,
    pub line_items: Vec<String>,
}

impl IntervalDay {
    pub fn key(&self) -> DayKey {
        DayKey {
            register: self.register.clone(),
            interval_date: self.interval_date,
        }
    }

    pub fn is_same_day(&self, other: &IntervalDay) -> bool {
        self.register == other.register && self.interval_date == other.interval_date
    }
}

/// A `400` (interval event) record, kept as an opaque line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariableQuality {
    pub day: DayKey,
    /// All fields joined without a separator; the dedup key within a day.
    pub line_str: String,
    pub line_items: Vec<String>,
}

impl VariableQuality {
    pub fn new(day: DayKey, line_items: Vec<String>) -> Self {
        let line_str = line_items.concat();
        Self {
            day,
            line_str,
            line_items,
        }
    }

    pub fn is_same_note(&self, other: &VariableQuality) -> bool {
        self.day == other.day && self.line_str == other.line_str
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn key(register: &str) -> RegisterKey {
        RegisterKey {
            nmi: "6408091979".to_string(),
            meter: "123456".to_string(),
            register: register.to_string(),
            register_config: "E1B1".to_string(),
        }
    }

    fn day(register: &str, quality: &str) -> IntervalDay {
        IntervalDay {
            register: key(register),
            interval_date: date!(2019 - 03 - 31),
            quality: quality.to_string(),
            interval_values: vec![1.0; 48],
            variable_qualities: Vec::new(),
            line_items: Vec::new(),
        }
    }

    #[test]
    fn same_day_ignores_quality_and_values() {
        let mut other = day("E1", "S");
        other.interval_values = vec![2.0; 48];
        assert!(day("E1", "A").is_same_day(&other));
        assert!(!day("E1", "A").is_same_day(&day("B1", "A")));
    }

    #[test]
    fn variable_quality_key_is_concatenated_line() {
        let fields: Vec<String> = ["400", "1", "48", "F14", "76", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let note = VariableQuality::new(day("E1", "V").key(), fields);
        assert_eq!(note.line_str, "400148F1476");

        let again = VariableQuality::new(
            day("E1", "V").key(),
            vec!["400148".to_string(), "F1476".to_string()],
        );
        assert!(note.is_same_note(&again));
    }
}
