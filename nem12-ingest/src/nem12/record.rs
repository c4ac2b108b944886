//! NEM12 record discriminators and fixed field positions.
//!
//! Only the `200`, `300` and `400` records are interpreted. Everything else
//! (`100` header, `500` B2B details, `900` end of data, ...) is skipped.

use std::fmt;

pub const NMI_DATA_DETAILS: &str = "200";
pub const INTERVAL_DATA: &str = "300";
pub const INTERVAL_EVENT: &str = "400";

/// `200` record field positions.
pub mod header {
    pub const NMI: usize = 1;
    pub const REGISTER_CONFIG: usize = 2;
    pub const REGISTER: usize = 3;
    pub const METER: usize = 6;
    pub const UOM: usize = 7;
    pub const INTERVAL_LENGTH: usize = 8;
}

/// `300` record field positions. Values occupy `[FIRST_VALUE, FIRST_VALUE + n)`
/// and the quality method follows at `FIRST_VALUE + n`.
pub mod interval {
    pub const DATE: usize = 1;
    pub const FIRST_VALUE: usize = 2;

    pub fn quality(interval_count: usize) -> usize {
        FIRST_VALUE + interval_count
    }
}

/// Consumption channels start with this register prefix.
pub const CONSUMPTION_PREFIX: char = 'E';
/// Generation channels start with this register prefix.
pub const GENERATION_PREFIX: char = 'B';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    NmiDataDetails,
    IntervalData,
    IntervalEvent,
    Other,
}

impl RecordType {
    pub fn from_discriminator(field: &str) -> Self {
        match field {
            NMI_DATA_DETAILS => Self::NmiDataDetails,
            INTERVAL_DATA => Self::IntervalData,
            INTERVAL_EVENT => Self::IntervalEvent,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NmiDataDetails => NMI_DATA_DETAILS,
            Self::IntervalData => INTERVAL_DATA,
            Self::IntervalEvent => INTERVAL_EVENT,
            Self::Other => "other",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminators_map_to_record_types() {
        assert_eq!(RecordType::from_discriminator("200"), RecordType::NmiDataDetails);
        assert_eq!(RecordType::from_discriminator("300"), RecordType::IntervalData);
        assert_eq!(RecordType::from_discriminator("400"), RecordType::IntervalEvent);
        assert_eq!(RecordType::from_discriminator("500"), RecordType::Other);
        assert_eq!(RecordType::from_discriminator(" 200"), RecordType::Other);
    }

    #[test]
    fn quality_follows_last_value() {
        assert_eq!(interval::quality(48), 50);
        assert_eq!(interval::quality(96), 98);
    }
}
