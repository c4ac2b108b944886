use time::Date;

/// One interval of one register on one day, with the value split into
/// consumption and generation by channel prefix.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntervalRow {
    pub nmi: String,
    pub meter: String,
    pub register: String,
    pub interval_date: Date,
    pub quality: String,
    pub interval_length: u32,
    pub uom: String,
    /// 1-based.
    pub interval: u32,
    pub consumption: f64,
    pub generation: f64,
}

/// Sum over all registers of an NMI for one (date, interval).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntervalTotal {
    pub nmi: String,
    pub interval_date: Date,
    pub interval: u32,
    pub consumption: f64,
    /// Absolute value of the summed generation channels.
    pub generation: f64,
    pub quality: String,
    pub interval_length: u32,
    pub uom: String,
}

/// Per-day unit handed to the storage sink.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DailyUsage {
    pub nmi: String,
    pub interval_date: Date,
    pub interval_length: u32,
    pub uom: String,
    /// Ordered by interval index.
    pub consumptions: Vec<f64>,
    pub generations: Vec<f64>,
    pub qualities: Vec<String>,
    /// Whether the day carries the full interval count for its length.
    pub complete: bool,
}

impl DailyUsage {
    pub fn year(&self) -> i32 {
        self.interval_date.year()
    }

    pub fn interval_count(&self) -> usize {
        self.consumptions.len()
    }
}
