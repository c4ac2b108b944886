use crate::domain::IntervalDay;

pub const MINUTES_PER_DAY: u32 = 1440;

/// Canonical unit of measure assumed by the aggregation formulas.
pub const UOM_KWH: &str = "KWH";

/// Identity of a meter register: the same NMI, meter, register and
/// configuration seen in different files is the same register.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterKey {
    pub nmi: String,
    pub meter: String,
    pub register: String,
    pub register_config: String,
}

/// A `200` (NMI data details) record and the interval days recorded under it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeterRegister {
    pub nmi: String,
    pub meter: String,
    pub register: String,
    pub register_config: String,
    pub uom: String,
    pub interval_length: u32,
    pub interval_days: Vec<IntervalDay>,
    /// Original fields, re-emitted verbatim by the merge writer.
    pub line_items: Vec<String>,
}

impl MeterRegister {
    pub fn key(&self) -> RegisterKey {
        RegisterKey {
            nmi: self.nmi.clone(),
            meter: self.meter.clone(),
            register: self.register.clone(),
            register_config: self.register_config.clone(),
        }
    }

    /// Identity comparison; ignores uom, interval length and children.
    pub fn is_same_register(&self, other: &MeterRegister) -> bool {
        self.nmi == other.nmi
            && self.meter == other.meter
            && self.register == other.register
            && self.register_config == other.register_config
    }

    /// Number of interval values per day implied by the interval length.
    ///
    /// Returns `None` when the length does not evenly divide a day.
    pub fn interval_count(&self) -> Option<usize> {
        interval_count_for(self.interval_length)
    }
}

pub fn interval_count_for(interval_length: u32) -> Option<usize> {
    if interval_length == 0 || MINUTES_PER_DAY % interval_length != 0 {
        None
    } else {
        Some((MINUTES_PER_DAY / interval_length) as usize)
    }
}
