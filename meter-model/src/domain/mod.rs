pub mod interval_day;
pub mod meter_register;
pub mod usage;

pub use interval_day::{DayKey, IntervalDay, VariableQuality};
pub use meter_register::{interval_count_for, MeterRegister, RegisterKey, MINUTES_PER_DAY, UOM_KWH};
pub use usage::{DailyUsage, IntervalRow, IntervalTotal};
