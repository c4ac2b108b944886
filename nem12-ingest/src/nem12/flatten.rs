use meter_model::domain::{IntervalDay, IntervalRow, MeterRegister, UOM_KWH};

use crate::nem12::{
    error::Nem12Error,
    parser::ParseSession,
    record::{CONSUMPTION_PREFIX, GENERATION_PREFIX},
};

/// Interval length the daily aggregation is defined for.
pub const SUPPORTED_INTERVAL_LENGTH: u32 = 30;

/// Reject registers whose unit or interval length the aggregation does not handle.
pub fn check_register(register: &MeterRegister) -> Result<(), Nem12Error> {
    let contract_error = |detail: String| Nem12Error::UnitContract {
        nmi: register.nmi.clone(),
        meter: register.meter.clone(),
        register: register.register.clone(),
        detail,
    };

    if register.uom != UOM_KWH {
        return Err(contract_error(format!(
            "unit of measure '{}', expected {UOM_KWH}",
            register.uom
        )));
    }
    if register.interval_length != SUPPORTED_INTERVAL_LENGTH {
        return Err(contract_error(format!(
            "interval length {}, expected {SUPPORTED_INTERVAL_LENGTH}",
            register.interval_length
        )));
    }
    Ok(())
}

/// Split a reading by channel: `E` registers are consumption, `B` registers
/// generation, anything else counts towards neither.
pub fn split_channel(register: &str, value: f64) -> (f64, f64) {
    let consumption = if register.starts_with(CONSUMPTION_PREFIX) { value } else { 0.0 };
    let generation = if register.starts_with(GENERATION_PREFIX) { value } else { 0.0 };
    (consumption, generation)
}

/// One row per (register, day, interval), lazily.
///
/// Every register is checked up front, so either the whole session flattens or
/// nothing does.
pub fn flatten(session: &ParseSession) -> Result<impl Iterator<Item = IntervalRow> + '_, Nem12Error> {
    for register in session.registers() {
        check_register(register)?;
    }

    Ok(session.registers().iter().flat_map(|register| {
        register
            .interval_days
            .iter()
            .flat_map(move |day| day_rows(register, day))
    }))
}

fn day_rows<'a>(register: &'a MeterRegister, day: &'a IntervalDay) -> impl Iterator<Item = IntervalRow> + 'a {
    day.interval_values.iter().enumerate().map(move |(i, &value)| {
        let (consumption, generation) = split_channel(&register.register, value);
        IntervalRow {
            nmi: register.nmi.clone(),
            meter: register.meter.clone(),
            register: register.register.clone(),
            interval_date: day.interval_date,
            quality: day.quality.clone(),
            interval_length: register.interval_length,
            uom: register.uom.clone(),
            interval: (i + 1) as u32,
            consumption,
            generation,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nem12::parser::{fixtures::*, parse_sources};

    fn session(text: &str) -> ParseSession {
        parse_sources([("test.csv", text.as_bytes())]).expect("parse")
    }

    #[test]
    fn yields_48_rows_per_register_day() {
        let s = session(&lines(&[
            header(NMI, "E1", "30"),
            day("20190331", "1.0", 48, "A"),
            day("20190401", "1.5", 48, "A"),
            header(NMI, "B1", "30"),
            day("20190331", "-1.0", 48, "A"),
        ]));

        let rows: Vec<IntervalRow> = flatten(&s).expect("flatten").collect();
        assert_eq!(rows.len(), 3 * 48);

        let first = &rows[0];
        assert_eq!(first.interval, 1);
        assert_eq!(first.register, "E1");
        assert_eq!(first.meter, "123456");
        assert_eq!(first.consumption, 1.0);
        assert_eq!(first.generation, 0.0);
        assert_eq!(rows[47].interval, 48);

        let generation = &rows[2 * 48 + 5];
        assert_eq!(generation.register, "B1");
        assert_eq!(generation.interval, 6);
        assert_eq!(generation.consumption, 0.0);
        assert_eq!(generation.generation, -1.0);
    }

    #[test]
    fn other_channels_contribute_nothing() {
        assert_eq!(split_channel("E1", 2.0), (2.0, 0.0));
        assert_eq!(split_channel("B1", 2.0), (0.0, 2.0));
        assert_eq!(split_channel("Q1", 2.0), (0.0, 0.0));
        assert_eq!(split_channel("K1", 2.0), (0.0, 0.0));
    }

    #[test]
    fn rejects_non_kwh_registers() {
        let s = session(&lines(&[
            "200,6408091979,E1Q1,Q1,Q1,N1,123456,KVARH,30,".to_string(),
            day("20190331", "1.0", 48, "A"),
        ]));
        let err = flatten(&s).err().expect("contract error");
        assert!(matches!(err, Nem12Error::UnitContract { .. }));
        assert!(err.to_string().contains("KVARH"));
    }

    #[test]
    fn rejects_non_30_minute_registers() {
        let s = session(&lines(&[
            header(NMI, "E1", "30"),
            day("20190331", "1.0", 48, "A"),
            header(NMI, "B1", "15"),
            day("20190331", "1.0", 96, "A"),
        ]));
        let err = flatten(&s).err().expect("contract error");
        assert!(!err.is_parse_error());
        assert!(err.to_string().contains("interval length 15"));
    }
}
