use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::Read,
    path::Path,
};

use csv::StringRecord;
use meter_model::domain::{
    interval_count_for, IntervalDay, MeterRegister, RegisterKey, VariableQuality,
};
use time::{format_description::BorrowedFormatItem, macros::format_description, Date};

use crate::nem12::{
    error::{Location, Nem12Error},
    record::{header, interval, RecordType},
};

const INTERVAL_DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year][month][day]");

/// Registers recovered from one or more NEM12 sources, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseSession {
    registers: Vec<MeterRegister>,
}

impl ParseSession {
    pub fn registers(&self) -> &[MeterRegister] {
        &self.registers
    }

    pub fn into_registers(self) -> Vec<MeterRegister> {
        self.registers
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Distinct NMIs in the order their first register was seen.
    pub fn nmis(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.registers
            .iter()
            .map(|r| r.nmi.as_str())
            .filter(|nmi| seen.insert(*nmi))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub records: u64,
    pub registers: u64,
    pub interval_days: u64,
    pub duplicate_days: u64,
    pub variable_qualities: u64,
    pub duplicate_variable_qualities: u64,
    pub skipped: u64,
}

/// Parse position: the register and day that child records attach to.
///
/// Lives for the whole session, so a source may continue the register or day
/// left open by the previous one.
#[derive(Debug, Default)]
struct Cursor {
    register: Option<usize>,
    day: Option<(usize, usize)>,
}

/// Incremental NEM12 parser.
///
/// Feed it any number of sources with [`Nem12Parser::parse_reader`]; records
/// sharing an identity across sources are merged first-wins. Only `200`, `300`
/// and `400` records are interpreted.
#[derive(Debug, Default)]
pub struct Nem12Parser {
    registers: Vec<MeterRegister>,
    interval_counts: Vec<usize>,
    register_index: HashMap<RegisterKey, usize>,
    day_index: HashMap<(usize, Date), usize>,
    note_index: HashSet<(usize, usize, String)>,
    cursor: Cursor,
    stats: ParseStats,
}

impl Nem12Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    pub fn parse_reader<R: Read>(&mut self, source_name: &str, reader: R) -> Result<(), Nem12Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut record = StringRecord::new();

        loop {
            let more = rdr.read_record(&mut record).map_err(|error| Nem12Error::Read {
                source_name: source_name.to_string(),
                error,
            })?;
            if !more {
                break;
            }

            let location = Location {
                source: source_name.to_string(),
                line: record.position().map(|p| p.line()).unwrap_or(0),
            };

            if let Err(e) = self.process_record(&record, &location) {
                metrics::counter!("nem12_parse_errors_total").increment(1);
                return Err(e);
            }
        }

        Ok(())
    }

    pub fn parse_str(&mut self, source_name: &str, text: &str) -> Result<(), Nem12Error> {
        self.parse_reader(source_name, text.as_bytes())
    }

    pub fn finish(self) -> ParseSession {
        tracing::debug!(
            registers = self.stats.registers,
            interval_days = self.stats.interval_days,
            duplicate_days = self.stats.duplicate_days,
            variable_qualities = self.stats.variable_qualities,
            skipped = self.stats.skipped,
            "nem12 parse finished"
        );
        ParseSession {
            registers: self.registers,
        }
    }

    fn process_record(
        &mut self,
        record: &StringRecord,
        location: &Location,
    ) -> Result<(), Nem12Error> {
        self.stats.records += 1;
        let record_type = RecordType::from_discriminator(record.get(0).unwrap_or(""));

        match record_type {
            RecordType::NmiDataDetails => {
                let register = self.on_nmi_data_details(record, location)?;
                self.cursor.register = Some(register);
                self.cursor.day = None;
            }
            RecordType::IntervalData => {
                let register = self.cursor.register.ok_or_else(|| Nem12Error::MalformedSequence {
                    location: location.clone(),
                    record_type,
                    expected: RecordType::NmiDataDetails,
                    line: raw_line(record),
                })?;
                let day = self.on_interval_data(register, record, location)?;
                self.cursor.day = Some((register, day));
            }
            RecordType::IntervalEvent => {
                let (register, day) = self.cursor.day.ok_or_else(|| Nem12Error::MalformedSequence {
                    location: location.clone(),
                    record_type,
                    expected: RecordType::IntervalData,
                    line: raw_line(record),
                })?;
                self.on_interval_event(register, day, record);
            }
            RecordType::Other => {
                self.stats.skipped += 1;
                metrics::counter!("nem12_unknown_records_total").increment(1);
                tracing::debug!(
                    location = %location,
                    record_type = record.get(0).unwrap_or(""),
                    "skipping record type"
                );
                return Ok(());
            }
        }

        metrics::counter!("nem12_records_total", "record_type" => record_type.as_str()).increment(1);
        Ok(())
    }

    fn on_nmi_data_details(
        &mut self,
        record: &StringRecord,
        location: &Location,
    ) -> Result<usize, Nem12Error> {
        let record_type = RecordType::NmiDataDetails;
        let get = |idx: usize, name: &'static str| field(record, idx, name, record_type, location);

        let interval_length_str = get(header::INTERVAL_LENGTH, "interval length")?;
        let interval_length: u32 = interval_length_str.trim().parse().map_err(|_| {
            field_format(
                record,
                record_type,
                location,
                format!("interval length '{interval_length_str}' is not an integer"),
            )
        })?;
        let interval_count = interval_count_for(interval_length).ok_or_else(|| {
            field_format(
                record,
                record_type,
                location,
                format!("interval length {interval_length} does not divide a day"),
            )
        })?;

        let candidate = MeterRegister {
            nmi: get(header::NMI, "nmi")?.to_string(),
            meter: get(header::METER, "meter serial")?.to_string(),
            register: get(header::REGISTER, "register id")?.to_string(),
            register_config: get(header::REGISTER_CONFIG, "register configuration")?.to_string(),
            uom: get(header::UOM, "unit of measure")?.to_string(),
            interval_length,
            interval_days: Vec::new(),
            line_items: line_items(record),
        };

        let key = candidate.key();
        if let Some(&existing) = self.register_index.get(&key) {
            let current = &self.registers[existing];
            if current.interval_length != candidate.interval_length || current.uom != candidate.uom {
                tracing::warn!(
                    location = %location,
                    nmi = %key.nmi,
                    register = %key.register,
                    kept_interval_length = current.interval_length,
                    kept_uom = %current.uom,
                    "repeated register header disagrees with the first one; keeping the first"
                );
            }
            return Ok(existing);
        }

        let idx = self.registers.len();
        self.registers.push(candidate);
        self.interval_counts.push(interval_count);
        self.register_index.insert(key, idx);
        self.stats.registers += 1;
        Ok(idx)
    }

    fn on_interval_data(
        &mut self,
        register: usize,
        record: &StringRecord,
        location: &Location,
    ) -> Result<usize, Nem12Error> {
        let record_type = RecordType::IntervalData;
        let interval_count = self.interval_counts[register];

        let date_str = field(record, interval::DATE, "interval date", record_type, location)?;
        let interval_date = Date::parse(date_str.trim(), INTERVAL_DATE_FORMAT).map_err(|e| {
            field_format(
                record,
                record_type,
                location,
                format!("invalid interval date '{date_str}': {e}"),
            )
        })?;

        let quality_idx = interval::quality(interval_count);
        let quality = record.get(quality_idx).ok_or_else(|| {
            field_format(
                record,
                record_type,
                location,
                format!(
                    "expected {interval_count} interval values followed by a quality method, found {} fields",
                    record.len()
                ),
            )
        })?;

        if let Some(&existing) = self.day_index.get(&(register, interval_date)) {
            self.stats.duplicate_days += 1;
            metrics::counter!("nem12_duplicate_days_total").increment(1);
            tracing::trace!(location = %location, date = %interval_date, "duplicate interval day ignored");
            return Ok(existing);
        }

        let interval_values = (interval::FIRST_VALUE..quality_idx)
            .map(|idx| {
                let raw = record.get(idx).unwrap_or("");
                raw.trim().parse::<f64>().map_err(|_| {
                    field_format(
                        record,
                        record_type,
                        location,
                        format!("interval value {} '{raw}' is not numeric", idx - 1),
                    )
                })
            })
            .collect::<Result<Vec<f64>, Nem12Error>>()?;

        let owner = &mut self.registers[register];
        let day = IntervalDay {
            register: owner.key(),
            interval_date,
            quality: quality.to_string(),
            interval_values,
            variable_qualities: Vec::new(),
            line_items: line_items(record),
        };

        let idx = owner.interval_days.len();
        owner.interval_days.push(day);
        self.day_index.insert((register, interval_date), idx);
        self.stats.interval_days += 1;
        Ok(idx)
    }

    fn on_interval_event(&mut self, register: usize, day: usize, record: &StringRecord) {
        let interval_day = &mut self.registers[register].interval_days[day];
        let note = VariableQuality::new(interval_day.key(), line_items(record));

        if self.note_index.insert((register, day, note.line_str.clone())) {
            interval_day.variable_qualities.push(note);
            self.stats.variable_qualities += 1;
        } else {
            self.stats.duplicate_variable_qualities += 1;
        }
    }
}

/// Parse in-memory or streamed sources, in order, into one session.
pub fn parse_sources<I, S, R>(sources: I) -> Result<ParseSession, Nem12Error>
where
    I: IntoIterator<Item = (S, R)>,
    S: AsRef<str>,
    R: Read,
{
    let mut parser = Nem12Parser::new();
    for (name, reader) in sources {
        parser.parse_reader(name.as_ref(), reader)?;
    }
    Ok(parser.finish())
}

/// Parse files, in the order given, into one session.
pub fn parse_files<P: AsRef<Path>>(paths: &[P]) -> Result<ParseSession, Nem12Error> {
    let mut parser = Nem12Parser::new();
    for path in paths {
        let path = path.as_ref();
        let file = File::open(path).map_err(|error| Nem12Error::Io {
            path: path.display().to_string(),
            error,
        })?;
        parser.parse_reader(&path.display().to_string(), file)?;
    }

    let stats = parser.stats();
    tracing::info!(
        files = paths.len(),
        registers = stats.registers,
        interval_days = stats.interval_days,
        duplicate_days = stats.duplicate_days,
        skipped = stats.skipped,
        "parsed nem12 files"
    );
    Ok(parser.finish())
}

fn field<'r>(
    record: &'r StringRecord,
    idx: usize,
    name: &str,
    record_type: RecordType,
    location: &Location,
) -> Result<&'r str, Nem12Error> {
    record.get(idx).ok_or_else(|| {
        field_format(
            record,
            record_type,
            location,
            format!("missing {name} at field {idx}"),
        )
    })
}

fn field_format(
    record: &StringRecord,
    record_type: RecordType,
    location: &Location,
    reason: String,
) -> Nem12Error {
    Nem12Error::FieldFormat {
        location: location.clone(),
        record_type,
        reason,
        line: raw_line(record),
    }
}

fn line_items(record: &StringRecord) -> Vec<String> {
    record.iter().map(str::to_string).collect()
}

fn raw_line(record: &StringRecord) -> String {
    record.iter().collect::<Vec<_>>().join(",")
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const NMI: &str = "6408091979";

    pub fn header(nmi: &str, register: &str, interval_length: &str) -> String {
        format!("200,{nmi},E1B1,{register},{register},N1,123456,KWH,{interval_length},")
    }

    pub fn day(date: &str, value: &str, count: usize, quality: &str) -> String {
        let values = vec![value; count].join(",");
        format!("300,{date},{values},{quality},,,20190401023010,")
    }

    pub fn note(start: u32, end: u32, quality: &str) -> String {
        format!("400,{start},{end},{quality},,")
    }

    pub fn lines(lines: &[String]) -> String {
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}
