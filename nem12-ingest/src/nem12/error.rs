use std::fmt;

use crate::nem12::record::RecordType;

/// Where in which source a record was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub source: String,
    /// 1-based.
    pub line: u64,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.line)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Nem12Error {
    /// A `300`/`400` record with no preceding `200`/`300` to attach to.
    #[error("{location}: {record_type} record without a preceding {expected} record: {line}")]
    MalformedSequence {
        location: Location,
        record_type: RecordType,
        expected: RecordType,
        line: String,
    },
    #[error("{location}: invalid {record_type} record ({reason}): {line}")]
    FieldFormat {
        location: Location,
        record_type: RecordType,
        reason: String,
        line: String,
    },
    /// The flattener only handles KWH registers with 30 minute intervals.
    #[error("register {nmi}/{meter}/{register}: unsupported {detail}")]
    UnitContract {
        nmi: String,
        meter: String,
        register: String,
        detail: String,
    },
    #[error("failed to read {source_name}: {error}")]
    Read {
        source_name: String,
        #[source]
        error: csv::Error,
    },
    #[error("failed to open {path}: {error}")]
    Io {
        path: String,
        #[source]
        error: std::io::Error,
    },
    #[error("failed to write merged output: {0}")]
    Write(#[from] csv::Error),
}

impl Nem12Error {
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::MalformedSequence { .. } | Self::FieldFormat { .. })
    }
}
