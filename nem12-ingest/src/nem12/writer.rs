use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::nem12::{error::Nem12Error, parser::ParseSession};

/// All lines belonging to one NMI, in canonical `200` / `300` / `400` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedNmi<'a> {
    pub nmi: &'a str,
    pub lines: Vec<&'a [String]>,
}

/// Group a session's original lines by NMI.
///
/// NMIs appear in first-seen order; within an NMI each register header is
/// followed by its days, each day by its interval events.
pub fn merge_by_nmi(session: &ParseSession) -> Vec<MergedNmi<'_>> {
    let mut merged: Vec<MergedNmi<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for register in session.registers() {
        let slot = *index.entry(register.nmi.as_str()).or_insert_with(|| {
            merged.push(MergedNmi {
                nmi: register.nmi.as_str(),
                lines: Vec::new(),
            });
            merged.len() - 1
        });

        let lines = &mut merged[slot].lines;
        lines.push(&register.line_items);
        for day in &register.interval_days {
            lines.push(&day.line_items);
            for note in &day.variable_qualities {
                lines.push(&note.line_items);
            }
        }
    }

    merged
}

/// Write one NMI's lines as comma separated records, fields verbatim.
pub fn write_nmi<W: Write>(merged: &MergedNmi<'_>, writer: W) -> Result<(), Nem12Error> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    for line in &merged.lines {
        wtr.write_record(line.iter())?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn merged_file_name(nmi: &str) -> String {
    format!("nem12_{nmi}.csv")
}

/// Write `nem12_<nmi>.csv` for every NMI in the session into `dir`.
pub fn write_merged_files(session: &ParseSession, dir: &Path) -> Result<Vec<PathBuf>, Nem12Error> {
    fs::create_dir_all(dir).map_err(|error| Nem12Error::Io {
        path: dir.display().to_string(),
        error,
    })?;

    let mut written = Vec::new();
    for merged in merge_by_nmi(session) {
        let path = dir.join(merged_file_name(merged.nmi));
        let file = File::create(&path).map_err(|error| Nem12Error::Io {
            path: path.display().to_string(),
            error,
        })?;
        write_nmi(&merged, file)?;

        tracing::info!(nmi = merged.nmi, lines = merged.lines.len(), path = %path.display(), "wrote merged nem12 file");
        written.push(path);
    }

    Ok(written)
}
