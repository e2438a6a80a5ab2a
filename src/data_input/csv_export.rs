// src/data_input/csv_export.rs
//
// Writes a decoded session in the CSV layout produced by blackbox_decode:
// header metadata as `name,value` rows, then one column per main field with
// `time` renamed to `time (us)`.

use csv::{QuoteStyle, WriterBuilder};
use log::info;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::data_input::flight_data::LogSession;
use crate::error::ExportError;

fn column_title(name: &str) -> String {
    match name {
        "time" => "time (us)".to_string(),
        other => other.to_string(),
    }
}

/// Writes the session to `writer`. Returns the number of data rows.
pub fn write_session_csv<W: Write>(session: &LogSession, writer: W) -> Result<usize, ExportError> {
    let table = &session.flight_data.raw;
    if table.row_count() == 0 {
        return Err(ExportError::EmptySession);
    }

    let mut csv_writer = WriterBuilder::new()
        .flexible(true)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(writer);

    for (name, value) in &session.header.metadata {
        if name.starts_with("Field ") {
            continue;
        }
        csv_writer.write_record([name.as_str(), value.as_str()])?;
    }

    csv_writer.write_record(table.names.iter().map(|n| column_title(n)))?;

    let mut record: Vec<String> = Vec::with_capacity(table.columns.len());
    for row in 0..table.row_count() {
        record.clear();
        record.extend(table.columns.iter().map(|column| column[row].to_string()));
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(table.row_count())
}

/// Writes `<stem>.<index>.csv` into `dir` and returns its path.
pub fn export_session_csv(
    session: &LogSession,
    dir: &Path,
    stem: &str,
) -> Result<PathBuf, ExportError> {
    let path = dir.join(format!("{}.{:02}.csv", stem, session.index + 1));
    let file = File::create(&path)?;
    let rows = write_session_csv(session, file)?;
    info!("Exported {} rows to {}", rows, path.display());
    Ok(path)
}
