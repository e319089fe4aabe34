//! CSV decoding.

use std::io;
use std::path::Path;

use tracing::warn;

use crate::error::PipelineResult;
use crate::types::{Row, Value};

use super::format::ReadStats;

const UTF8_BOM: char = '\u{feff}';

/// Decode a delimited file and feed each data line to `visit` as a [`Row`].
///
/// Rules:
///
/// - The first line is the header; a leading UTF-8 BOM is stripped.
/// - Each data line is zipped positionally against the header; extra trailing fields are
///   ignored.
/// - A line with fewer fields than the header is dropped with a warning.
/// - When `fields` is given, only header fields named there are kept.
/// - Values are raw text; typing happens later in the pipeline.
pub fn read_csv_rows(
    path: &Path,
    separator: u8,
    fields: Option<&[String]>,
    visit: &mut dyn FnMut(Row) -> PipelineResult<()>,
) -> PipelineResult<ReadStats> {
    let file = std::fs::File::open(path)?;
    read_csv_from_reader(file, separator, fields, visit)
}

/// Decode CSV data from any reader. See [`read_csv_rows`].
pub fn read_csv_from_reader<R: io::Read>(
    reader: R,
    separator: u8,
    fields: Option<&[String]>,
    visit: &mut dyn FnMut(Row) -> PipelineResult<()>,
) -> PipelineResult<ReadStats> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(separator)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches(UTF8_BOM).to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    // header index -> field name, restricted to the kept fields
    let projection: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| fields.is_none_or(|keep| keep.iter().any(|k| k == *h)))
        .map(|(i, h)| (i, h.as_str()))
        .collect();

    let mut stats = ReadStats::default();
    let mut record = csv::StringRecord::new();
    while rdr.read_record(&mut record)? {
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.len() < headers.len() {
            warn!(
                line,
                expected = headers.len(),
                actual = record.len(),
                "skipping csv line with fewer fields than the header"
            );
            stats.rows_dropped += 1;
            continue;
        }

        let mut row = Row::with_capacity(projection.len());
        for &(i, name) in &projection {
            row.insert(name, Value::String(record[i].to_string()));
        }
        stats.rows_read += 1;
        visit(row)?;
    }

    Ok(stats)
}
