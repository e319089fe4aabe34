#![cfg(feature = "excel")]

//! Spreadsheet decoding (`.xlsx`, `.xls`, `.ods`, ...).

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Row, Value};

use super::format::ReadStats;

/// Decode workbook sheets and feed each data row to `visit`.
///
/// Behavior:
/// - Reads `sheets` in the given order; an empty list reads the workbook's first sheet
/// - A requested sheet missing from the workbook is an error
/// - The first row of each sheet is its header; an empty header cell is named
///   `column_<N>` after its 1-based position
/// - Empty cells inside a row decode to `""`; cells after the row's last non-empty cell
///   decode to an explicit null
/// - Numeric cells holding an integral value decode to `Int`
pub fn read_excel_rows(
    path: &Path,
    sheets: &[String],
    visit: &mut dyn FnMut(Row) -> PipelineResult<()>,
) -> PipelineResult<ReadStats> {
    let mut workbook = open_workbook_auto(path)?;
    let available = workbook.sheet_names().to_vec();

    let selected: Vec<String> = if sheets.is_empty() {
        let first = available
            .first()
            .cloned()
            .ok_or(PipelineError::Excel(calamine::Error::Msg("workbook has no sheets")))?;
        vec![first]
    } else {
        sheets.to_vec()
    };

    let mut stats = ReadStats::default();
    for sheet in &selected {
        if !available.contains(sheet) {
            return Err(PipelineError::SheetNotFound {
                sheet: sheet.clone(),
                available,
            });
        }
        debug!(file = %path.display(), sheet = %sheet, "reading sheet");
        let range = workbook.worksheet_range(sheet)?;
        stats.rows_read += read_sheet_range(&range, visit)?;
    }
    Ok(stats)
}

fn read_sheet_range(
    range: &calamine::Range<Data>,
    visit: &mut dyn FnMut(Row) -> PipelineResult<()>,
) -> PipelineResult<u64> {
    let mut rows = range.rows();
    let Some(header_cells) = rows.next() else {
        return Ok(0);
    };
    let header: Vec<String> = header_cells
        .iter()
        .enumerate()
        .map(|(idx, cell)| match cell_to_header_string(cell) {
            name if name.is_empty() => format!("column_{}", idx + 1),
            name => name,
        })
        .collect();

    let mut count = 0;
    for cells in rows {
        let last_filled = cells.iter().rposition(|c| !matches!(c, Data::Empty));
        let mut row = Row::with_capacity(header.len());
        for (idx, name) in header.iter().enumerate() {
            let value = match (cells.get(idx), last_filled) {
                (Some(cell), Some(last)) if idx <= last => convert_cell(cell),
                _ => Value::Null,
            };
            row.insert(name.as_str(), value);
        }
        count += 1;
        visit(row)?;
    }
    Ok(count)
}

fn cell_to_header_string(c: &Data) -> String {
    match convert_cell(c) {
        Value::Null => String::new(),
        v => v.to_string().trim().to_string(),
    }
}

fn convert_cell(c: &Data) -> Value {
    match c {
        Data::Empty => Value::String(String::new()),
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::Int(*f as i64),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(range: &calamine::Range<Data>) -> Vec<Row> {
        let mut rows = Vec::new();
        read_sheet_range(range, &mut |row| {
            rows.push(row);
            Ok(())
        })
        .unwrap();
        rows
    }

    fn sheet(cells: &[((u32, u32), Data)]) -> calamine::Range<Data> {
        let mut range = calamine::Range::new((0, 0), (2, 3));
        for (pos, value) in cells {
            range.set_value(*pos, value.clone());
        }
        range
    }

    #[test]
    fn trailing_cells_are_null_inner_cells_empty() {
        let range = sheet(&[
            ((0, 0), Data::String("a".into())),
            ((0, 1), Data::String("b".into())),
            ((0, 2), Data::String("c".into())),
            ((0, 3), Data::String("d".into())),
            ((1, 0), Data::String("x".into())),
            ((1, 2), Data::Float(3.0)),
            ((2, 3), Data::Bool(true)),
        ]);
        let rows = decode(&range);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("a"), Some(&Value::from("x")));
        assert_eq!(rows[0].get("b"), Some(&Value::from("")));
        assert_eq!(rows[0].get("c"), Some(&Value::Int(3)));
        assert_eq!(rows[0].get("d"), Some(&Value::Null));
        assert_eq!(rows[1].get("a"), Some(&Value::from("")));
        assert_eq!(rows[1].get("d"), Some(&Value::Bool(true)));
    }

    #[test]
    fn empty_header_cells_get_positional_names() {
        let range = sheet(&[
            ((0, 0), Data::String("id".into())),
            ((0, 2), Data::String(" ".into())),
            ((0, 3), Data::String("d".into())),
            ((1, 0), Data::Int(1)),
            ((1, 1), Data::String("b".into())),
            ((1, 2), Data::String("c".into())),
            ((1, 3), Data::String("x".into())),
        ]);
        let rows = decode(&range);
        let keys: Vec<&str> = rows[0].keys().collect();
        assert_eq!(keys, vec!["id", "column_2", "column_3", "d"]);
        assert_eq!(rows[0].get("column_2"), Some(&Value::from("b")));
        assert!(!rows[0].contains_key(""));
    }

    #[test]
    fn fractional_floats_stay_floats() {
        assert_eq!(convert_cell(&Data::Float(2.5)), Value::Float(2.5));
        assert_eq!(cell_to_header_string(&Data::Float(7.0)), "7");
    }
}
