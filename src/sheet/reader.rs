// Workbook reader: first worksheet, first row is the header.
//
// Works on .xlsx, .xls and .ods through calamine, either from a path (CLI)
// or from uploaded bytes (HTTP).

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use tracing::debug;

use super::table::{CellValue, Table};
use crate::error::{ClusterError, ClusterResult};

/// Read the first worksheet of the workbook at `path`.
pub fn read_path(path: &Path) -> ClusterResult<Table> {
    if !path.exists() {
        return Err(ClusterError::InputNotFound(path.to_path_buf()));
    }
    let workbook = open_workbook_auto(path).map_err(|e| {
        ClusterError::Spreadsheet(format!("{}: {}", path.display(), e))
    })?;
    first_sheet(workbook)
}

/// Read the first worksheet of a workbook held in memory.
pub fn read_bytes(bytes: Vec<u8>) -> ClusterResult<Table> {
    let workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| ClusterError::Spreadsheet(e.to_string()))?;
    first_sheet(workbook)
}

fn first_sheet<RS: Read + Seek>(mut workbook: Sheets<RS>) -> ClusterResult<Table> {
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ClusterError::Spreadsheet("workbook has no worksheets".to_string()))?
        .map_err(|e| ClusterError::Spreadsheet(e.to_string()))?;
    let table = range_to_table(&range);
    debug!(
        rows = table.len(),
        columns = table.headers.len(),
        "Read worksheet"
    );
    Ok(table)
}

/// Header cells become column names (blank headers get pandas-style
/// `Unnamed: i` names); rows with no values at all are dropped.
fn range_to_table(range: &Range<Data>) -> Table {
    let mut rows = range.rows();

    let headers: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .enumerate()
            .map(|(i, cell)| match to_cell(cell) {
                CellValue::Empty => format!("Unnamed: {i}"),
                other => other.as_text(),
            })
            .collect(),
        None => return Table::default(),
    };

    let rows: Vec<Vec<CellValue>> = rows
        .map(|row| row.iter().map(to_cell).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .collect();

    Table::new(headers, rows)
}

fn to_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        // #N/A, #DIV/0! and friends carry no usable value
        Data::Error(_) => CellValue::Empty,
    }
}
