// Workbook writer: the original table plus appended embedding columns.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::debug;

use super::model::TextField;
use super::table::{CellValue, Table};
use crate::embed::matrix::EmbeddingMatrix;

/// Excel's hard column limit.
const MAX_COLUMNS: usize = 16_384;

/// Write `table` followed by one column per embedding dimension per field to
/// a new .xlsx at `path`. Original columns whose names collide with a new
/// embedding column are replaced, so re-vectorizing a vectorized sheet does
/// not duplicate them. Returns the number of embedding columns written.
pub fn write_vectorized(
    table: &Table,
    embeddings: &[(TextField, EmbeddingMatrix)],
    path: &Path,
) -> Result<usize> {
    let mut workbook = Workbook::new();
    let added = fill_worksheet(workbook.add_worksheet(), table, embeddings)?;
    workbook
        .save(path)
        .with_context(|| format!("Failed to save workbook {}", path.display()))?;
    debug!(path = %path.display(), added, "Wrote vectorized workbook");
    Ok(added)
}

/// Same layout as `write_vectorized`, returned as .xlsx bytes.
pub fn vectorized_to_buffer(
    table: &Table,
    embeddings: &[(TextField, EmbeddingMatrix)],
) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    fill_worksheet(workbook.add_worksheet(), table, embeddings)?;
    workbook
        .save_to_buffer()
        .context("Failed to serialize workbook")
}

fn fill_worksheet(
    worksheet: &mut Worksheet,
    table: &Table,
    embeddings: &[(TextField, EmbeddingMatrix)],
) -> Result<usize> {
    let new_headers: Vec<String> = embeddings
        .iter()
        .flat_map(|(field, m)| (0..m.dim()).map(move |d| field.embed_column(d)))
        .collect();
    let replaced: HashSet<&str> = new_headers.iter().map(String::as_str).collect();
    let kept: Vec<usize> = (0..table.headers.len())
        .filter(|&c| !replaced.contains(table.headers[c].as_str()))
        .collect();

    let total = kept.len() + new_headers.len();
    if total > MAX_COLUMNS {
        anyhow::bail!(
            "Output needs {} columns, more than the {} a worksheet can hold",
            total,
            MAX_COLUMNS
        );
    }

    for (out_col, &c) in kept.iter().enumerate() {
        worksheet.write_string(0, out_col as u16, &table.headers[c])?;
        for r in 0..table.len() {
            write_cell(worksheet, r as u32 + 1, out_col as u16, table.cell(r, c))?;
        }
    }

    let mut out_col = kept.len();
    for (field, matrix) in embeddings {
        if matrix.len() != table.len() {
            anyhow::bail!(
                "{} embeddings have {} rows, sheet has {}",
                field,
                matrix.len(),
                table.len()
            );
        }
        for d in 0..matrix.dim() {
            worksheet.write_string(0, out_col as u16, field.embed_column(d))?;
            for (r, value) in matrix.column(d).enumerate() {
                worksheet.write_number(r as u32 + 1, out_col as u16, value)?;
            }
            out_col += 1;
        }
    }

    Ok(new_headers.len())
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, cell: &CellValue) -> Result<()> {
    match cell {
        CellValue::Empty => {}
        CellValue::Text(s) => {
            worksheet.write_string(row, col, s)?;
        }
        CellValue::Number(n) => {
            worksheet.write_number(row, col, *n)?;
        }
        CellValue::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::reader::read_bytes;

    fn sample_table() -> Table {
        Table::new(
            vec!["Keyword".into(), "Topic".into(), "Volume".into()],
            vec![
                vec![
                    CellValue::Text("seo tools".into()),
                    CellValue::Text("SEO".into()),
                    CellValue::Number(1200.0),
                ],
                vec![
                    CellValue::Text("cooking recipes".into()),
                    CellValue::Text("Food".into()),
                    CellValue::Empty,
                ],
            ],
        )
    }

    #[test]
    fn test_embedding_columns_appended_after_originals() {
        let matrix = EmbeddingMatrix::new(vec![vec![0.1, 0.2], vec![0.3, 0.4]]).unwrap();
        let bytes = vectorized_to_buffer(&sample_table(), &[(TextField::Keyword, matrix)]).unwrap();
        let table = read_bytes(bytes).unwrap();

        assert_eq!(
            table.headers,
            vec!["Keyword", "Topic", "Volume", "keyword_embed_0", "keyword_embed_1"]
        );
        assert_eq!(table.cell(1, 4), &CellValue::Number(0.4));
        assert_eq!(table.cell(1, 2), &CellValue::Empty);
    }

    #[test]
    fn test_existing_embedding_columns_replaced() {
        let mut table = sample_table();
        table.headers.push("keyword_embed_0".into());
        for row in &mut table.rows {
            row.push(CellValue::Number(9.0));
        }
        let matrix = EmbeddingMatrix::new(vec![vec![0.5], vec![0.6]]).unwrap();
        let bytes = vectorized_to_buffer(&table, &[(TextField::Keyword, matrix)]).unwrap();
        let table = read_bytes(bytes).unwrap();

        assert_eq!(table.headers, vec!["Keyword", "Topic", "Volume", "keyword_embed_0"]);
        assert_eq!(table.cell(0, 3), &CellValue::Number(0.5));
    }

    #[test]
    fn test_row_count_mismatch_rejected() {
        let matrix = EmbeddingMatrix::new(vec![vec![0.1]]).unwrap();
        assert!(vectorized_to_buffer(&sample_table(), &[(TextField::Topic, matrix)]).is_err());
    }
}
