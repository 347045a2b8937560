// Typed keyword rows on top of a Table.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::table::Table;
use crate::embed::matrix::EmbeddingMatrix;
use crate::error::{ClusterError, ClusterResult};

/// Columns every keyword sheet must carry.
pub const REQUIRED_COLUMNS: [&str; 2] = ["Keyword", "Topic"];

/// Label used for rows whose Topic cell is blank.
pub const DEFAULT_TOPIC: &str = "Miscellaneous";

/// The embeddable text columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextField {
    Keyword,
    Topic,
    Subtopic,
}

impl TextField {
    pub const ALL: [TextField; 3] = [TextField::Keyword, TextField::Topic, TextField::Subtopic];

    /// Spreadsheet header of the source text column.
    pub fn column(self) -> &'static str {
        match self {
            TextField::Keyword => "Keyword",
            TextField::Topic => "Topic",
            TextField::Subtopic => "Subtopic",
        }
    }

    /// Lowercase name, as used by `vector_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            TextField::Keyword => "keyword",
            TextField::Topic => "topic",
            TextField::Subtopic => "subtopic",
        }
    }

    /// Prefix of this field's embedding columns, e.g. `keyword_embed_`.
    pub fn embed_prefix(self) -> String {
        format!("{}_embed_", self.as_str())
    }

    pub fn embed_column(self, dim: usize) -> String {
        format!("{}_embed_{}", self.as_str(), dim)
    }
}

impl fmt::Display for TextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextField {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword" => Ok(TextField::Keyword),
            "topic" => Ok(TextField::Topic),
            "subtopic" => Ok(TextField::Subtopic),
            other => Err(ClusterError::InvalidParameter(format!(
                "vector_type must be keyword, topic or subtopic, got '{other}'"
            ))),
        }
    }
}

/// One input record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordRow {
    pub keyword: String,
    pub topic: String,
    pub subtopic: String,
    pub url: String,
    pub traffic: i64,
    pub volume: i64,
    pub position: i64,
    pub kd: f64,
}

/// A validated keyword sheet: the raw table plus typed rows.
#[derive(Debug, Clone)]
pub struct KeywordSheet {
    table: Table,
    rows: Vec<KeywordRow>,
}

impl KeywordSheet {
    /// Validate required columns and type every row.
    ///
    /// Fails with MissingColumns naming every absent required column.
    pub fn from_table(table: Table) -> ClusterResult<Self> {
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| table.column_index(c).is_none())
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ClusterError::MissingColumns(missing));
        }

        let col = |name: &str| table.column_index(name);
        let (keyword, topic, subtopic, url) = (col("Keyword"), col("Topic"), col("Subtopic"), col("URL"));
        let (traffic, volume, position, kd) = (col("Traffic"), col("Volume"), col("Position"), col("KD"));

        let text = |r: usize, c: Option<usize>| c.map(|c| table.cell(r, c).as_text()).unwrap_or_default();
        let number = |r: usize, c: Option<usize>| {
            c.and_then(|c| table.cell(r, c).as_f64())
                .filter(|v| v.is_finite())
                .unwrap_or(0.0)
        };

        let rows = (0..table.len())
            .map(|r| {
                let topic_label = text(r, topic);
                KeywordRow {
                    keyword: text(r, keyword),
                    topic: if topic_label.is_empty() {
                        DEFAULT_TOPIC.to_string()
                    } else {
                        topic_label
                    },
                    subtopic: text(r, subtopic),
                    url: text(r, url),
                    traffic: number(r, traffic) as i64,
                    volume: number(r, volume) as i64,
                    position: number(r, position) as i64,
                    kd: number(r, kd),
                }
            })
            .collect();

        Ok(Self { table, rows })
    }

    pub fn rows(&self) -> &[KeywordRow] {
        &self.rows
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.table.column_index(name).is_some()
    }

    /// Raw text of a field's column, blank cells as "". None when the sheet
    /// has no such column.
    pub fn texts(&self, field: TextField) -> Option<Vec<String>> {
        let c = self.table.column_index(field.column())?;
        Some(
            (0..self.table.len())
                .map(|r| self.table.cell(r, c).as_text())
                .collect(),
        )
    }

    /// Embedding columns already present in the sheet for `field`, ordered by
    /// their dimension suffix. None when the sheet has no such columns; two
    /// columns with the same dimension are an error.
    pub fn stored_embeddings(&self, field: TextField) -> ClusterResult<Option<EmbeddingMatrix>> {
        let prefix = field.embed_prefix();
        let mut columns: BTreeMap<usize, usize> = BTreeMap::new();
        for (c, header) in self.table.headers.iter().enumerate() {
            let Some(dim) = header
                .strip_prefix(&prefix)
                .and_then(|suffix| suffix.parse::<usize>().ok())
            else {
                continue;
            };
            // keyword_embed_1 and keyword_embed_01 name the same dimension
            if let Some(&first) = columns.get(&dim) {
                return Err(ClusterError::InvalidParameter(format!(
                    "columns {} and {} both hold {} dimension {}",
                    self.table.headers[first], header, field, dim
                )));
            }
            columns.insert(dim, c);
        }

        if columns.is_empty() {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(self.table.len());
        for r in 0..self.table.len() {
            let mut vector = Vec::with_capacity(columns.len());
            for &c in columns.values() {
                let value = self
                    .table
                    .cell(r, c)
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "Column {} has a missing or non-numeric value at row {}",
                            self.table.headers[c],
                            r + 2
                        )
                    })?;
                vector.push(value);
            }
            rows.push(vector);
        }

        Ok(Some(EmbeddingMatrix::new(rows)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::table::CellValue;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_vector_type_parsing() {
        assert_eq!("Keyword".parse::<TextField>().unwrap(), TextField::Keyword);
        assert_eq!(" subtopic ".parse::<TextField>().unwrap(), TextField::Subtopic);
        assert!(matches!(
            "url".parse::<TextField>(),
            Err(ClusterError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_missing_required_columns_all_listed() {
        let table = Table::new(vec!["URL".into()], vec![]);
        match KeywordSheet::from_table(table) {
            Err(ClusterError::MissingColumns(cols)) => assert_eq!(cols, vec!["Keyword", "Topic"]),
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_topic_becomes_miscellaneous() {
        let table = Table::new(
            vec!["Keyword".into(), "Topic".into(), "Traffic".into()],
            vec![vec![text("seo"), CellValue::Empty, CellValue::Number(12.7)]],
        );
        let sheet = KeywordSheet::from_table(table).unwrap();
        assert_eq!(sheet.rows()[0].topic, DEFAULT_TOPIC);
        assert_eq!(sheet.rows()[0].traffic, 12);
        assert_eq!(sheet.rows()[0].volume, 0);
        // Embedding text keeps the raw blank, not the fallback label
        assert_eq!(sheet.texts(TextField::Topic).unwrap(), vec![String::new()]);
    }

    #[test]
    fn test_absent_subtopic_column_has_no_texts() {
        let table = Table::new(vec!["Keyword".into(), "Topic".into()], vec![]);
        let sheet = KeywordSheet::from_table(table).unwrap();
        assert!(sheet.texts(TextField::Subtopic).is_none());
    }

    #[test]
    fn test_stored_embeddings_ordered_by_suffix() {
        let table = Table::new(
            vec![
                "Keyword".into(),
                "Topic".into(),
                "keyword_embed_1".into(),
                "keyword_embed_0".into(),
                "topic_embed_0".into(),
            ],
            vec![vec![
                text("seo"),
                text("SEO"),
                CellValue::Number(0.2),
                CellValue::Number(0.1),
                CellValue::Number(0.9),
            ]],
        );
        let sheet = KeywordSheet::from_table(table).unwrap();
        let m = sheet.stored_embeddings(TextField::Keyword).unwrap().unwrap();
        assert_eq!(m.rows()[0], vec![0.1, 0.2]);
        assert!(sheet.stored_embeddings(TextField::Subtopic).unwrap().is_none());
    }

    #[test]
    fn test_stored_embeddings_reject_duplicate_dimension() {
        let table = Table::new(
            vec![
                "Keyword".into(),
                "Topic".into(),
                "keyword_embed_1".into(),
                "keyword_embed_0".into(),
                "keyword_embed_01".into(),
            ],
            vec![vec![
                text("seo"),
                text("SEO"),
                CellValue::Number(0.2),
                CellValue::Number(0.1),
                CellValue::Number(0.3),
            ]],
        );
        let sheet = KeywordSheet::from_table(table).unwrap();
        match sheet.stored_embeddings(TextField::Keyword) {
            Err(ClusterError::InvalidParameter(msg)) => {
                assert!(msg.contains("keyword_embed_1") && msg.contains("keyword_embed_01"), "{msg}")
            }
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[test]
    fn test_stored_embeddings_reject_blank_cells() {
        let table = Table::new(
            vec!["Keyword".into(), "Topic".into(), "keyword_embed_0".into()],
            vec![vec![text("seo"), text("SEO"), CellValue::Empty]],
        );
        let sheet = KeywordSheet::from_table(table).unwrap();
        assert!(matches!(
            sheet.stored_embeddings(TextField::Keyword),
            Err(ClusterError::Processing(_))
        ));
    }
}
