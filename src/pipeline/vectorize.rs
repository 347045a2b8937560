// Spreadsheet vectorization: append embedding columns for Keyword, Topic and
// Subtopic (when present) and save the result as a new workbook.

use std::path::{Path, PathBuf};

use tracing::info;

use super::embed_texts;
use crate::embed::matrix::EmbeddingMatrix;
use crate::embed::traits::Embedder;
use crate::error::ClusterResult;
use crate::sheet::model::{KeywordSheet, TextField};
use crate::sheet::{reader, writer};

/// Summary printed after a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorizeReport {
    pub rows: usize,
    pub original_columns: usize,
    pub added_columns: usize,
    pub total_columns: usize,
    pub output: PathBuf,
    /// Embedding width per vectorized field.
    pub fields: Vec<(TextField, usize)>,
}

/// A validated input sheet and where its vectorized copy goes.
#[derive(Debug)]
pub struct VectorizeJob {
    sheet: KeywordSheet,
    output: PathBuf,
}

/// `<stem>_vectorized.xlsx` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "keywords".to_string());
    input.with_file_name(format!("{stem}_vectorized.xlsx"))
}

impl VectorizeJob {
    /// Read and validate the input. Runs before any model is loaded, so a
    /// missing file or missing column fails fast.
    pub fn open(input: &Path, output: Option<&Path>) -> ClusterResult<Self> {
        let table = reader::read_path(input)?;
        let sheet = KeywordSheet::from_table(table)?;
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_output_path(input));
        info!(
            input = %input.display(),
            rows = sheet.len(),
            columns = sheet.table().headers.len(),
            "Loaded keyword sheet"
        );
        Ok(Self { sheet, output })
    }

    pub fn rows(&self) -> usize {
        self.sheet.len()
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Embed every text column present and write the output workbook.
    pub async fn run(self, embedder: &dyn Embedder) -> ClusterResult<VectorizeReport> {
        let mut embeddings: Vec<(TextField, EmbeddingMatrix)> = Vec::new();
        for field in TextField::ALL {
            let Some(texts) = self.sheet.texts(field) else {
                continue;
            };
            info!(field = %field, rows = texts.len(), "Vectorizing column");
            let matrix = embed_texts(embedder, &texts).await?;
            info!(field = %field, dims = matrix.dim(), "Column vectorized");
            embeddings.push((field, matrix));
        }

        let table = self.sheet.table();
        let added = writer::write_vectorized(table, &embeddings, &self.output)?;
        let replaced = table
            .headers
            .iter()
            .filter(|h| {
                embeddings
                    .iter()
                    .any(|(f, m)| (0..m.dim()).any(|d| **h == f.embed_column(d)))
            })
            .count();
        let original_columns = table.headers.len();

        Ok(VectorizeReport {
            rows: self.sheet.len(),
            original_columns,
            added_columns: added,
            total_columns: original_columns - replaced + added,
            fields: embeddings.iter().map(|(f, m)| (*f, m.dim())).collect(),
            output: self.output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/data/seo.xlsx")),
            PathBuf::from("/data/seo_vectorized.xlsx")
        );
        assert_eq!(
            default_output_path(Path::new("keywords.xls")),
            PathBuf::from("keywords_vectorized.xlsx")
        );
    }

    #[test]
    fn test_open_missing_input() {
        let err = VectorizeJob::open(Path::new("/no/such/file.xlsx"), None).unwrap_err();
        assert!(matches!(err, crate::error::ClusterError::InputNotFound(_)));
    }
}
