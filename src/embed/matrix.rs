// Row-aligned embedding matrix.

use anyhow::Result;

/// Ordered sequence of equal-length vectors, one per spreadsheet row.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    rows: Vec<Vec<f64>>,
    dim: usize,
}

impl EmbeddingMatrix {
    /// Build a matrix, rejecting ragged rows.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self> {
        let dim = rows.first().map_or(0, Vec::len);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            anyhow::bail!(
                "Embedding row {} has {} dimensions, expected {}",
                i,
                row.len(),
                dim
            );
        }
        Ok(Self { rows, dim })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Value of dimension `d` for every row: one spreadsheet column.
    pub fn column(&self, d: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |r| r[d])
    }

    /// A new matrix with `other`'s rows appended after this one's.
    pub fn concat(&self, other: &EmbeddingMatrix) -> Result<Self> {
        if !self.is_empty() && !other.is_empty() && self.dim != other.dim {
            anyhow::bail!(
                "Cannot stack {}-dimensional vectors onto a {}-dimensional matrix",
                other.dim,
                self.dim
            );
        }
        let mut rows = self.rows.clone();
        rows.extend(other.rows.iter().cloned());
        Self::new(rows)
    }

    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }
}
