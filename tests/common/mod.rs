// Shared fixtures for integration tests.
//
// HashEmbedder stands in for the ONNX model: every lowercase word is hashed
// into one of DIM buckets, so texts sharing words land close together and
// identical texts get identical vectors. Nothing is downloaded.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;

use kwmap::embed::traits::Embedder;
use kwmap::sheet::table::{CellValue, Table};
use kwmap::sheet::writer::vectorized_to_buffer;

pub const DIM: usize = 16;

#[derive(Default)]
pub struct HashEmbedder {
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of embed_batch calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

pub fn hash_vector(text: &str) -> Vec<f64> {
    let mut v = vec![0.0; DIM];
    for word in text.split_whitespace() {
        let h = fnv1a(&word.to_lowercase());
        let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
        v[(h % DIM as u64) as usize] += sign;
    }
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "hash-test"
    }
}

pub fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

/// A Keyword/Topic table from (keyword, topic) pairs.
pub fn keyword_table(pairs: &[(&str, &str)]) -> Table {
    Table::new(
        vec!["Keyword".into(), "Topic".into(), "Volume".into()],
        pairs
            .iter()
            .enumerate()
            .map(|(i, (k, t))| vec![text(k), text(t), CellValue::Number(100.0 * (i + 1) as f64)])
            .collect(),
    )
}

/// .xlsx bytes holding `table` as its only worksheet.
pub fn workbook_bytes(table: &Table) -> Vec<u8> {
    vectorized_to_buffer(table, &[]).unwrap()
}

/// The three-row example sheet: two SEO keywords and one Food keyword.
pub fn seo_food_table() -> Table {
    keyword_table(&[
        ("seo tools", "SEO"),
        ("best seo tools", "SEO"),
        ("cooking recipes", "Food"),
    ])
}

/// A larger sheet with three well separated topics.
pub fn three_topic_table() -> Table {
    keyword_table(&[
        ("seo tools", "SEO"),
        ("best seo tools", "SEO"),
        ("free seo tools online", "SEO"),
        ("seo audit tools", "SEO"),
        ("cooking recipes", "Food"),
        ("easy cooking recipes", "Food"),
        ("vegan cooking recipes", "Food"),
        ("quick dinner recipes", "Food"),
        ("running shoes", "Sport"),
        ("trail running shoes", "Sport"),
        ("running shoes for women", "Sport"),
        ("cheap running shoes", "Sport"),
    ])
}
