// Sentence embedding: trait-based abstraction over the embedding model.
//
// The Embedder trait defines the interface. SentenceEmbedder implements it with
// a local ONNX sentence-transformer; tests swap in a deterministic fake.

pub mod download;
pub mod matrix;
pub mod onnx;
pub mod traits;
