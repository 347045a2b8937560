// kwmap: semantic keyword clustering
//
// This is the library root. Each module corresponds to a stage of the
// sheet -> embeddings -> 2-D map pipeline, plus the two shells that drive it.

pub mod cluster;
pub mod config;
pub mod embed;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod project;
pub mod sheet;

#[cfg(feature = "web")]
pub mod web;
