// Aggregation: per-topic centroids over projected keyword coordinates.

pub mod centroids;
