// Topic centroids.
//
// Rows are grouped by their topic label, groups keep first-seen order.
// Centroid is the arithmetic mean of member coordinates; dispersion is the
// mean of the per-axis population standard deviations.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;

use crate::project::umap::Point2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicCentroid {
    pub topic: String,
    pub x: f64,
    pub y: f64,
    pub count: usize,
    pub dispersion: f64,
}

/// Group `coords` by the label at the same index in `topics`.
///
/// Returns the centroids and the ordered unique topic list.
pub fn compute_centroids<S: AsRef<str>>(
    topics: &[S],
    coords: &[Point2],
) -> Result<(Vec<TopicCentroid>, Vec<String>)> {
    if topics.len() != coords.len() {
        anyhow::bail!(
            "{} topic labels for {} coordinates",
            topics.len(),
            coords.len()
        );
    }

    let mut order: Vec<String> = Vec::new();
    let mut members: Vec<Vec<Point2>> = Vec::new();
    let mut index = HashMap::new();

    for (label, point) in topics.iter().zip(coords) {
        let label = label.as_ref();
        let slot = *index.entry(label.to_string()).or_insert_with(|| {
            order.push(label.to_string());
            members.push(Vec::new());
            members.len() - 1
        });
        members[slot].push(*point);
    }

    let centroids = order
        .iter()
        .zip(&members)
        .map(|(topic, points)| centroid(topic, points))
        .collect();

    Ok((centroids, order))
}

fn centroid(topic: &str, points: &[Point2]) -> TopicCentroid {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p[1]).sum::<f64>() / n;

    let std_x = (points.iter().map(|p| (p[0] - mean_x).powi(2)).sum::<f64>() / n).sqrt();
    let std_y = (points.iter().map(|p| (p[1] - mean_y).powi(2)).sum::<f64>() / n).sqrt();

    TopicCentroid {
        topic: topic.to_string(),
        x: mean_x,
        y: mean_y,
        count: points.len(),
        dispersion: (std_x + std_y) / 2.0,
    }
}
