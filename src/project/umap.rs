// UMAP to two dimensions.
//
// fit: exact k-nearest-neighbor graph -> per-point smooth kNN distances ->
// fuzzy simplicial set (fuzzy union of the directed memberships) -> seeded
// random layout -> SGD with negative sampling against the 1/(1+a*d^2b) curve.
//
// transform: new points get their own kNN memberships against the training
// rows, start at the membership-weighted mean of their neighbors' layout
// positions, and are optimized with the training layout frozen.
//
// Everything iterates in index order and draws from one StdRng seeded from
// the params, so identical input and params give identical coordinates.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::ab::find_ab_params;
use crate::error::{ClusterError, ClusterResult};

pub const DEFAULT_N_NEIGHBORS: usize = 8;
pub const DEFAULT_MIN_DIST: f64 = 0.4;
pub const DEFAULT_SEED: u64 = 42;

const SMOOTH_K_TOLERANCE: f64 = 1e-5;
const MIN_K_DIST_SCALE: f64 = 1e-3;
const BINARY_SEARCH_STEPS: usize = 64;
const INIT_RANGE: f64 = 10.0;
const GRAD_CLIP: f64 = 4.0;

/// A 2-D layout coordinate.
pub type Point2 = [f64; 2];

/// Distance in the input space. The layout space is always euclidean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
}

impl Metric {
    fn distance(self, a: &[f64], norm_a: f64, b: &[f64], norm_b: f64) -> f64 {
        match self {
            Metric::Cosine => {
                if norm_a == 0.0 && norm_b == 0.0 {
                    0.0
                } else if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                    (1.0 - dot / (norm_a * norm_b)).max(0.0)
                }
            }
            Metric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cosine => f.write_str("cosine"),
            Metric::Euclidean => f.write_str("euclidean"),
        }
    }
}

impl FromStr for Metric {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "euclidean" => Ok(Metric::Euclidean),
            other => Err(ClusterError::InvalidParameter(format!(
                "metric must be cosine or euclidean, got '{other}'"
            ))),
        }
    }
}

/// Layout parameters. `n_neighbors` trades local for global structure,
/// `min_dist` sets how tightly points may pack.
#[derive(Debug, Clone, PartialEq)]
pub struct UmapParams {
    pub n_neighbors: usize,
    pub min_dist: f64,
    pub spread: f64,
    pub metric: Metric,
    /// None picks 500 epochs up to 10k rows, 200 above.
    pub n_epochs: Option<usize>,
    pub learning_rate: f64,
    pub negative_sample_rate: usize,
    pub repulsion_strength: f64,
    pub seed: u64,
}

impl Default for UmapParams {
    fn default() -> Self {
        Self {
            n_neighbors: DEFAULT_N_NEIGHBORS,
            min_dist: DEFAULT_MIN_DIST,
            spread: 1.0,
            metric: Metric::Cosine,
            n_epochs: None,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            repulsion_strength: 1.0,
            seed: DEFAULT_SEED,
        }
    }
}

impl UmapParams {
    pub fn validate(&self) -> ClusterResult<()> {
        if self.n_neighbors < 2 {
            return Err(ClusterError::InvalidParameter(format!(
                "n_neighbors must be at least 2, got {}",
                self.n_neighbors
            )));
        }
        if !self.spread.is_finite() || self.spread <= 0.0 {
            return Err(ClusterError::InvalidParameter(format!(
                "spread must be positive, got {}",
                self.spread
            )));
        }
        if !self.min_dist.is_finite() || self.min_dist < 0.0 || self.min_dist > self.spread {
            return Err(ClusterError::InvalidParameter(format!(
                "min_dist must be between 0 and {}, got {}",
                self.spread, self.min_dist
            )));
        }
        if self.n_epochs == Some(0) {
            return Err(ClusterError::InvalidParameter(
                "n_epochs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn fit_epochs(&self, n: usize) -> usize {
        self.n_epochs
            .unwrap_or(if n <= 10_000 { 500 } else { 200 })
    }

    fn transform_epochs(&self, n_new: usize) -> usize {
        match self.n_epochs {
            Some(e) => (e / 3).max(1),
            None if n_new <= 10_000 => 100,
            None => 30,
        }
    }
}

/// Why a transform could not run.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The model can't place new points; re-fitting over old + new rows can.
    #[error("transform unsupported: {0}")]
    Unsupported(String),
    /// The new rows themselves are unusable.
    #[error("{0}")]
    Invalid(String),
}

/// One weighted edge of the fuzzy graph.
#[derive(Debug, Clone, Copy)]
struct Edge {
    head: usize,
    tail: usize,
    weight: f64,
}

/// A fitted layout: training rows, their coordinates and the curve params.
#[derive(Debug, Clone)]
pub struct FittedUmap {
    params: UmapParams,
    a: f64,
    b: f64,
    training: Vec<Vec<f64>>,
    norms: Vec<f64>,
    embedding: Vec<Point2>,
}

/// Fit a layout over `data`. All rows must share one dimension.
pub fn fit(data: &[Vec<f64>], params: &UmapParams) -> Result<FittedUmap> {
    params.validate()?;
    if data.is_empty() {
        anyhow::bail!("Cannot project an empty embedding matrix");
    }
    check_rows(data, data[0].len()).map_err(|e| anyhow::anyhow!(e))?;

    let (a, b) = find_ab_params(params.spread, params.min_dist);
    let norms: Vec<f64> = data.iter().map(|r| l2_norm(r)).collect();
    let n = data.len();

    if n == 1 {
        return Ok(FittedUmap {
            params: params.clone(),
            a,
            b,
            training: data.to_vec(),
            norms,
            embedding: vec![[0.0, 0.0]],
        });
    }

    let k = (params.n_neighbors - 1).min(n - 1);
    let knn: Vec<Vec<(f64, usize)>> = (0..n)
        .map(|i| {
            nearest(
                &data[i],
                norms[i],
                data,
                &norms,
                k,
                Some(i),
                params.metric,
            )
        })
        .collect();

    let global_mean = mean_of(knn.iter().flatten().map(|&(d, _)| d));
    let target = ((k + 1) as f64).log2();

    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (i, neighbors) in knn.iter().enumerate() {
        let dists: Vec<f64> = neighbors.iter().map(|&(d, _)| d).collect();
        let rho = dists.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);
        let sigma = smooth_sigma(&dists, rho, target, global_mean);
        for &(d, j) in neighbors {
            directed.insert((i, j), membership(d, rho, sigma));
        }
    }

    // Fuzzy union: w + w^T - w * w^T
    let mut graph: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let wt = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let union = w + wt - w * wt;
        graph.insert((i, j), union);
        graph.insert((j, i), union);
    }

    let n_epochs = params.fit_epochs(n);
    let edges = prune(
        graph
            .into_iter()
            .map(|((head, tail), weight)| Edge { head, tail, weight })
            .collect(),
        n_epochs,
    );

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut embedding: Vec<Point2> = (0..n)
        .map(|_| {
            [
                rng.random_range(-INIT_RANGE..INIT_RANGE),
                rng.random_range(-INIT_RANGE..INIT_RANGE),
            ]
        })
        .collect();

    debug!(
        n,
        k,
        edges = edges.len(),
        n_epochs,
        a,
        b,
        "Optimizing UMAP layout"
    );

    let sgd = Sgd {
        a,
        b,
        gamma: params.repulsion_strength,
        initial_alpha: params.learning_rate,
        negative_sample_rate: params.negative_sample_rate,
    };
    sgd.optimize(&mut embedding, None, &edges, n_epochs, &mut rng);

    Ok(FittedUmap {
        params: params.clone(),
        a,
        b,
        training: data.to_vec(),
        norms,
        embedding,
    })
}

impl FittedUmap {
    /// Coordinates of the training rows, in row order.
    pub fn embedding(&self) -> &[Point2] {
        &self.embedding
    }

    pub fn params(&self) -> &UmapParams {
        &self.params
    }

    pub fn training(&self) -> &[Vec<f64>] {
        &self.training
    }

    pub fn dim(&self) -> usize {
        self.training.first().map_or(0, Vec::len)
    }

    /// A model fit on a single row has no neighbor graph to place points in.
    pub fn supports_transform(&self) -> bool {
        self.training.len() >= 2
    }

    /// Place new rows into this layout without moving the training points.
    pub fn transform(&self, data: &[Vec<f64>]) -> Result<Vec<Point2>, TransformError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        check_rows(data, self.dim()).map_err(TransformError::Invalid)?;
        if !self.supports_transform() {
            return Err(TransformError::Unsupported(format!(
                "model was fit on {} row(s), need at least 2",
                self.training.len()
            )));
        }

        let n_train = self.training.len();
        let k = self.params.n_neighbors.min(n_train);
        let target = (k as f64).log2();
        let n_epochs = self.params.transform_epochs(data.len());

        let knn: Vec<Vec<(f64, usize)>> = data
            .iter()
            .map(|row| {
                nearest(
                    row,
                    l2_norm(row),
                    &self.training,
                    &self.norms,
                    k,
                    None,
                    self.params.metric,
                )
            })
            .collect();
        let global_mean = mean_of(knn.iter().flatten().map(|&(d, _)| d));

        let mut edges = Vec::with_capacity(data.len() * k);
        let mut embedding = Vec::with_capacity(data.len());
        for (i, neighbors) in knn.iter().enumerate() {
            let dists: Vec<f64> = neighbors.iter().map(|&(d, _)| d).collect();
            let sigma = smooth_sigma(&dists, 0.0, target, global_mean);
            let weights: Vec<f64> = dists.iter().map(|&d| membership(d, 0.0, sigma)).collect();

            let total: f64 = weights.iter().sum();
            let mut start = [0.0, 0.0];
            for (&(_, j), &w) in neighbors.iter().zip(&weights) {
                let share = if total > 0.0 { w / total } else { 1.0 / k as f64 };
                start[0] += share * self.embedding[j][0];
                start[1] += share * self.embedding[j][1];
            }
            embedding.push(start);

            for (&(_, j), &w) in neighbors.iter().zip(&weights) {
                edges.push(Edge {
                    head: i,
                    tail: j,
                    weight: w,
                });
            }
        }
        let edges = prune(edges, n_epochs);

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let sgd = Sgd {
            a: self.a,
            b: self.b,
            gamma: self.params.repulsion_strength,
            initial_alpha: self.params.learning_rate / 4.0,
            negative_sample_rate: self.params.negative_sample_rate,
        };
        sgd.optimize(&mut embedding, Some(&self.embedding), &edges, n_epochs, &mut rng);

        debug!(new = data.len(), n_train, n_epochs, "Transformed points into layout");
        Ok(embedding)
    }
}

/// Every row must have `dim` finite values.
fn check_rows(data: &[Vec<f64>], dim: usize) -> Result<(), String> {
    for (i, row) in data.iter().enumerate() {
        if row.len() != dim {
            return Err(format!(
                "row {} has {} dimensions, expected {}",
                i,
                row.len(),
                dim
            ));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(format!("row {} contains a non-finite value", i));
        }
    }
    Ok(())
}

fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn mean_of(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// The `k` closest rows of `points` to `query`, ascending by distance with
/// ties broken by index. `skip` excludes the query's own row.
fn nearest(
    query: &[f64],
    query_norm: f64,
    points: &[Vec<f64>],
    norms: &[f64],
    k: usize,
    skip: Option<usize>,
    metric: Metric,
) -> Vec<(f64, usize)> {
    let mut all: Vec<(f64, usize)> = points
        .iter()
        .enumerate()
        .filter(|&(j, _)| Some(j) != skip)
        .map(|(j, p)| (metric.distance(query, query_norm, p, norms[j]), j))
        .collect();
    let by_distance = |x: &(f64, usize), y: &(f64, usize)| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1));
    if k < all.len() {
        all.select_nth_unstable_by(k, by_distance);
        all.truncate(k);
    }
    all.sort_by(by_distance);
    all
}

/// Binary-search the bandwidth so the memberships of one point's neighbors
/// sum to `target` (log2 of the neighborhood size).
fn smooth_sigma(dists: &[f64], rho: f64, target: f64, global_mean: f64) -> f64 {
    let mut lo = 0.0_f64;
    let mut hi = f64::INFINITY;
    let mut mid = 1.0_f64;

    for _ in 0..BINARY_SEARCH_STEPS {
        let psum: f64 = dists
            .iter()
            .map(|&d| {
                let dd = d - rho;
                if dd > 0.0 {
                    (-dd / mid).exp()
                } else {
                    1.0
                }
            })
            .sum();

        if (psum - target).abs() < SMOOTH_K_TOLERANCE {
            break;
        }
        if psum > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
        }
    }

    let floor = if rho > 0.0 {
        MIN_K_DIST_SCALE * mean_of(dists.iter().copied())
    } else {
        MIN_K_DIST_SCALE * global_mean
    };
    mid.max(floor)
}

fn membership(d: f64, rho: f64, sigma: f64) -> f64 {
    let dd = d - rho;
    if dd <= 0.0 {
        1.0
    } else if sigma > 0.0 {
        (-dd / sigma).exp()
    } else {
        0.0
    }
}

/// Drop edges too weak to be sampled even once in `n_epochs`.
fn prune(edges: Vec<Edge>, n_epochs: usize) -> Vec<Edge> {
    let max = edges.iter().map(|e| e.weight).fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let cutoff = max / n_epochs as f64;
    edges
        .into_iter()
        .filter(|e| e.weight >= cutoff && e.weight > 0.0)
        .collect()
}

fn clip(v: f64) -> f64 {
    v.clamp(-GRAD_CLIP, GRAD_CLIP)
}

/// Stochastic gradient descent over the fuzzy graph's edges.
struct Sgd {
    a: f64,
    b: f64,
    gamma: f64,
    initial_alpha: f64,
    negative_sample_rate: usize,
}

impl Sgd {
    /// Optimize `head` in place. With `tail == None` the graph is over `head`
    /// itself and both ends of an edge move; otherwise edges point into the
    /// frozen `tail` layout.
    fn optimize(
        &self,
        head: &mut [Point2],
        tail: Option<&[Point2]>,
        edges: &[Edge],
        n_epochs: usize,
        rng: &mut StdRng,
    ) {
        if edges.is_empty() {
            return;
        }
        let n_vertices = tail.map_or(head.len(), <[Point2]>::len);
        let max_weight = edges.iter().map(|e| e.weight).fold(0.0_f64, f64::max);

        let epochs_per_sample: Vec<f64> = edges.iter().map(|e| max_weight / e.weight).collect();
        let neg_rate = self.negative_sample_rate.max(1) as f64;
        let epochs_per_negative: Vec<f64> = epochs_per_sample.iter().map(|e| e / neg_rate).collect();
        let mut next_sample = epochs_per_sample.clone();
        let mut next_negative = epochs_per_negative.clone();

        for epoch in 0..n_epochs {
            let alpha = self.initial_alpha * (1.0 - epoch as f64 / n_epochs as f64);
            let n = epoch as f64;

            for (idx, edge) in edges.iter().enumerate() {
                if next_sample[idx] > n {
                    continue;
                }
                let (j, k) = (edge.head, edge.tail);
                if tail.is_none() && j == k {
                    continue;
                }

                let mut current = head[j];
                let mut other = match tail {
                    Some(t) => t[k],
                    None => head[k],
                };

                let dist_sq = squared_distance(&current, &other);
                let attract = if dist_sq > 0.0 {
                    -2.0 * self.a * self.b * dist_sq.powf(self.b - 1.0)
                        / (self.a * dist_sq.powf(self.b) + 1.0)
                } else {
                    0.0
                };
                for d in 0..2 {
                    let grad = clip(attract * (current[d] - other[d]));
                    current[d] += grad * alpha;
                    if tail.is_none() {
                        other[d] -= grad * alpha;
                    }
                }
                head[j] = current;
                if tail.is_none() {
                    head[k] = other;
                }
                next_sample[idx] += epochs_per_sample[idx];

                let n_neg = ((n - next_negative[idx]) / epochs_per_negative[idx]).floor();
                let n_neg = if n_neg > 0.0 { n_neg as usize } else { 0 };
                for _ in 0..n_neg {
                    let k = rng.random_range(0..n_vertices);
                    let other = match tail {
                        Some(t) => t[k],
                        None => head[k],
                    };
                    let dist_sq = squared_distance(&current, &other);
                    let repel = if dist_sq > 0.0 {
                        2.0 * self.gamma * self.b
                            / ((0.001 + dist_sq) * (self.a * dist_sq.powf(self.b) + 1.0))
                    } else if tail.is_none() && j == k {
                        continue;
                    } else {
                        0.0
                    };
                    for d in 0..2 {
                        let grad = if repel > 0.0 {
                            clip(repel * (current[d] - other[d]))
                        } else {
                            GRAD_CLIP
                        };
                        current[d] += grad * alpha;
                    }
                }
                head[j] = current;
                next_negative[idx] += n_neg as f64 * epochs_per_negative[idx];
            }
        }
    }
}

fn squared_distance(a: &Point2, b: &Point2) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}
