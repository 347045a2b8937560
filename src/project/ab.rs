// Fit the low-dimensional similarity curve 1 / (1 + a * d^(2b)).
//
// The target curve is 1 inside min_dist and exp(-(d - min_dist) / spread)
// beyond it, sampled at 300 points on [0, 3 * spread]. Least squares by
// Levenberg-Marquardt from a = b = 1, the same fit umap-learn runs with
// scipy's curve_fit.

const SAMPLES: usize = 300;
const MAX_ITERS: usize = 500;

/// Return `(a, b)` for the given spread and min_dist.
pub fn find_ab_params(spread: f64, min_dist: f64) -> (f64, f64) {
    let xs: Vec<f64> = (0..SAMPLES)
        .map(|i| 3.0 * spread * i as f64 / (SAMPLES - 1) as f64)
        .collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();

    let mut a = 1.0_f64;
    let mut b = 1.0_f64;
    let mut lambda = 1e-3_f64;
    let mut cost = sse(&xs, &ys, a, b);

    for _ in 0..MAX_ITERS {
        // Normal equations J^T J and J^T r
        let (mut jaa, mut jab, mut jbb, mut ga, mut gb) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (&x, &y) in xs.iter().zip(&ys) {
            if x <= 0.0 {
                // f(0) = 1 regardless of a, b: no gradient
                continue;
            }
            let p = x.powf(2.0 * b);
            let denom = 1.0 + a * p;
            let f = 1.0 / denom;
            let r = f - y;
            let da = -p / (denom * denom);
            let db = -a * p * 2.0 * x.ln() / (denom * denom);
            jaa += da * da;
            jab += da * db;
            jbb += db * db;
            ga += da * r;
            gb += db * r;
        }

        let m_aa = jaa * (1.0 + lambda);
        let m_bb = jbb * (1.0 + lambda);
        let det = m_aa * m_bb - jab * jab;
        if det.abs() < f64::EPSILON {
            break;
        }
        let step_a = -(m_bb * ga - jab * gb) / det;
        let step_b = -(m_aa * gb - jab * ga) / det;

        let (na, nb) = (a + step_a, b + step_b);
        let new_cost = if na > 0.0 && nb > 0.0 {
            sse(&xs, &ys, na, nb)
        } else {
            f64::INFINITY
        };

        if new_cost < cost {
            let improvement = cost - new_cost;
            a = na;
            b = nb;
            cost = new_cost;
            lambda = (lambda / 10.0).max(1e-12);
            if improvement < 1e-15 && step_a.abs() < 1e-10 && step_b.abs() < 1e-10 {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
        }
    }

    (a, b)
}

fn sse(xs: &[f64], ys: &[f64], a: f64, b: f64) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let f = 1.0 / (1.0 + a * x.powf(2.0 * b));
            (f - y) * (f - y)
        })
        .sum()
}
