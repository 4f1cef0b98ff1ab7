use serde::{Deserialize, Serialize};

/// Distance metric selected at collection construction. Unlike the original
/// const-generic `Metric<const N: usize>` trait this crate grew up with, the
/// vector dimension here is only known at runtime (one collection can be
/// built with `D=128`, another with `D=768`), so metrics are values, not
/// types — a small enum dispatched at the call site rather than a trait
/// bound baked into the index's type parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    L2,
    InnerProduct,
    Cosine,
}

impl MetricKind {
    /// Squared Euclidean / raw inner product / cosine distance (`1 - cos`).
    /// NaN in either operand propagates per IEEE 754 float semantics and
    /// never panics.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            MetricKind::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum(),
            MetricKind::InnerProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            MetricKind::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_a * norm_b)
                }
            }
        }
    }

    /// `true` if `candidate` is strictly better than `incumbent` under this
    /// metric's ordering: smaller wins for L2, larger wins for IP/cosine-
    /// similarity. Note `distance()` for cosine already returns `1 - cos`, a
    /// dissimilarity, so cosine also orders smallest-first in practice; the
    /// ordering distinction that matters structurally is L2 vs IP, since raw
    /// inner product is a similarity (larger is better) rather than a
    /// distance.
    pub fn better(self, candidate: f32, incumbent: f32) -> bool {
        match self {
            MetricKind::L2 | MetricKind::Cosine => candidate < incumbent,
            MetricKind::InnerProduct => candidate > incumbent,
        }
    }

    /// Parses the wire-level metric name used in collection configuration.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "L2" => Some(MetricKind::L2),
            "IP" => Some(MetricKind::InnerProduct),
            "COSINE" => Some(MetricKind::Cosine),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_distance_matches_squared_euclidean() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        let dist = MetricKind::L2.distance(&a, &b);
        assert!((dist - 27.0).abs() < f32::EPSILON);
    }

    #[test]
    fn l2_orders_smallest_first() {
        assert!(MetricKind::L2.better(1.0, 2.0));
        assert!(!MetricKind::L2.better(2.0, 1.0));
    }

    #[test]
    fn inner_product_orders_largest_first() {
        assert!(MetricKind::InnerProduct.better(2.0, 1.0));
        assert!(!MetricKind::InnerProduct.better(1.0, 2.0));
    }

    #[test]
    fn cosine_distance_orthogonal_is_one() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let dist = MetricKind::Cosine.distance(&a, &b);
        assert!((dist - 1.0).abs() < 1e-6);
    }
}
