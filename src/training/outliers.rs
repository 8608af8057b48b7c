//! Isolation-forest outlier rejection for training sets.
//!
//! Every filter observation in a training set is a point
//! `(rest-frame effective wavelength, scaled flux)`. Random axis-aligned
//! partitioning isolates points in sparse regions in fewer splits; the
//! anomaly score `s = 2^(−E[h(x)] / c(ψ))` (Liu, Ting & Zhou 2008) is close
//! to 1 for such points and ≲ 0.5 for the bulk.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::bandpass::{eff_wavelengths, BandpassSet};
use crate::error::Result;

use super::sets::{TrainingGalaxy, TrainingSet};

/// Euler–Mascheroni constant, for the harmonic-number approximation.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Parameters for the isolation forest.
#[derive(Debug, Clone)]
pub struct IsolationForestConfig {
    /// Number of trees. Default 100.
    pub n_trees: usize,
    /// Points sampled per tree. None = all points. Default None.
    pub max_samples: Option<usize>,
    /// Points scoring above this are outliers. Default 0.5.
    pub score_threshold: f64,
    /// RNG seed, so rejection is reproducible. Default 0.
    pub seed: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: None,
            score_threshold: 0.5,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A fitted forest over 2-D points.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    pub fn fit(points: &[[f64; 2]], config: &IsolationForestConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let n = points.len();
        let sample_size = config.max_samples.unwrap_or(n).clamp(1, n.max(1));
        let height_limit = (sample_size as f64).log2().ceil().max(0.0) as usize;

        let trees = (0..config.n_trees)
            .map(|_| {
                let indices: Vec<usize> = if sample_size < n {
                    rand::seq::index::sample(&mut rng, n, sample_size).into_vec()
                } else {
                    (0..n).collect()
                };
                build_tree(points, indices, 0, height_limit, &mut rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Anomaly score in (0, 1].
    pub fn score(&self, point: &[f64; 2]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let mean_depth = self
            .trees
            .iter()
            .map(|t| path_length(t, point, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c == 0.0 {
            return 0.0;
        }
        2f64.powf(-mean_depth / c)
    }

    /// `true` for points scoring at or below `threshold`.
    pub fn inlier_mask(&self, points: &[[f64; 2]], threshold: f64) -> Vec<bool> {
        points.iter().map(|p| self.score(p) <= threshold).collect()
    }
}

fn build_tree(
    points: &[[f64; 2]],
    indices: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= height_limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    // Only split on features that still vary within this node.
    let mut spans = Vec::with_capacity(2);
    for feature in 0..2 {
        let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            (lo.min(points[i][feature]), hi.max(points[i][feature]))
        });
        if hi > lo {
            spans.push((feature, lo, hi));
        }
    }
    if spans.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, lo, hi) = spans[rng.random_range(0..spans.len())];
    let threshold = rng.random_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.into_iter().partition(|&i| points[i][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(points, left, depth + 1, height_limit, rng)),
        right: Box::new(build_tree(points, right, depth + 1, height_limit, rng)),
    }
}

fn path_length(node: &Node, point: &[f64; 2], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if point[*feature] < *threshold {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
    }
}

/// Drop outlying filter observations from a training set.
///
/// Galaxies left with no observations are removed. Sets with fewer than
/// three observations are returned unchanged. Returns the filtered set and
/// the number of observations removed.
pub fn reject_outliers(
    training_set: &[TrainingGalaxy],
    bandpasses: &BandpassSet,
    config: &IsolationForestConfig,
) -> Result<(TrainingSet, usize)> {
    let mut points = Vec::new();
    for tg in training_set {
        let rest_factor = 1.0 / (1.0 + tg.galaxy.redshift);
        let eff = eff_wavelengths(bandpasses, &tg.galaxy.filters)?;
        for (l, f) in eff.iter().zip(tg.scaled_fluxes()) {
            points.push([l * rest_factor, f]);
        }
    }
    if points.len() < 3 {
        return Ok((training_set.to_vec(), 0));
    }

    let forest = IsolationForest::fit(&points, config);
    let mask = forest.inlier_mask(&points, config.score_threshold);

    let mut kept = TrainingSet::with_capacity(training_set.len());
    let mut offset = 0;
    for tg in training_set {
        let n = tg.galaxy.len();
        let keep: Vec<usize> = (0..n).filter(|&j| mask[offset + j]).collect();
        offset += n;
        if keep.is_empty() {
            continue;
        }
        let galaxy = if keep.len() == n {
            tg.galaxy.clone()
        } else {
            tg.galaxy.select(&keep)
        };
        kept.push(TrainingGalaxy::new(galaxy, tg.scale));
    }

    let removed = mask.iter().filter(|&&m| !m).count();
    debug!(
        "Outlier rejection: removed {} of {} observations",
        removed,
        points.len()
    );
    Ok((kept, removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandpass::Bandpass;
    use crate::galaxy::Galaxy;

    /// Two repeated measurements (24 copies each) and one stray point.
    fn cluster_with_outlier() -> Vec<[f64; 2]> {
        let mut pts = Vec::new();
        for _ in 0..24 {
            pts.push([1.0, 1.0]);
            pts.push([1.1, 1.05]);
        }
        pts.push([50.0, 50.0]);
        pts
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c = average_path_length(256);
        assert!(c > 9.0 && c < 11.0);
    }

    #[test]
    fn test_isolated_point_scores_highest() {
        let pts = cluster_with_outlier();
        let forest = IsolationForest::fit(&pts, &IsolationForestConfig::default());
        let outlier = forest.score(&pts[48]);
        let centre = forest.score(&pts[0]);
        assert!(outlier > 0.5, "outlier score {outlier}");
        assert!(centre < outlier);

        let mask = forest.inlier_mask(&pts, 0.5);
        assert!(!mask[48]);
        assert!(mask[..48].iter().all(|&m| m));
    }

    #[test]
    fn test_fit_is_reproducible() {
        let pts = cluster_with_outlier();
        let config = IsolationForestConfig::default();
        let a = IsolationForest::fit(&pts, &config);
        let b = IsolationForest::fit(&pts, &config);
        assert_eq!(a.score(&pts[10]), b.score(&pts[10]));
    }

    #[test]
    fn test_reject_outliers_drops_observation() {
        let mut bp = BandpassSet::new();
        bp.insert("v".into(), Bandpass::top_hat(4500.0, 5500.0).unwrap());
        let set: Vec<TrainingGalaxy> = (0..40)
            .map(|i| {
                let flux = if i == 7 { 400.0 } else { 1.0 + 0.01 * (i % 5) as f64 };
                let g = Galaxy::new(0.01 * (i % 4) as f64, vec!["v".into()], vec![flux], vec![0.05]);
                TrainingGalaxy::new(g, 1.0)
            })
            .collect();

        let (kept, removed) = reject_outliers(&set, &bp, &IsolationForestConfig::default()).unwrap();
        assert!(removed >= 1);
        assert_eq!(kept.len() + removed, set.len());
        assert!(kept.iter().all(|tg| tg.galaxy.fluxes[0] < 10.0));
    }
}
