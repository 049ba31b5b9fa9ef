//! K-means clustering of playlist feature vectors.
//!
//! Lloyd's algorithm with k-means++ seeding. The seed is explicit: the same
//! seed and input always give the same centroids in the same order. Results
//! are a local optimum only, so two different seeds may disagree.

use super::squared_distance;
use crate::error::{RecommendError, Result};
use crate::song::{FeatureVector, FEATURE_DIM};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_MAX_ITER: usize = 300;

#[derive(Clone, Debug)]
pub struct KMeans {
    n_clusters: usize,
    max_iter: usize,
    seed: u64,
}

#[derive(Clone, Debug)]
pub struct Clustering {
    pub centroids: Vec<FeatureVector>,
    pub labels: Vec<usize>,
    pub iterations: usize,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f32,
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: DEFAULT_MAX_ITER,
            seed: 0,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn fit(&self, data: &[FeatureVector]) -> Result<Clustering> {
        let n = data.len();
        let k = self.n_clusters;
        if n == 0 {
            return Err(RecommendError::EmptyInput);
        }
        if k == 0 || k > n {
            return Err(RecommendError::ClusterCount { k, n });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = self.init_centroids(data, &mut rng);
        let mut labels: Vec<usize> = Vec::new();
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iter {
            iterations += 1;
            let assigned = assign(data, &centroids);
            if assigned == labels {
                converged = true;
                break;
            }
            labels = assigned;
            update_centroids(data, &labels, &mut centroids);
        }
        // stopped at the cap: centroids moved after the last assignment
        if !converged {
            labels = assign(data, &centroids);
        }

        let inertia: f32 = data
            .iter()
            .zip(labels.iter())
            .map(|(v, &c)| squared_distance(v.as_slice(), centroids[c].as_slice()))
            .sum();
        debug!(
            "k-means k: {}, n: {}, iterations: {}, inertia: {}",
            k, n, iterations, inertia
        );

        Ok(Clustering {
            centroids,
            labels,
            iterations,
            inertia,
        })
    }

    /// k-means++: first centroid uniform, the rest sampled by D².
    /// Points already chosen have D² = 0 and are never picked twice.
    fn init_centroids(&self, data: &[FeatureVector], rng: &mut StdRng) -> Vec<FeatureVector> {
        let mut centroids = Vec::with_capacity(self.n_clusters);
        centroids.push(data[rng.gen_range(0..data.len())]);

        while centroids.len() < self.n_clusters {
            let distances = data
                .iter()
                .map(|v| {
                    centroids
                        .iter()
                        .map(|c| squared_distance(v.as_slice(), c.as_slice()))
                        .fold(f32::INFINITY, f32::min)
                })
                .collect::<Vec<_>>();

            let total: f32 = distances.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                // every point sits on a centroid already (duplicate songs)
                centroids.push(data[rng.gen_range(0..data.len())]);
                continue;
            }

            let threshold = rng.gen::<f32>() * total;
            let mut cumsum = 0.0;
            let mut selected = None;
            for (i, &d) in distances.iter().enumerate() {
                if d <= 0.0 {
                    continue;
                }
                cumsum += d;
                selected = Some(i);
                if cumsum >= threshold {
                    break;
                }
            }
            match selected {
                Some(i) => centroids.push(data[i]),
                None => centroids.push(data[rng.gen_range(0..data.len())]),
            }
        }

        centroids
    }
}

fn nearest(vector: &FeatureVector, centroids: &[FeatureVector]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(vector.as_slice(), c.as_slice())))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn assign(data: &[FeatureVector], centroids: &[FeatureVector]) -> Vec<usize> {
    data.iter().map(|v| nearest(v, centroids)).collect()
}

/// Moves each centroid to the mean of its members. A centroid with no
/// members keeps its previous position.
fn update_centroids(data: &[FeatureVector], labels: &[usize], centroids: &mut [FeatureVector]) {
    let mut sums = vec![[0f64; FEATURE_DIM]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];
    for (v, &c) in data.iter().zip(labels) {
        counts[c] += 1;
        for (sum, x) in sums[c].iter_mut().zip(v.as_slice()) {
            *sum += *x as f64;
        }
    }
    for ((centroid, sum), &count) in centroids.iter_mut().zip(sums).zip(counts.iter()) {
        if count > 0 {
            for (value, s) in centroid.0.iter_mut().zip(sum) {
                *value = (s / count as f64) as f32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::feature_matrix;
    use crate::song::record::tests::playlist_example;

    fn close(a: &FeatureVector, b: &FeatureVector, tol: f32) -> bool {
        a.0.iter().zip(b.0.iter()).all(|(x, y)| (x - y).abs() <= tol)
    }

    #[test]
    fn single_cluster_is_the_mean() {
        let data = feature_matrix(&playlist_example()).unwrap();
        let result = KMeans::new(1).fit(&data).unwrap();
        assert_eq!(result.centroids.len(), 1);
        assert!(result.labels.iter().all(|&l| l == 0));

        let mut mean = [0f32; FEATURE_DIM];
        for v in &data {
            for (m, x) in mean.iter_mut().zip(v.0) {
                *m += x / data.len() as f32;
            }
        }
        assert!(close(&result.centroids[0], &FeatureVector(mean), 1e-3));
    }

    #[test]
    fn k_equal_n_recovers_each_point() {
        let data = feature_matrix(&playlist_example()).unwrap();
        for seed in [0, 1, 42] {
            let result = KMeans::new(4).with_seed(seed).fit(&data).unwrap();
            assert_eq!(result.centroids.len(), 4);
            for v in &data {
                assert!(
                    result.centroids.iter().any(|c| close(c, v, 1e-4)),
                    "seed {} lost a point",
                    seed
                );
            }
            assert!(result.inertia.abs() < 1e-3);
        }
    }

    #[test]
    fn separates_two_groups() {
        let mut data = Vec::new();
        for i in 0..3 {
            data.push(FeatureVector([0.1 * i as f32, 0.5, 0.5, 0., 0.1, -5., 0.05, 90., 0.4]));
            data.push(FeatureVector([0.9, 0.2, 0.3, 0.1 * i as f32, 0.1, -12., 0.03, 170., 0.2]));
        }
        let result = KMeans::new(2).with_seed(7).fit(&data).unwrap();
        assert_eq!(result.labels[0], result.labels[2]);
        assert_eq!(result.labels[2], result.labels[4]);
        assert_eq!(result.labels[1], result.labels[3]);
        assert_ne!(result.labels[0], result.labels[1]);
    }

    #[test]
    fn same_seed_same_centroids() {
        let data = feature_matrix(&playlist_example()).unwrap();
        let a = KMeans::new(3).with_seed(5).fit(&data).unwrap();
        let b = KMeans::new(3).with_seed(5).fit(&data).unwrap();
        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn duplicate_songs_still_give_k_centroids() {
        let v = FeatureVector([0.2, 0.6, 0.7, 0., 0.1, -6., 0.04, 120., 0.5]);
        let result = KMeans::new(2).fit(&[v, v, v]).unwrap();
        assert_eq!(result.centroids, vec![v, v]);
    }

    #[test]
    fn rejects_bad_cluster_counts() {
        let data = feature_matrix(&playlist_example()).unwrap();
        assert!(matches!(
            KMeans::new(5).fit(&data),
            Err(RecommendError::ClusterCount { k: 5, n: 4 })
        ));
        assert!(matches!(
            KMeans::new(0).fit(&data),
            Err(RecommendError::ClusterCount { k: 0, n: 4 })
        ));
        assert!(matches!(
            KMeans::new(1).fit(&[]),
            Err(RecommendError::EmptyInput)
        ));
    }

    #[test]
    fn iteration_cap_is_respected() {
        let data = feature_matrix(&playlist_example()).unwrap();
        let result = KMeans::new(2).with_max_iter(1).fit(&data).unwrap();
        assert_eq!(result.iterations, 1);
        assert_eq!(result.labels.len(), 4);

        // labels and inertia describe the centroids that are returned
        assert_eq!(result.labels, assign(&data, &result.centroids));
        let inertia: f32 = data
            .iter()
            .zip(result.labels.iter())
            .map(|(v, &c)| squared_distance(v.as_slice(), result.centroids[c].as_slice()))
            .sum();
        assert!((result.inertia - inertia).abs() < 1e-3);
    }
}
