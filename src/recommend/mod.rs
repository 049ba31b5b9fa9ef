pub mod cluster;
pub mod engine;
pub mod matching;

pub use cluster::{Clustering, KMeans};
pub use engine::Recommender;
pub use matching::{AggregateDistanceRetriever, CosineRetriever, MalformedRowPolicy, Retriever};

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn magnitude(a: &[f32]) -> f32 {
    a.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// `None` when either vector has zero length, since the angle is undefined.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    let mag_a = magnitude(a);
    let mag_b = magnitude(b);
    if mag_a == 0.0 || mag_b == 0.0 || !(mag_a * mag_b).is_finite() {
        return None;
    }

    Some((dot_product(a, b) / (mag_a * mag_b)).clamp(-1.0, 1.0))
}

pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
