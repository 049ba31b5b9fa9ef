//! Playlist-based song recommendation.
//!
//! A playlist is reduced to a few taste centroids with k-means, and each
//! centroid is matched against a song catalog. Two matchers exist: cosine
//! similarity over the whole catalog, and squared Euclidean distance over
//! per-name averages of one sub-collection.

#[macro_use]
extern crate log;

pub mod catalog;
pub mod config;
pub mod error;
pub mod recommend;
pub mod song;

pub use error::{RecommendError, Result};
