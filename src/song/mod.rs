pub mod record;

use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub use record::{feature_matrix, parse_rows, parse_songs};

pub const FEATURE_DIM: usize = 9;

/// Feature keys in vector order. Every vector in the crate uses this order.
pub const FEATURE_KEYS: [&str; FEATURE_DIM] = [
    "acousticness",
    "danceability",
    "energy",
    "instrumentalness",
    "liveness",
    "loudness",
    "speechiness",
    "tempo",
    "valence",
];

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f32; FEATURE_DIM]);

impl FeatureVector {
    pub fn new(values: [f32; FEATURE_DIM]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        FEATURE_KEYS
            .iter()
            .position(|k| *k == key)
            .map(|i| self.0[i])
    }
}

impl From<[f32; FEATURE_DIM]> for FeatureVector {
    fn from(values: [f32; FEATURE_DIM]) -> Self {
        Self(values)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SongIdentity {
    pub name: String,
    pub artists: String,
    pub release_date: String,
}

impl SongIdentity {
    pub fn new(
        name: impl Into<String>,
        artists: impl Into<String>,
        release_date: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            artists: artists.into(),
            release_date: release_date.into(),
        }
    }
}

impl Display for SongIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} by {}, released on {}",
            self.name, self.artists, self.release_date
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub identity: SongIdentity,
    pub features: FeatureVector,
}

/// A sub-collection row. Columns may be missing, unlike a [`Song`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub name: String,
    pub features: [Option<f32>; FEATURE_DIM],
}

impl CatalogRow {
    pub fn complete(name: impl Into<String>, features: FeatureVector) -> Self {
        Self {
            name: name.into(),
            features: features.0.map(Some),
        }
    }

    /// First feature key with no value, in vector order.
    pub fn first_missing(&self) -> Option<&'static str> {
        self.features
            .iter()
            .position(Option::is_none)
            .map(|i| FEATURE_KEYS[i])
    }

    pub fn to_vector(&self) -> Option<FeatureVector> {
        let mut values = [0f32; FEATURE_DIM];
        for (value, feature) in values.iter_mut().zip(self.features.iter()) {
            *value = (*feature)?;
        }
        Some(FeatureVector(values))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub name: String,
    pub score: f32,
}

impl Display for RecommendationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:.4})", self.name, self.score)
    }
}
