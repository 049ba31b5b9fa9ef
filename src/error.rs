use crate::song::SongIdentity;
use thiserror::Error;

pub type Result<T, E = RecommendError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("missing required feature `{key}`")]
    MissingFeature { key: &'static str },

    #[error("feature `{key}` is not a number")]
    InvalidFeature { key: &'static str },

    #[error("missing required field `{key}`")]
    MissingField { key: &'static str },

    #[error("playlist has no songs")]
    EmptyInput,

    #[error("cannot build {k} clusters from {n} songs")]
    ClusterCount { k: usize, n: usize },

    #[error("catalog retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    #[error("catalog row `{name}` has no value for `{key}`")]
    MalformedRow { name: String, key: &'static str },

    #[error("song not found: {0}")]
    SongNotFound(SongIdentity),

    #[error("invalid collection name: {name:?}")]
    InvalidCollection { name: String },
}
