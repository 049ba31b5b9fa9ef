use super::{cosine_similarity, squared_distance};
use crate::catalog::Catalog;
use crate::error::{RecommendError, Result};
use crate::song::{CatalogRow, FeatureVector, RecommendationRecord, SongIdentity, FEATURE_DIM};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Finds catalog songs close to one feature vector.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, vector: &FeatureVector) -> Result<Vec<RecommendationRecord>>;
}

#[derive(Clone, Debug)]
struct Matched {
    name: String,
    score: f32,
    position: usize,
}

impl Matched {
    /// Highest similarity first. Ties go to the smaller name, then store order.
    fn by_similarity(a: &Self, b: &Self) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.position.cmp(&b.position))
    }

    /// Smallest distance first, same tie-break.
    fn by_distance(a: &Self, b: &Self) -> Ordering {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.position.cmp(&b.position))
    }
}

impl From<Matched> for RecommendationRecord {
    fn from(m: Matched) -> Self {
        RecommendationRecord {
            name: m.name,
            score: m.score,
        }
    }
}

/// Nearest catalog songs by cosine similarity over the whole catalog.
#[derive(Clone)]
pub struct CosineRetriever {
    catalog: Arc<dyn Catalog>,
    limit: usize,
}

impl CosineRetriever {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog, limit: 1 }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl Retriever for CosineRetriever {
    async fn retrieve(&self, vector: &FeatureVector) -> Result<Vec<RecommendationRecord>> {
        let start = Instant::now();
        let songs = self
            .catalog
            .songs()
            .await
            .map_err(RecommendError::Retrieval)?;

        // zero vectors have no direction and are never matched
        let mut matched = songs
            .into_iter()
            .enumerate()
            .filter_map(|(position, song)| {
                let similarity = cosine_similarity(vector.as_slice(), song.features.as_slice())?;
                debug!(
                    "position: {}, name: {}, similarity: {}",
                    position, song.identity.name, similarity
                );
                Some(Matched {
                    name: song.identity.name,
                    score: similarity,
                    position,
                })
            })
            .collect::<Vec<_>>();
        matched.sort_by(Matched::by_similarity);
        matched.truncate(self.limit);

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "cosine match spends {}s, matched: {:?}",
            elapsed,
            matched.iter().map(|m| &m.name).collect::<Vec<_>>()
        );

        Ok(matched.into_iter().map(Into::into).collect())
    }
}

/// What grouping does with a sub-collection row that lacks a column.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MalformedRowPolicy {
    #[default]
    Fail,
    Skip,
}

impl Display for MalformedRowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedRowPolicy::Fail => write!(f, "fail"),
            MalformedRowPolicy::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for MalformedRowPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(MalformedRowPolicy::Fail),
            "skip" => Ok(MalformedRowPolicy::Skip),
            other => Err(anyhow::anyhow!(
                "unknown malformed row policy {:?}, expected fail or skip",
                other
            )),
        }
    }
}

/// Averages rows sharing a name into one profile per name, in order of
/// first appearance.
pub fn group_profiles(
    rows: Vec<CatalogRow>,
    policy: MalformedRowPolicy,
) -> Result<Vec<(String, FeatureVector)>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, [f64; FEATURE_DIM], usize)> = Vec::new();

    for row in rows {
        let vector = match row.to_vector() {
            Some(vector) => vector,
            None => {
                let key = row.first_missing().unwrap_or_default();
                match policy {
                    MalformedRowPolicy::Fail => {
                        return Err(RecommendError::MalformedRow {
                            name: row.name,
                            key,
                        })
                    }
                    MalformedRowPolicy::Skip => {
                        debug!("skip row {} without {}", row.name, key);
                        continue;
                    }
                }
            }
        };
        let slot = *index.entry(row.name.clone()).or_insert_with(|| {
            groups.push((row.name, [0f64; FEATURE_DIM], 0));
            groups.len() - 1
        });
        let (_, sums, count) = &mut groups[slot];
        for (sum, x) in sums.iter_mut().zip(vector.0) {
            *sum += x as f64;
        }
        *count += 1;
    }

    Ok(groups
        .into_iter()
        .map(|(name, sums, count)| {
            let mean = sums.map(|s| (s / count as f64) as f32);
            (name, FeatureVector(mean))
        })
        .collect())
}

/// Closest songs of one sub-collection by squared Euclidean distance to the
/// per-name average profile.
#[derive(Clone)]
pub struct AggregateDistanceRetriever {
    catalog: Arc<dyn Catalog>,
    collection: String,
    limit: usize,
    policy: MalformedRowPolicy,
}

impl AggregateDistanceRetriever {
    pub fn new(catalog: Arc<dyn Catalog>, collection: impl Into<String>) -> Self {
        Self {
            catalog,
            collection: collection.into(),
            limit: 3,
            policy: MalformedRowPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MalformedRowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Looks the song up in the full catalog and matches its features.
    pub async fn closest_to(&self, identity: &SongIdentity) -> Result<Vec<RecommendationRecord>> {
        let features = self
            .catalog
            .features(identity)
            .await
            .map_err(RecommendError::Retrieval)?
            .ok_or_else(|| RecommendError::SongNotFound(identity.clone()))?;
        self.retrieve(&features).await
    }
}

#[async_trait]
impl Retriever for AggregateDistanceRetriever {
    async fn retrieve(&self, reference: &FeatureVector) -> Result<Vec<RecommendationRecord>> {
        let start = Instant::now();
        let rows = self
            .catalog
            .collection(&self.collection)
            .await
            .map_err(RecommendError::Retrieval)?;
        let row_count = rows.len();
        let profiles = group_profiles(rows, self.policy)?;

        let mut matched = profiles
            .into_iter()
            .enumerate()
            .map(|(position, (name, profile))| {
                let distance = squared_distance(reference.as_slice(), profile.as_slice());
                debug!("group: {}, distance: {}", name, distance);
                Matched {
                    name,
                    score: distance,
                    position,
                }
            })
            .collect::<Vec<_>>();
        let group_count = matched.len();
        matched.sort_by(Matched::by_distance);
        matched.truncate(self.limit);

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "distance match in {} ({} rows, {} groups) spends {}s",
            self.collection, row_count, group_count, elapsed
        );

        Ok(matched.into_iter().map(Into::into).collect())
    }
}
