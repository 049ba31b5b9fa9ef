use super::cluster::{KMeans, DEFAULT_MAX_ITER};
use super::matching::Retriever;
use crate::error::Result;
use crate::song::{feature_matrix, record::Record, FeatureVector, RecommendationRecord};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;

/// Clusters a playlist and asks the retriever for songs near each centroid.
///
/// Output keeps centroid order. Two centroids may resolve to the same song;
/// duplicates are kept. Any failed retrieval fails the whole call.
#[derive(Clone)]
pub struct Recommender {
    retriever: Arc<dyn Retriever>,
    seed: u64,
    max_iter: usize,
    concurrent: bool,
}

impl Recommender {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            seed: 0,
            max_iter: DEFAULT_MAX_ITER,
            concurrent: true,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Run centroid retrievals one after another instead of all at once.
    pub fn with_concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub async fn recommend(&self, playlist: &[Record], n: usize) -> Result<Vec<RecommendationRecord>> {
        let vectors = feature_matrix(playlist)?;
        self.recommend_vectors(&vectors, n).await
    }

    pub async fn recommend_vectors(
        &self,
        vectors: &[FeatureVector],
        n: usize,
    ) -> Result<Vec<RecommendationRecord>> {
        // cluster
        let start = Instant::now();
        let clustering = KMeans::new(n)
            .with_seed(self.seed)
            .with_max_iter(self.max_iter)
            .fit(vectors)?;
        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "cluster {} songs into {} centroids spends {}s, iterations: {}",
            vectors.len(),
            n,
            elapsed,
            clustering.iterations
        );

        // match
        let start = Instant::now();
        let per_centroid = if self.concurrent {
            try_join_all(
                clustering
                    .centroids
                    .iter()
                    .map(|centroid| self.retriever.retrieve(centroid)),
            )
            .await?
        } else {
            let mut results = Vec::with_capacity(clustering.centroids.len());
            for centroid in clustering.centroids.iter() {
                results.push(self.retriever.retrieve(centroid).await?);
            }
            results
        };
        let recommendations = per_centroid.into_iter().flatten().collect::<Vec<_>>();
        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "match {} centroids spends {}s, recommendations: {}",
            clustering.centroids.len(),
            elapsed,
            recommendations.len()
        );

        Ok(recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, MemoryCatalog};
    use crate::error::RecommendError;
    use crate::recommend::CosineRetriever;
    use crate::song::record::tests::playlist_example;
    use crate::song::{CatalogRow, Song, SongIdentity};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn catalog() -> MemoryCatalog {
        let songs = [
            ("Shake It Off", [0.0647, 0.647, 0.8, 0., 0.334, -5.384, 0.165, 160.078, 0.942]),
            ("Clean", [0.232, 0.808, 0.377, 0.0049, 0.1, -7.754, 0.0646, 103.97, 0.211]),
            ("Style", [0.00245, 0.588, 0.791, 0.00258, 0.118, -5.595, 0.0402, 94.981, 0.487]),
            ("All Too Well", [0.274, 0.44, 0.528, 0., 0.234, -7.809, 0.0317, 93.844, 0.132]),
        ];
        MemoryCatalog::new(
            songs
                .iter()
                .map(|(name, features)| Song {
                    identity: SongIdentity::new(*name, "Taylor Swift", "2014-10-27"),
                    features: FeatureVector(*features),
                })
                .collect(),
        )
    }

    fn recommender() -> Recommender {
        Recommender::new(Arc::new(CosineRetriever::new(Arc::new(catalog()))))
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl Retriever for Counting {
        async fn retrieve(&self, vector: &FeatureVector) -> Result<Vec<RecommendationRecord>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(call) {
                return Err(RecommendError::Retrieval(anyhow::anyhow!("connection refused")));
            }
            Ok(vec![RecommendationRecord {
                name: tempo_name(vector),
                score: 1.0,
            }])
        }
    }

    fn tempo_name(vector: &FeatureVector) -> String {
        format!("tempo {:.3}", vector.get("tempo").unwrap_or_default())
    }

    struct Unreachable;

    #[async_trait]
    impl Catalog for Unreachable {
        async fn songs(&self) -> anyhow::Result<Vec<Song>> {
            Err(anyhow::anyhow!("store unreachable"))
        }

        async fn collection(&self, _name: &str) -> anyhow::Result<Vec<CatalogRow>> {
            Err(anyhow::anyhow!("store unreachable"))
        }
    }

    #[tokio::test]
    async fn playlist_of_four_gives_three_records() {
        let found = recommender().recommend(&playlist_example(), 3).await.unwrap();
        assert_eq!(found.len(), 3);
        for record in &found {
            assert!((-1.0..=1.0).contains(&record.score));
        }
    }

    #[tokio::test]
    async fn same_seed_same_output() {
        let a = recommender().with_seed(9).recommend(&playlist_example(), 3).await.unwrap();
        let b = recommender().with_seed(9).recommend(&playlist_example(), 3).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn sequential_matches_concurrent() {
        let a = recommender().recommend(&playlist_example(), 4).await.unwrap();
        let b = recommender()
            .with_concurrent(false)
            .recommend(&playlist_example(), 4)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn keeps_centroid_order_and_duplicates() {
        // every centroid points the same way, so all resolve to one song
        let vectors = [1.0f32, 2.0, 3.0].map(|s| {
            FeatureVector([0.1 * s, 0.5 * s, 0.5 * s, 0., 0.1 * s, -5. * s, 0.05 * s, 120. * s, 0.4 * s])
        });
        let only = MemoryCatalog::new(vec![Song {
            identity: SongIdentity::new("Style", "Taylor Swift", "2014-10-27"),
            features: vectors[0],
        }]);
        let found = Recommender::new(Arc::new(CosineRetriever::new(Arc::new(only))))
            .recommend_vectors(&vectors, 3)
            .await
            .unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|r| r.name == "Style"));

        let counting = Arc::new(Counting::default());
        let found = Recommender::new(counting.clone())
            .with_concurrent(false)
            .recommend_vectors(&vectors, 3)
            .await
            .unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 3);
        assert_eq!(found.len(), 3);
    }

    #[tokio::test]
    async fn output_follows_centroid_order() {
        let vectors = feature_matrix(&playlist_example()).unwrap();
        for seed in [0, 3, 11] {
            let centroids = KMeans::new(3).with_seed(seed).fit(&vectors).unwrap().centroids;
            let expected = centroids.iter().map(tempo_name).collect::<Vec<_>>();

            for concurrent in [true, false] {
                let found = Recommender::new(Arc::new(Counting::default()))
                    .with_seed(seed)
                    .with_concurrent(concurrent)
                    .recommend_vectors(&vectors, 3)
                    .await
                    .unwrap();
                let names = found.into_iter().map(|r| r.name).collect::<Vec<_>>();
                assert_eq!(names, expected, "seed {}", seed);
            }
        }
    }

    #[tokio::test]
    async fn centroids_without_a_match_add_nothing() {
        // with k = N every song is its own centroid, and the silent one matches nothing
        let silent = FeatureVector::default();
        let loud = FeatureVector([0.2, 0.5, 0.5, 0., 0.1, -5., 0.05, 120., 0.4]);
        let slow = FeatureVector([0.8, 0.3, 0.2, 0., 0.1, -12., 0.03, 70., 0.2]);
        let found = recommender()
            .recommend_vectors(&[silent, loud, slow], 3)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn missing_feature_fails_before_clustering() {
        let mut playlist = playlist_example();
        playlist[2].remove("speechiness");
        let counting = Arc::new(Counting::default());

        let result = Recommender::new(counting.clone()).recommend(&playlist, 3).await;
        assert!(matches!(
            result,
            Err(RecommendError::MissingFeature { key: "speechiness" })
        ));
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_sizes_are_rejected() {
        assert!(matches!(
            recommender().recommend(&playlist_example(), 5).await,
            Err(RecommendError::ClusterCount { k: 5, n: 4 })
        ));
        assert!(matches!(
            recommender().recommend(&[], 1).await,
            Err(RecommendError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn one_failed_retrieval_fails_the_call() {
        let failing = Arc::new(Counting {
            fail_on: Some(1),
            ..Default::default()
        });
        let result = Recommender::new(failing)
            .with_concurrent(false)
            .recommend(&playlist_example(), 3)
            .await;
        assert!(matches!(result, Err(RecommendError::Retrieval(_))));

        let unreachable = Recommender::new(Arc::new(CosineRetriever::new(Arc::new(Unreachable))));
        let err = unreachable.recommend(&playlist_example(), 2).await.unwrap_err();
        assert!(matches!(err, RecommendError::Retrieval(_)));
        assert!(err.to_string().contains("store unreachable"));
    }
}
