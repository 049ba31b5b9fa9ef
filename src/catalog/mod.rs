pub mod memory;
pub mod search;
pub mod storage;

use crate::song::{CatalogRow, FeatureVector, Song, SongIdentity};
use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryCatalog;
pub use search::search_songs;
pub use storage::Storage;

/// Read side of the song store the recommender runs against.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Every catalog song, in the store's natural order.
    async fn songs(&self) -> Result<Vec<Song>>;

    /// Raw rows of a named sub-collection. Rows may have missing columns.
    async fn collection(&self, name: &str) -> Result<Vec<CatalogRow>>;

    async fn features(&self, identity: &SongIdentity) -> Result<Option<FeatureVector>> {
        Ok(self
            .songs()
            .await?
            .into_iter()
            .find(|song| &song.identity == identity)
            .map(|song| song.features))
    }
}
