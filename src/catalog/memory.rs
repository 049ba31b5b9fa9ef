use super::Catalog;
use crate::song::{CatalogRow, Song};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Catalog held entirely in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryCatalog {
    songs: Vec<Song>,
    collections: HashMap<String, Vec<CatalogRow>>,
}

impl MemoryCatalog {
    pub fn new(songs: Vec<Song>) -> Self {
        Self {
            songs,
            collections: HashMap::new(),
        }
    }

    pub fn with_collection(mut self, name: impl Into<String>, rows: Vec<CatalogRow>) -> Self {
        self.collections.insert(name.into(), rows);
        self
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn songs(&self) -> Result<Vec<Song>> {
        Ok(self.songs.clone())
    }

    async fn collection(&self, name: &str) -> Result<Vec<CatalogRow>> {
        Ok(self.collections.get(name).cloned().unwrap_or_default())
    }
}
