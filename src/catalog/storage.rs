// storage protocol:
// songs/count -> count of catalog songs
// songs/[i]/name -> song name
// songs/[i]/artists -> artists, comma separated
// songs/[i]/release_date -> release date as given
// songs/[i]/features -> 9 f32, little endian, in FEATURE_KEYS order
// collections/[c]/count -> count of rows in sub-collection c
// collections/[c]/[i]/name -> row name
// collections/[c]/[i]/features -> 9 f32, NaN where the column is missing
//
// counts are written last, so a reader never sees a half written row.
// writes are mutually exclusive, reads may run alongside a write

use super::Catalog;
use crate::error::RecommendError;
use crate::song::{CatalogRow, FeatureVector, Song, SongIdentity, FEATURE_DIM};
use anyhow::Result;
use async_trait::async_trait;
use byteorder::{ByteOrder, LittleEndian};
use opendal::services::Sled;
use opendal::{ErrorKind, Operator};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

const FEATURES_LEN: usize = FEATURE_DIM * 4;

#[derive(Clone)]
pub struct Storage {
    operator: Operator,
    write_lock: Arc<Mutex<()>>,
}

impl Storage {
    pub fn open(datadir: impl AsRef<Path>) -> Result<Self> {
        let datadir = datadir.as_ref();
        let mut builder = Sled::default();
        builder.datadir(&datadir.to_string_lossy());

        let operator = Operator::new(builder)?.finish();
        info!("storage opened at {}", datadir.display());
        Ok(Storage {
            operator,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub async fn insert_song(&self, song: &Song) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let index = self.count("songs/count").await?;
        let prefix = format!("songs/{}", index);
        let identity = &song.identity;

        self.operator
            .write(&format!("{}/name", prefix), identity.name.clone())
            .await?;
        self.operator
            .write(&format!("{}/artists", prefix), identity.artists.clone())
            .await?;
        self.operator
            .write(
                &format!("{}/release_date", prefix),
                identity.release_date.clone(),
            )
            .await?;
        self.operator
            .write(
                &format!("{}/features", prefix),
                float_to_bytes(song.features.as_slice()),
            )
            .await?;
        self.operator
            .write("songs/count", (index + 1).to_be_bytes().to_vec())
            .await?;
        debug!("store song: {}, {}", index, identity);

        Ok(index)
    }

    pub async fn insert_row(&self, collection: &str, row: &CatalogRow) -> Result<usize> {
        check_collection(collection)?;
        let _guard = self.write_lock.lock().await;
        let count_key = format!("collections/{}/count", collection);
        let index = self.count(&count_key).await?;
        let prefix = format!("collections/{}/{}", collection, index);

        let values = row.features.map(|f| f.unwrap_or(f32::NAN));
        self.operator
            .write(&format!("{}/name", prefix), row.name.clone())
            .await?;
        self.operator
            .write(&format!("{}/features", prefix), float_to_bytes(&values))
            .await?;
        self.operator
            .write(&count_key, (index + 1).to_be_bytes().to_vec())
            .await?;
        debug!("store row: {}/{}, {}", collection, index, row.name);

        Ok(index)
    }

    pub async fn load_songs(&self) -> Result<Vec<Song>> {
        let count = self.count("songs/count").await?;
        let mut songs = Vec::with_capacity(count);
        for i in 0..count {
            let prefix = format!("songs/{}", i);
            let identity = SongIdentity {
                name: self.read_string(&format!("{}/name", prefix)).await?,
                artists: self.read_string(&format!("{}/artists", prefix)).await?,
                release_date: self
                    .read_string(&format!("{}/release_date", prefix))
                    .await?,
            };
            let bytes = self.operator.read(&format!("{}/features", prefix)).await?;
            if bytes.len() != FEATURES_LEN {
                return Err(anyhow::anyhow!(
                    "song {} has {} feature bytes, expected {}",
                    i,
                    bytes.len(),
                    FEATURES_LEN
                ));
            }
            let mut values = [0f32; FEATURE_DIM];
            LittleEndian::read_f32_into(&bytes, &mut values);
            songs.push(Song {
                identity,
                features: FeatureVector(values),
            });
        }
        debug!("load songs: {}", songs.len());

        Ok(songs)
    }

    pub async fn load_collection(&self, collection: &str) -> Result<Vec<CatalogRow>> {
        check_collection(collection)?;
        let count = self
            .count(&format!("collections/{}/count", collection))
            .await?;
        let mut rows = Vec::with_capacity(count);
        for i in 0..count {
            let prefix = format!("collections/{}/{}", collection, i);
            let name = self.read_string(&format!("{}/name", prefix)).await?;
            let bytes = self.operator.read(&format!("{}/features", prefix)).await?;
            rows.push(CatalogRow {
                name,
                features: decode_row(&bytes),
            });
        }
        debug!("load collection {}: {} rows", collection, rows.len());

        Ok(rows)
    }

    async fn count(&self, key: &str) -> Result<usize> {
        count_decode(self.operator.read(key).await)
    }

    async fn read_string(&self, key: &str) -> Result<String> {
        Ok(string_decode(&self.operator.read(key).await?))
    }
}

#[async_trait]
impl Catalog for Storage {
    async fn songs(&self) -> Result<Vec<Song>> {
        self.load_songs().await
    }

    async fn collection(&self, name: &str) -> Result<Vec<CatalogRow>> {
        self.load_collection(name).await
    }
}

fn check_collection(name: &str) -> Result<(), RecommendError> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(RecommendError::InvalidCollection {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Wrong length means the row is unreadable: every column counts as missing.
fn decode_row(bytes: &[u8]) -> [Option<f32>; FEATURE_DIM] {
    if bytes.len() != FEATURES_LEN {
        return [None; FEATURE_DIM];
    }
    let mut values = [0f32; FEATURE_DIM];
    LittleEndian::read_f32_into(bytes, &mut values);
    values.map(|v| if v.is_nan() { None } else { Some(v) })
}

/// An absent count means an empty list. Any other read failure is an error.
fn count_decode(read: opendal::Result<Vec<u8>>) -> Result<usize> {
    match read {
        Ok(bytes) => usize_decode(&bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn usize_decode(data: &[u8]) -> Result<usize> {
    let bytes: [u8; std::mem::size_of::<usize>()] = data
        .try_into()
        .map_err(|_| anyhow::anyhow!("bad count of {} bytes", data.len()))?;
    Ok(usize::from_be_bytes(bytes))
}

fn string_decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}

fn float_to_bytes(float_vec: &[f32]) -> Vec<u8> {
    let mut byte_vec = vec![0u8; float_vec.len() * 4];
    LittleEndian::write_f32_into(float_vec, &mut byte_vec);
    byte_vec
}
