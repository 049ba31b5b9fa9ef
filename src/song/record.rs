// Raw records arrive as JSON objects, one per song:
//
// {
//     "name": "Style",                      (catalog records only)
//     "artists": ["Taylor Swift"],          (string or list of strings)
//     "release_date": "2014-10-27",
//     "acousticness": 0.0024, ..., "valence": 0.456
// }
//
// Playlist records only need the nine feature keys.

use super::{CatalogRow, FeatureVector, Song, SongIdentity, FEATURE_DIM, FEATURE_KEYS};
use crate::error::{RecommendError, Result};
use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

impl TryFrom<&Record> for FeatureVector {
    type Error = RecommendError;

    fn try_from(record: &Record) -> Result<Self> {
        let mut values = [0f32; FEATURE_DIM];
        for (value, key) in values.iter_mut().zip(FEATURE_KEYS) {
            *value = match record.get(key) {
                None | Some(Value::Null) => return Err(RecommendError::MissingFeature { key }),
                Some(v) => v
                    .as_f64()
                    .ok_or(RecommendError::InvalidFeature { key })? as f32,
            };
        }
        Ok(FeatureVector(values))
    }
}

impl TryFrom<&Record> for SongIdentity {
    type Error = RecommendError;

    fn try_from(record: &Record) -> Result<Self> {
        let name = string_field(record, "name")?;
        let artists = match record.get("artists") {
            Some(Value::Array(list)) => list
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            _ => string_field(record, "artists")?,
        };
        let release_date = string_field(record, "release_date")?;
        Ok(SongIdentity {
            name,
            artists,
            release_date,
        })
    }
}

impl TryFrom<&Record> for Song {
    type Error = RecommendError;

    fn try_from(record: &Record) -> Result<Self> {
        Ok(Song {
            identity: record.try_into()?,
            features: record.try_into()?,
        })
    }
}

impl TryFrom<&Record> for CatalogRow {
    type Error = RecommendError;

    fn try_from(record: &Record) -> Result<Self> {
        let name = string_field(record, "name")?;
        let mut features = [None; FEATURE_DIM];
        for (feature, key) in features.iter_mut().zip(FEATURE_KEYS) {
            *feature = match record.get(key) {
                None | Some(Value::Null) => None,
                Some(v) => Some(v.as_f64().ok_or(RecommendError::InvalidFeature { key })? as f32),
            };
        }
        Ok(CatalogRow { name, features })
    }
}

fn string_field(record: &Record, key: &'static str) -> Result<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(RecommendError::MissingField { key })
}

/// Builds the N×9 matrix for a playlist. Fails on the first bad record.
pub fn feature_matrix(records: &[Record]) -> Result<Vec<FeatureVector>> {
    records.iter().map(FeatureVector::try_from).collect()
}

pub fn parse_songs(records: &[Record]) -> Result<Vec<Song>> {
    records.iter().map(Song::try_from).collect()
}

/// Sub-collection rows. Like [`parse_songs`], nothing is returned unless
/// every record parses.
pub fn parse_rows(records: &[Record]) -> Result<Vec<CatalogRow>> {
    records.iter().map(CatalogRow::try_from).collect()
}
