use crate::song::{Song, SongIdentity};
use std::cmp::Ordering;
use strsim::jaro_winkler;

pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Case-insensitive substring search on name and, when given, artists.
/// Hits are ordered by how close the name is to the query, then catalog order.
pub fn search_songs(
    songs: &[Song],
    name: &str,
    artist: Option<&str>,
    limit: usize,
) -> Vec<SongIdentity> {
    let name_query = name.to_lowercase();
    let artist_query = artist.map(str::to_lowercase);

    let mut hits = songs
        .iter()
        .enumerate()
        .filter(|(_, song)| {
            let identity = &song.identity;
            identity.name.to_lowercase().contains(&name_query)
                && artist_query
                    .as_ref()
                    .map_or(true, |a| identity.artists.to_lowercase().contains(a))
        })
        .map(|(position, song)| {
            let lowered = song.identity.name.to_lowercase();
            let exact = lowered == name_query;
            let closeness = text_similarity(&name_query, &lowered);
            (exact, closeness, position, &song.identity)
        })
        .collect::<Vec<_>>();

    // exact names first, whatever the similarity metric says about prefixes
    hits.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
            .then_with(|| a.2.cmp(&b.2))
    });
    debug!("search {:?} by {:?}: {} hits", name, artist, hits.len());

    hits.into_iter()
        .take(limit)
        .map(|(_, _, _, identity)| identity.clone())
        .collect()
}

fn text_similarity(s1: &str, s2: &str) -> f32 {
    jaro_winkler(s1, s2) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::FeatureVector;

    fn catalog() -> Vec<Song> {
        [
            ("Love Story (Taylor's Version)", "Taylor Swift"),
            ("Love Story", "Taylor Swift"),
            ("Love Story", "Indila"),
            ("Style", "Taylor Swift"),
        ]
        .iter()
        .map(|(name, artists)| Song {
            identity: SongIdentity::new(*name, *artists, "2008-11-11"),
            features: FeatureVector::default(),
        })
        .collect()
    }

    #[test]
    fn matches_substrings_ignoring_case() {
        let hits = search_songs(&catalog(), "love story", None, DEFAULT_SEARCH_LIMIT);
        assert_eq!(hits.len(), 3);
        // exact name first, ties keep catalog order
        assert_eq!(hits[0].artists, "Taylor Swift");
        assert_eq!(hits[0].name, "Love Story");
        assert_eq!(hits[1].artists, "Indila");
        assert_eq!(hits[2].name, "Love Story (Taylor's Version)");
    }

    #[test]
    fn exact_title_beats_longer_title_with_same_prefix() {
        let songs = catalog()[..2].to_vec();
        let hits = search_songs(&songs, "Love Story", None, 1);
        assert_eq!(hits[0].name, "Love Story");

        // a substring from the middle of a title still matches
        let hits = search_songs(&catalog(), "story (taylor", None, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Love Story (Taylor's Version)");
    }

    #[test]
    fn filters_by_artist_and_limit() {
        let hits = search_songs(&catalog(), "STORY", Some("taylor"), 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].artists, "Taylor Swift");

        assert!(search_songs(&catalog(), "Shake It Off", None, 5).is_empty());
    }
}
