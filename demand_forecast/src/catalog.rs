//! Track catalog metadata

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Catalog entity a demand history is generated for; never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique track identifier
    pub track_id: String,
    /// Genre bucket used for per-genre evaluation
    pub genre: String,
    /// Popularity on a 0..=100 scale
    pub popularity_score: f64,
    /// Track length in seconds
    pub duration_seconds: u32,
    /// Release date of the track
    pub release_date: NaiveDate,
    /// Owning artist
    pub artist_id: String,
    /// Display name, when the catalog provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_name: Option<String>,
}

/// Catalog row as it appears on disk; every attribute may be absent
#[derive(Debug, Deserialize)]
struct CatalogRecord {
    track_id: Option<String>,
    genre: Option<String>,
    popularity_score: Option<f64>,
    duration_seconds: Option<u32>,
    release_date: Option<String>,
    artist_id: Option<String>,
    #[serde(default)]
    track_name: Option<String>,
}

impl CatalogRecord {
    fn into_track(self, row: usize) -> Result<Track> {
        let missing = |field: &str| {
            ForecastError::ConfigError(format!(
                "Catalog row {} is missing required attribute '{}'",
                row, field
            ))
        };
        let non_blank = |value: Option<String>, field: &str| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| missing(field))
        };

        let track_id = non_blank(self.track_id, "track_id")?;
        let genre = non_blank(self.genre, "genre")?;
        let artist_id = non_blank(self.artist_id, "artist_id")?;
        let popularity_score = self
            .popularity_score
            .ok_or_else(|| missing("popularity_score"))?;
        let duration_seconds = self
            .duration_seconds
            .ok_or_else(|| missing("duration_seconds"))?;
        let release_raw = non_blank(self.release_date, "release_date")?;
        let release_date = NaiveDate::parse_from_str(&release_raw, "%Y-%m-%d").map_err(|e| {
            ForecastError::ConfigError(format!(
                "Catalog row {} has an invalid release_date '{}': {}",
                row, release_raw, e
            ))
        })?;

        let track = Track {
            track_id,
            genre,
            popularity_score,
            duration_seconds,
            release_date,
            artist_id,
            track_name: self.track_name.filter(|n| !n.trim().is_empty()),
        };
        track.check_attributes()?;
        Ok(track)
    }
}

impl Track {
    /// Check that every attribute needed for generation is usable
    pub fn check_attributes(&self) -> Result<()> {
        if self.track_id.trim().is_empty() {
            return Err(ForecastError::ConfigError(
                "Track is missing required attribute 'track_id'".to_string(),
            ));
        }
        if self.genre.trim().is_empty() {
            return Err(ForecastError::ConfigError(format!(
                "Track '{}' is missing required attribute 'genre'",
                self.track_id
            )));
        }
        if self.artist_id.trim().is_empty() {
            return Err(ForecastError::ConfigError(format!(
                "Track '{}' is missing required attribute 'artist_id'",
                self.track_id
            )));
        }
        if !self.popularity_score.is_finite() || !(0.0..=100.0).contains(&self.popularity_score)
        {
            return Err(ForecastError::ConfigError(format!(
                "Track '{}' has popularity_score {} outside 0..=100",
                self.track_id, self.popularity_score
            )));
        }
        Ok(())
    }
}

/// Read-only collection of catalog tracks
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tracks: Vec<Track>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids and unusable attributes
    pub fn new(tracks: Vec<Track>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(tracks.len());
        for track in &tracks {
            track.check_attributes()?;
            if !seen.insert(track.track_id.as_str()) {
                return Err(ForecastError::ConfigError(format!(
                    "Duplicate track_id '{}' in catalog",
                    track.track_id
                )));
            }
        }
        Ok(Self { tracks })
    }

    /// Load a catalog from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading track catalog from {}", path.display());
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut tracks = Vec::new();
        for (row, record) in reader.deserialize::<CatalogRecord>().enumerate() {
            tracks.push(record?.into_track(row + 1)?);
        }

        let catalog = Self::new(tracks)?;
        info!("Loaded {} tracks from catalog", catalog.len());
        Ok(catalog)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Look a track up by id
    pub fn get(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    /// Map from track id to genre, used for per-genre metric buckets
    pub fn genre_index(&self) -> BTreeMap<String, String> {
        self.tracks
            .iter()
            .map(|t| (t.track_id.clone(), t.genre.clone()))
            .collect()
    }

    /// Deterministically keep `n` tracks, ordered by id
    ///
    /// Catalogs no larger than `n` are returned unchanged.
    pub fn sample(&self, n: usize, seed: u64) -> Self {
        if self.tracks.len() <= n {
            return self.clone();
        }

        info!(
            "Sampling {} tracks from {} total tracks",
            n,
            self.tracks.len()
        );
        let mut sorted = self.tracks.clone();
        sorted.sort_by(|a, b| a.track_id.cmp(&b.track_id));
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picked: Vec<Track> = sorted.choose_multiple(&mut rng, n).cloned().collect();
        picked.sort_by(|a, b| a.track_id.cmp(&b.track_id));

        Self { tracks: picked }
    }
}
