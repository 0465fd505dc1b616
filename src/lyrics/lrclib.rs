//! Synced-lyrics lookup against the lrclib.net API.

use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use super::{parse_synced, LyricTrack, TrackKey};

const API_URL: &str = "https://lrclib.net/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Tolerated mismatch between the player-reported and catalog durations.
const DURATION_TOLERANCE_SECS: f64 = 2.0;

#[derive(Debug, Deserialize)]
struct LrclibTrack {
    id: i64,
    duration: Option<f64>,
    #[serde(default)]
    instrumental: bool,
    #[serde(rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
}

impl LrclibTrack {
    fn synced(&self) -> Option<&str> {
        if self.instrumental {
            return None;
        }
        self.synced_lyrics.as_deref().filter(|s| !s.trim().is_empty())
    }
}

pub struct LyricsClient {
    http: reqwest::Client,
}

impl LyricsClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(concat!("waypill/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("Failed to build lyrics HTTP client")?,
        })
    }

    /// Look up a synced lyric track. An empty track means the catalog had
    /// nothing usable; an error means the lookup itself failed.
    pub async fn fetch(
        &self,
        key: &TrackKey,
        album: Option<&str>,
        duration_secs: Option<u64>,
    ) -> Result<LyricTrack> {
        if let Some(track) = self.fetch_exact(key, album, duration_secs).await? {
            return Ok(track);
        }
        self.search(key, duration_secs).await
    }

    /// `GET /get` with the full metadata key; `None` on a catalog miss.
    async fn fetch_exact(
        &self,
        key: &TrackKey,
        album: Option<&str>,
        duration_secs: Option<u64>,
    ) -> Result<Option<LyricTrack>> {
        let mut url = format!(
            "{API_URL}/get?track_name={}&artist_name={}",
            urlencoding::encode(key.title()),
            urlencoding::encode(key.artist()),
        );
        if let Some(album) = album {
            use std::fmt::Write as _;
            let _ = write!(url, "&album_name={}", urlencoding::encode(album));
        }
        if let Some(duration) = duration_secs {
            use std::fmt::Write as _;
            let _ = write!(url, "&duration={duration}");
        }

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("lrclib get request failed")?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let track: LrclibTrack = response
            .error_for_status()
            .context("lrclib get returned an error status")?
            .json()
            .await
            .context("Failed to decode lrclib get response")?;

        tracing::debug!(id = track.id, "lrclib exact match");
        Ok(Some(
            track.synced().map(parse_synced).unwrap_or_default(),
        ))
    }

    /// `GET /search` fallback; picks the synced result closest in duration.
    async fn search(&self, key: &TrackKey, duration_secs: Option<u64>) -> Result<LyricTrack> {
        let url = format!(
            "{API_URL}/search?q={}",
            urlencoding::encode(&format!("{} {}", key.artist(), key.title())),
        );

        let results: Vec<LrclibTrack> = self
            .http
            .get(&url)
            .send()
            .await
            .context("lrclib search request failed")?
            .error_for_status()
            .context("lrclib search returned an error status")?
            .json()
            .await
            .context("Failed to decode lrclib search response")?;

        match best_match(&results, duration_secs) {
            Some(track) => {
                tracing::debug!(id = track.id, "lrclib search match");
                Ok(track.synced().map(parse_synced).unwrap_or_default())
            }
            None => Ok(LyricTrack::default()),
        }
    }
}

/// Among synced results, prefer the one closest to the expected duration,
/// dropping anything outside the tolerance when a duration is known.
fn best_match(results: &[LrclibTrack], duration_secs: Option<u64>) -> Option<&LrclibTrack> {
    let candidates = results.iter().filter(|r| r.synced().is_some());
    match duration_secs {
        Some(expected) => {
            let expected = expected as f64;
            candidates
                .filter_map(|r| {
                    let gap = (r.duration? - expected).abs();
                    (gap <= DURATION_TOLERANCE_SECS).then_some((r, gap))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(r, _)| r)
        }
        None => candidates.min_by_key(|r| r.id),
    }
}
