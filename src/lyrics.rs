//! Timed-text track model and parsing for synced lyrics.

#[cfg(test)]
mod tests;

pub mod lrclib;

use std::time::Duration;

use crate::metadata::TrackMetadata;

/// How long the final line stays up when no successor defines the gap.
pub const LAST_LINE_HOLD: Duration = Duration::from_secs(5);

/// Identifies the track a lyric set belongs to. Fetches completing under a
/// key that is no longer current are discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackKey {
    title: String,
    artist: String,
}

impl TrackKey {
    /// Key of the given track, if it has a usable title.
    #[must_use]
    pub fn of(metadata: &TrackMetadata) -> Option<Self> {
        Some(Self {
            title: metadata.title()?.to_owned(),
            artist: metadata.artist_line().unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn artist(&self) -> &str {
        &self.artist
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LyricLine {
    /// Offset from the start of the track.
    pub at: Duration,
    pub text: String,
}

/// An ordered set of timed lyric lines for one track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LyricTrack {
    lines: Vec<LyricLine>,
}

impl LyricTrack {
    #[must_use]
    pub fn new(mut lines: Vec<LyricLine>) -> Self {
        lines.sort_by_key(|l| l.at);
        Self { lines }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn line(&self, index: usize) -> Option<&LyricLine> {
        self.lines.get(index)
    }

    /// Index of the last line whose timestamp is at or before `position`, or
    /// [`None`] when the position precedes every line.
    #[must_use]
    pub fn index_at(&self, position: Duration) -> Option<usize> {
        let upper = self.lines.partition_point(|l| l.at <= position);
        upper.checked_sub(1)
    }

    /// How long the line at `index` should stay displayed: the gap to the
    /// next line, or [`LAST_LINE_HOLD`] for the final one.
    #[must_use]
    pub fn display_duration(&self, index: usize) -> Duration {
        match (self.lines.get(index), self.lines.get(index + 1)) {
            (Some(current), Some(next)) => next.at.saturating_sub(current.at),
            _ => LAST_LINE_HOLD,
        }
    }
}

/// Parse synced lyrics text of the form `[mm:ss.xx]line`, one or more tags
/// per line. Untagged lines are skipped.
#[must_use]
pub fn parse_synced(text: &str) -> LyricTrack {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let mut rest = raw.trim_start();
        let mut tags = Vec::with_capacity(1);
        while let Some((tag, after)) = rest
            .split_once(']')
            .and_then(|(tag, after)| tag.strip_prefix('[').map(|tag| (tag, after)))
        {
            let Some(at) = parse_timestamp(tag) else { break };
            tags.push(at);
            rest = after.trim_start();
        }
        if tags.is_empty() {
            continue;
        }
        for at in tags {
            lines.push(LyricLine {
                at,
                text: rest.trim().to_owned(),
            });
        }
    }
    LyricTrack::new(lines)
}

/// Parse a `mm:ss.xx` offset tag.
fn parse_timestamp(s: &str) -> Option<Duration> {
    let (minutes, seconds) = s.split_once(':')?;
    let minutes = minutes.trim().parse::<u64>().ok()?;
    let seconds = seconds.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs(minutes * 60) + Duration::from_secs_f64(seconds))
}
