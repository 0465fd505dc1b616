use serde::Serialize;
use std::io::{self, Write};

use crate::{player::PlayerState, sync::CurrentLine};

/// A structure that can be serialized to JSON and parsed by Waybar.
#[derive(Serialize, Debug, Default)]
pub struct StatusModule {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tooltip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    percentage: Option<usize>,
}

impl StatusModule {
    /// Create a new module with the given contents.
    pub fn new(
        text: Option<&str>,
        alt: Option<&str>,
        tooltip: Option<&str>,
        class: Option<&str>,
        percentage: Option<usize>,
    ) -> Self {
        Self {
            text: text.map(html_escape::encode_text).map(String::from),
            alt: alt.map(html_escape::encode_text).map(String::from),
            tooltip: tooltip.map(html_escape::encode_text).map(String::from),
            class: class.map(html_escape::encode_text).map(String::from),
            percentage,
        }
    }

    /// The terminal no-player state: a `Stopped` module with empty fields.
    #[must_use]
    pub fn idle() -> Self {
        Self::new(Some(""), Some("Stopped"), None, Some("stopped"), None)
    }

    /// Render the active player. The lyric line, when one is displayed,
    /// takes the text slot; the track summary moves to the tooltip.
    #[must_use]
    pub fn for_player(
        state: &PlayerState,
        art: Option<&str>,
        lyric: Option<&CurrentLine>,
    ) -> Self {
        let summary = track_summary(state);
        let text = match lyric {
            Some(line) => line.text.clone(),
            None => summary.clone().unwrap_or_default(),
        };

        let mut tooltip = String::new();
        if let Some(identity) = state.identity.as_deref() {
            tooltip.push_str(identity);
        }
        if let Some(summary) = &summary {
            if !tooltip.is_empty() {
                tooltip.push('\n');
            }
            tooltip.push_str(summary);
        }
        if let Some(album) = state.metadata.album.as_deref().filter(|a| !a.is_empty()) {
            if !tooltip.is_empty() {
                tooltip.push('\n');
            }
            tooltip.push_str(album);
        }
        if let Some(art) = art {
            if !tooltip.is_empty() {
                tooltip.push('\n');
            }
            tooltip.push_str(art);
        }

        let status = state.status.as_str();
        Self::new(
            Some(&text),
            Some(status),
            (!tooltip.is_empty()).then_some(tooltip.as_str()),
            Some(&status.to_lowercase()),
            state.volume.map(|v| (v.clamp(0.0, 1.0) * 100.0) as usize),
        )
    }

    /// Format the module as JSON and write it to the given writer.
    ///
    /// # Errors
    ///
    /// This function will return an error if writing to the given writer fails.
    ///
    /// # Panics
    ///
    /// This function will panic if serializing the module fails (which should never happen).
    pub fn format<T: Write>(&self, mut f: &mut T) -> io::Result<()> {
        serde_json::to_writer(&mut f, self)?;
        f.write_all(b"\n")?;
        Ok(())
    }

    /// Print the module to stdout.
    ///
    /// # Errors
    ///
    /// This function will return an error if writing to stdout fails.
    pub fn print(&self) -> io::Result<()> {
        self.format(&mut io::stdout().lock())
    }
}

fn track_summary(state: &PlayerState) -> Option<String> {
    let title = state.metadata.title()?;
    Some(match state.metadata.artist_line() {
        Some(artists) => format!("{title} - {artists}"),
        None => title.to_owned(),
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::{
        metadata::TrackMetadata,
        player::{PlaybackStatus, PlayerState},
    };
    use std::time::Instant;

    #[test]
    fn test_format() {
        let module = StatusModule {
            text: Some("text".to_owned()),
            alt: Some("alt".to_owned()),
            tooltip: Some("tooltip".to_owned()),
            class: Some("class".to_owned()),
            percentage: Some(50),
        };
        let mut buf = Vec::new();
        module.format(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "{\"text\":\"text\",\"alt\":\"alt\",\"tooltip\":\"tooltip\",\"class\":\"class\",\"percentage\":50}\n"
        );
    }

    #[test]
    fn test_missing_fields() {
        let module = StatusModule {
            text: None,
            alt: None,
            tooltip: None,
            class: None,
            percentage: None,
        };
        let mut buf = Vec::new();
        module.format(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "{}\n");
    }

    fn state() -> PlayerState {
        let now = Instant::now();
        PlayerState {
            status: PlaybackStatus::Playing,
            metadata: TrackMetadata {
                title: Some("Title".to_owned()),
                artists: vec!["Artist".to_owned()],
                ..Default::default()
            },
            volume: Some(0.8),
            shuffle: None,
            loop_status: None,
            identity: Some("Test Player".to_owned()),
            position: 0,
            position_at: now,
            last_playing: Some(now),
            last_seen: now,
        }
    }

    #[test]
    fn player_module_without_lyric_shows_track() {
        let module = StatusModule::for_player(&state(), None, None);
        assert_eq!(module.text.as_deref(), Some("Title - Artist"));
        assert_eq!(module.alt.as_deref(), Some("Playing"));
        assert_eq!(module.class.as_deref(), Some("playing"));
        assert_eq!(module.percentage, Some(80));
    }

    #[test]
    fn lyric_line_takes_the_text_slot() {
        let line = CurrentLine {
            text: "la la la".to_owned(),
            duration: std::time::Duration::from_secs(3),
        };
        let module = StatusModule::for_player(&state(), None, Some(&line));
        assert_eq!(module.text.as_deref(), Some("la la la"));
        assert!(module.tooltip.as_deref().unwrap().contains("Title - Artist"));
    }

    #[test]
    fn idle_module_is_stopped() {
        let module = StatusModule::idle();
        assert_eq!(module.alt.as_deref(), Some("Stopped"));
        assert_eq!(module.text.as_deref(), Some(""));
    }
}
