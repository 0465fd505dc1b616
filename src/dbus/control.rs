//! The small D-Bus service waypill exports: transport actions operating on
//! the currently active player, and the push endpoint external lyric
//! providers feed.

use anyhow::{Context as _, Result};
use serde::Deserialize;
use tokio::sync::mpsc;
use zbus::{object_server::SignalEmitter, Connection};

pub const WELL_KNOWN_NAME: &str = "io.github.waypill.Waypill";
pub const OBJECT_PATH: &str = "/io/github/waypill/Waypill";

/// Transport actions, all resolved against the active player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerAction {
    PlayPause,
    Next,
    Previous,
    ToggleShuffle,
    ToggleLoop,
    Raise,
}

/// A single lyric line pushed by an external provider.
#[derive(Debug, Deserialize, PartialEq)]
pub struct LyricPush {
    /// Matched as a substring of the active player's bus name.
    pub sender: String,
    pub content: String,
    /// Display duration in seconds.
    #[serde(default)]
    pub time: f64,
}

#[derive(Debug)]
pub enum ControlEvent {
    Action(PlayerAction),
    Lyric(LyricPush),
    LyricsEnabled(bool),
    Liked(bool),
}

struct ControlService {
    events: mpsc::Sender<ControlEvent>,
}

impl ControlService {
    async fn send(&self, event: ControlEvent) {
        if self.events.send(event).await.is_err() {
            tracing::error!("Control event receiver closed");
        }
    }
}

#[zbus::interface(name = "io.github.waypill.Waypill")]
impl ControlService {
    async fn play_pause(&self) {
        self.send(ControlEvent::Action(PlayerAction::PlayPause)).await;
    }

    async fn next(&self) {
        self.send(ControlEvent::Action(PlayerAction::Next)).await;
    }

    async fn previous(&self) {
        self.send(ControlEvent::Action(PlayerAction::Previous)).await;
    }

    async fn toggle_shuffle(&self) {
        self.send(ControlEvent::Action(PlayerAction::ToggleShuffle))
            .await;
    }

    async fn toggle_loop(&self) {
        self.send(ControlEvent::Action(PlayerAction::ToggleLoop)).await;
    }

    async fn raise(&self) {
        self.send(ControlEvent::Action(PlayerAction::Raise)).await;
    }

    /// Receive a pushed lyric line as a JSON `{sender, content, time}`
    /// payload. A malformed payload is logged and otherwise ignored.
    async fn update_lyric(&self, payload: &str) {
        match parse_lyric_push(payload) {
            Ok(push) => self.send(ControlEvent::Lyric(push)).await,
            Err(e) => tracing::warn!(?e, "Discarding malformed lyric push"),
        }
    }

    /// Toggle the lyrics feature at runtime. Disabling clears the display
    /// immediately.
    async fn set_lyrics_enabled(&self, enabled: bool) {
        self.send(ControlEvent::LyricsEnabled(enabled)).await;
    }

    /// Passthrough for players that track a liked state.
    async fn like_this_track(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
        liked: bool,
    ) -> zbus::fdo::Result<()> {
        self.send(ControlEvent::Liked(liked)).await;
        Self::update_liked_status(&emitter).await?;
        Ok(())
    }

    #[zbus(signal)]
    async fn update_liked_status(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;
}

fn parse_lyric_push(payload: &str) -> Result<LyricPush> {
    serde_json::from_str(payload).context("Failed to parse lyric push payload")
}

/// Register the control object and claim the well-known name.
pub async fn serve(conn: &Connection, events: mpsc::Sender<ControlEvent>) -> Result<()> {
    conn.object_server()
        .at(OBJECT_PATH, ControlService { events })
        .await
        .context("Failed to register control object")?;
    conn.request_name(WELL_KNOWN_NAME)
        .await
        .context("Failed to own the control bus name")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_push_payload() {
        let push = parse_lyric_push(r#"{"sender":"osdlyrics","content":"la la","time":3.5}"#)
            .unwrap();
        assert_eq!(
            push,
            LyricPush {
                sender: "osdlyrics".to_owned(),
                content: "la la".to_owned(),
                time: 3.5,
            }
        );
    }

    #[test]
    fn duration_is_optional() {
        let push = parse_lyric_push(r#"{"sender":"x","content":""}"#).unwrap();
        assert_eq!(push.time, 0.0);
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(parse_lyric_push("not json").is_err());
        assert!(parse_lyric_push(r#"{"content":"missing sender"}"#).is_err());
    }
}
