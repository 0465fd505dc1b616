//! Keeps the displayed lyric line in step with the active player.
//!
//! The engine owns the fetched track for the current `(title, artist)` key
//! and a cursor over it. A 200 ms tick advances the cursor from the position
//! estimate; an externally pushed line suppresses the tick output until the
//! push feed reports empty content.

use std::time::{Duration, Instant};

use crate::{
    dbus::control::LyricPush,
    lyrics::{LyricTrack, TrackKey},
    player::{PlaybackStatus, PlayerState},
};

/// Cadence of the cursor-advancing tick.
pub const TICK_PERIOD: Duration = Duration::from_millis(200);
/// The authoritative position is re-queried at most this often.
const RESYNC_INTERVAL: Duration = Duration::from_millis(1000);

/// The line currently on display, with how long it is expected to stay.
#[derive(Clone, Debug, PartialEq)]
pub struct CurrentLine {
    pub text: String,
    pub duration: Duration,
}

/// What the caller should do after a tick.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickCommand {
    /// Re-query the active player's position to correct drift.
    pub resync: bool,
    /// The displayed line changed; re-render.
    pub changed: bool,
}

pub struct LyricsSync {
    enabled: bool,
    /// Key stamped when a fetch is issued. Never cleared on failure, so a
    /// fruitless key is not retried until the track changes.
    fetched_key: Option<TrackKey>,
    track: Option<LyricTrack>,
    cursor: Option<usize>,
    override_active: bool,
    last_resync: Option<Instant>,
    current: Option<CurrentLine>,
}

impl LyricsSync {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            fetched_key: None,
            track: None,
            cursor: None,
            override_active: false,
            last_resync: None,
            current: None,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The line currently on display, whether tick-derived or pushed.
    #[must_use]
    pub fn current_line(&self) -> Option<&CurrentLine> {
        self.current.as_ref()
    }

    /// Drop everything tied to the previous player: called when the winner
    /// changes or disappears.
    pub fn reset(&mut self) {
        self.fetched_key = None;
        self.track = None;
        self.cursor = None;
        self.override_active = false;
        self.last_resync = None;
        self.current = None;
    }

    /// Globally enable or disable the lyrics feature. Disabling clears the
    /// display and discards fetched state immediately.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.reset();
        }
    }

    /// Whether a fetch should be issued for this key.
    #[must_use]
    pub fn needs_fetch(&self, key: &TrackKey) -> bool {
        self.enabled && !self.override_active && self.fetched_key.as_ref() != Some(key)
    }

    /// Stamp the key and clear the previous track; the display goes blank
    /// until the fetch lands or the tick finds a line.
    pub fn begin_fetch(&mut self, key: TrackKey) {
        self.fetched_key = Some(key);
        self.track = None;
        self.cursor = None;
        self.current = None;
    }

    /// Accept a completed fetch. A completion whose key is no longer current
    /// is discarded; an empty track leaves the engine idle for this key.
    pub fn complete_fetch(&mut self, key: &TrackKey, track: LyricTrack) -> bool {
        if self.fetched_key.as_ref() != Some(key) {
            tracing::debug!(title = key.title(), "Discarding stale lyrics fetch");
            return false;
        }
        if track.is_empty() {
            tracing::debug!(title = key.title(), "No synced lyrics for this track");
            return false;
        }
        self.track = Some(track);
        self.cursor = None;
        true
    }

    /// Advance the cursor against the active player's position estimate.
    pub fn tick(&mut self, active: Option<&PlayerState>, now: Instant) -> TickCommand {
        let mut command = TickCommand::default();
        if !self.enabled || self.override_active {
            return command;
        }
        let Some(track) = &self.track else {
            return command;
        };
        let Some(player) = active else {
            return command;
        };
        if player.status != PlaybackStatus::Playing {
            return command;
        }

        if self
            .last_resync
            .is_none_or(|at| now.saturating_duration_since(at) >= RESYNC_INTERVAL)
        {
            self.last_resync = Some(now);
            command.resync = true;
        }

        let position = player.estimated_position(now);
        if let Some(index) = track.index_at(position) {
            // Unwrap: index_at returned an in-range index
            let line = track.line(index).unwrap();
            if self.cursor != Some(index) {
                self.cursor = Some(index);
                self.current = Some(CurrentLine {
                    text: line.text.clone(),
                    duration: track.display_duration(index),
                });
                command.changed = true;
            } else if let Some(current) = &self.current {
                // The line outlived its display window with no successor due
                // (only possible at the end of the track): take it down.
                if position > line.at + current.duration {
                    self.current = None;
                    command.changed = true;
                }
            }
        }
        command
    }

    /// Apply an externally pushed line. A non-empty line whose sender matches
    /// the active bus name takes over the display; anything else clears the
    /// override. With lyrics disabled this only clears the display.
    pub fn apply_push(&mut self, push: &LyricPush, active_bus: Option<&str>) {
        if !self.enabled {
            self.current = None;
            return;
        }
        let matches = !push.content.is_empty()
            && active_bus.is_some_and(|bus| bus.contains(&push.sender));
        if matches {
            self.override_active = true;
            self.current = Some(CurrentLine {
                text: push.content.clone(),
                duration: Duration::from_secs_f64(push.time.max(0.0)),
            });
        } else {
            self.override_active = false;
            self.current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lyrics::{parse_synced, LAST_LINE_HOLD},
        metadata::TrackMetadata,
    };

    const BUS: &str = "org.mpris.MediaPlayer2.mpv";

    fn playing(position_secs: u64, anchor: Instant) -> PlayerState {
        PlayerState {
            status: PlaybackStatus::Playing,
            metadata: TrackMetadata {
                title: Some("Song".to_owned()),
                ..Default::default()
            },
            volume: None,
            shuffle: None,
            loop_status: None,
            identity: None,
            position: i64::try_from(position_secs * 1_000_000).unwrap(),
            position_at: anchor,
            last_playing: Some(anchor),
            last_seen: anchor,
        }
    }

    fn key() -> TrackKey {
        TrackKey::of(&TrackMetadata {
            title: Some("Song".to_owned()),
            ..Default::default()
        })
        .unwrap()
    }

    fn other_key() -> TrackKey {
        TrackKey::of(&TrackMetadata {
            title: Some("Other".to_owned()),
            ..Default::default()
        })
        .unwrap()
    }

    fn loaded_engine() -> LyricsSync {
        let mut engine = LyricsSync::new(true);
        engine.begin_fetch(key());
        assert!(engine.complete_fetch(&key(), parse_synced("[00:10.00]first\n[00:12.00]second")));
        engine
    }

    #[test]
    fn tick_emits_line_with_gap_duration() {
        let t0 = Instant::now();
        let mut engine = loaded_engine();
        let player = playing(10, t0);

        let command = engine.tick(Some(&player), t0);
        assert!(command.changed);
        assert_eq!(
            engine.current_line().unwrap(),
            &CurrentLine {
                text: "first".to_owned(),
                duration: Duration::from_secs(2),
            }
        );

        // Same line on the next tick: nothing new to display.
        let command = engine.tick(Some(&player), t0 + TICK_PERIOD);
        assert!(!command.changed);

        // Past the last line: the fixed hold time applies.
        let command = engine.tick(Some(&player), t0 + Duration::from_secs(3));
        assert!(command.changed);
        assert_eq!(engine.current_line().unwrap().duration, LAST_LINE_HOLD);
    }

    #[test]
    fn final_line_expires_after_its_hold() {
        let t0 = Instant::now();
        let mut engine = loaded_engine();
        let player = playing(12, t0);

        assert!(engine.tick(Some(&player), t0).changed);
        assert_eq!(engine.current_line().unwrap().text, "second");

        // Line starts at 12s and holds for LAST_LINE_HOLD; at 18s it is done.
        let command = engine.tick(Some(&player), t0 + Duration::from_secs(6) + TICK_PERIOD);
        assert!(command.changed);
        assert_eq!(engine.current_line(), None);

        // And it stays down without flapping.
        let command = engine.tick(Some(&player), t0 + Duration::from_secs(7));
        assert!(!command.changed);
    }

    #[test]
    fn tick_requires_playing_player() {
        let t0 = Instant::now();
        let mut engine = loaded_engine();
        let mut player = playing(10, t0);
        player.status = PlaybackStatus::Paused;

        assert_eq!(engine.tick(Some(&player), t0), TickCommand::default());
        assert_eq!(engine.tick(None, t0), TickCommand::default());
    }

    #[test]
    fn resync_at_most_once_per_second() {
        let t0 = Instant::now();
        let mut engine = loaded_engine();
        let player = playing(10, t0);

        assert!(engine.tick(Some(&player), t0).resync);
        assert!(!engine.tick(Some(&player), t0 + Duration::from_millis(200)).resync);
        assert!(!engine.tick(Some(&player), t0 + Duration::from_millis(800)).resync);
        assert!(engine.tick(Some(&player), t0 + Duration::from_millis(1000)).resync);
    }

    #[test]
    fn stale_fetch_completion_is_discarded() {
        let mut engine = LyricsSync::new(true);
        engine.begin_fetch(key());
        engine.begin_fetch(other_key());

        assert!(!engine.complete_fetch(&key(), parse_synced("[00:01.00]stale")));
        let t0 = Instant::now();
        assert_eq!(engine.tick(Some(&playing(5, t0)), t0), TickCommand::default());
    }

    #[test]
    fn fruitless_key_is_not_retried() {
        let mut engine = LyricsSync::new(true);
        assert!(engine.needs_fetch(&key()));
        engine.begin_fetch(key());
        assert!(!engine.complete_fetch(&key(), LyricTrack::default()));

        // Still the same track: stay idle instead of hammering the provider.
        assert!(!engine.needs_fetch(&key()));
        assert!(engine.needs_fetch(&other_key()));
    }

    #[test]
    fn override_suppresses_tick_output() {
        let t0 = Instant::now();
        let mut engine = loaded_engine();
        let player = playing(10, t0);

        engine.apply_push(
            &LyricPush {
                sender: "mpv".to_owned(),
                content: "pushed line".to_owned(),
                time: 3.0,
            },
            Some(BUS),
        );
        assert_eq!(engine.current_line().unwrap().text, "pushed line");

        // A local line is due at this position, but the override wins.
        let command = engine.tick(Some(&player), t0);
        assert_eq!(command, TickCommand::default());
        assert_eq!(engine.current_line().unwrap().text, "pushed line");

        // Empty push re-arms polling.
        engine.apply_push(
            &LyricPush {
                sender: "mpv".to_owned(),
                content: String::new(),
                time: 0.0,
            },
            Some(BUS),
        );
        assert_eq!(engine.current_line(), None);
        let command = engine.tick(Some(&player), t0 + TICK_PERIOD);
        assert!(command.changed);
        assert_eq!(engine.current_line().unwrap().text, "first");
    }

    #[test]
    fn mismatched_sender_clears_instead_of_overriding() {
        let mut engine = loaded_engine();
        engine.apply_push(
            &LyricPush {
                sender: "spotify".to_owned(),
                content: "wrong player".to_owned(),
                time: 1.0,
            },
            Some(BUS),
        );
        assert_eq!(engine.current_line(), None);
        assert!(engine.needs_fetch(&other_key()));
    }

    #[test]
    fn push_while_disabled_only_clears() {
        let mut engine = LyricsSync::new(false);
        engine.apply_push(
            &LyricPush {
                sender: "mpv".to_owned(),
                content: "ignored".to_owned(),
                time: 1.0,
            },
            Some(BUS),
        );
        assert_eq!(engine.current_line(), None);
        assert!(!engine.needs_fetch(&key()));
    }

    #[test]
    fn disabling_discards_everything() {
        let t0 = Instant::now();
        let mut engine = loaded_engine();
        engine.tick(Some(&playing(10, t0)), t0);
        assert!(engine.current_line().is_some());

        engine.set_enabled(false);
        assert_eq!(engine.current_line(), None);
        assert_eq!(engine.tick(Some(&playing(10, t0)), t0), TickCommand::default());
    }

    #[test]
    fn reset_clears_cursor_and_override() {
        let t0 = Instant::now();
        let mut engine = loaded_engine();
        engine.tick(Some(&playing(10, t0)), t0);
        engine.reset();

        assert_eq!(engine.current_line(), None);
        assert!(engine.needs_fetch(&key()));
    }
}
