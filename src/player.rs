use std::{str::FromStr, time::Instant};

use anyhow::{anyhow, Context as _, Result};
use futures_lite::{stream::Fuse, StreamExt as _};
use tokio::select;
use zbus::proxy::PropertyStream;

use crate::{
    dbus::player::{PlayerProxy, SeekedStream},
    metadata::TrackMetadata,
};

/// Current playback status of a MPRIS-compliant player
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}
impl FromStr for PlaybackStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "playing" => Ok(Self::Playing),
            "paused" => Ok(Self::Paused),
            "stopped" => Ok(Self::Stopped),
            _ => Err(anyhow!("Unknown PlaybackStatus {s}")),
        }
    }
}
impl PlaybackStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
        }
    }
}

/// MPRIS `LoopStatus` values, cycled by the toggle-loop action.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum LoopStatus {
    None,
    Track,
    Playlist,
}
impl FromStr for LoopStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "none" => Ok(Self::None),
            "track" => Ok(Self::Track),
            "playlist" => Ok(Self::Playlist),
            _ => Err(anyhow!("Unknown LoopStatus {s}")),
        }
    }
}
impl LoopStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Track => "Track",
            Self::Playlist => "Playlist",
        }
    }

    /// None -> Playlist -> Track -> None, the cycle the toggle action walks.
    #[must_use]
    pub const fn cycled(self) -> Self {
        match self {
            Self::None => Self::Playlist,
            Self::Playlist => Self::Track,
            Self::Track => Self::None,
        }
    }
}

/// Live state of one player as observed through the bus.
#[derive(Debug)]
pub struct PlayerState {
    pub status: PlaybackStatus,
    pub metadata: TrackMetadata,
    pub volume: Option<f64>,
    pub shuffle: Option<bool>,
    pub loop_status: Option<LoopStatus>,
    /// `org.mpris.MediaPlayer2.Identity`, fetched once at connect.
    pub identity: Option<String>,
    /// Raw reported position in microseconds, valid as of `position_at`.
    pub position: i64,
    pub position_at: Instant,
    /// Most recent moment this player was observed `Playing`; arbitration
    /// tie-breaker.
    pub last_playing: Option<Instant>,
    pub last_seen: Instant,
}

/// What a property update means for downstream processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateEffect {
    /// Schedule a refresh, nothing else.
    Refresh,
    /// Schedule a refresh and re-query the authoritative position, since the
    /// reported one may predate the change.
    RefreshAndResync,
}

#[derive(Debug)]
pub enum PlayerUpdate {
    Metadata(TrackMetadata),
    Status(PlaybackStatus),
    Position(i64, Instant),
    Volume(f64),
    Shuffle(bool),
    Loop(LoopStatus),
}

impl PlayerState {
    pub async fn new(player: &PlayerProxy<'_>, identity: Option<String>) -> Result<Self> {
        let now = Instant::now();
        let status = player
            .playback_status()
            .await
            .inspect_err(|e| tracing::warn!(?e, "Failed to get player playback status"))
            .ok()
            .as_deref()
            .map(str::parse)
            .transpose()
            .context("Failed to parse player playback status")?
            .unwrap_or(PlaybackStatus::Stopped);
        Ok(Self {
            status,
            metadata: player
                .metadata()
                .await
                .inspect_err(|e| tracing::warn!(?e, "Failed to get player metadata"))
                .map(|raw| TrackMetadata::from_raw(&raw))
                .unwrap_or_default(),
            volume: player.volume().await.ok(),
            shuffle: player.shuffle().await.ok(),
            loop_status: player
                .loop_status()
                .await
                .ok()
                .as_deref()
                .and_then(|s| s.parse().ok()),
            identity,
            position: player
                .position()
                .await
                .inspect_err(|e| tracing::debug!(?e, "Player does not report a position"))
                .unwrap_or(0),
            position_at: now,
            last_playing: (status == PlaybackStatus::Playing).then_some(now),
            last_seen: now,
        })
    }

    /// Apply one property update and classify it for the caller.
    pub fn apply_update(&mut self, update: PlayerUpdate, now: Instant) -> UpdateEffect {
        self.last_seen = now;
        match update {
            PlayerUpdate::Position(position, at) => {
                self.position = position;
                self.position_at = at;
                UpdateEffect::Refresh
            }
            PlayerUpdate::Metadata(metadata) => {
                if metadata.track_id.is_some() && metadata.track_id != self.metadata.track_id {
                    // Track switch: whatever position we were extrapolating
                    // belongs to the previous track.
                    self.position = 0;
                    self.position_at = now;
                }
                self.metadata = metadata;
                UpdateEffect::RefreshAndResync
            }
            PlayerUpdate::Status(status) => {
                // Freeze the accumulated estimate under the old status before
                // switching, so a pause stops the clock exactly here.
                self.position = self.raw_estimate_micros(now);
                self.position_at = now;
                self.status = status;
                if status == PlaybackStatus::Playing {
                    self.last_playing = Some(now);
                }
                UpdateEffect::RefreshAndResync
            }
            PlayerUpdate::Volume(volume) => {
                self.volume = Some(volume);
                UpdateEffect::Refresh
            }
            PlayerUpdate::Shuffle(shuffle) => {
                self.shuffle = Some(shuffle);
                UpdateEffect::Refresh
            }
            PlayerUpdate::Loop(loop_status) => {
                self.loop_status = Some(loop_status);
                UpdateEffect::Refresh
            }
        }
    }

    fn raw_estimate_micros(&self, now: Instant) -> i64 {
        let base = self.position.max(0);
        if self.status == PlaybackStatus::Playing {
            let elapsed = now.saturating_duration_since(self.position_at);
            base.saturating_add(i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX))
        } else {
            base
        }
    }

    /// Playback position estimated from the last reported anchor. Grows with
    /// wall-clock time while `Playing`, frozen otherwise, clamped to the
    /// track length when one is known.
    #[must_use]
    pub fn estimated_position(&self, now: Instant) -> std::time::Duration {
        let estimate =
            std::time::Duration::from_micros(self.raw_estimate_micros(now).max(0) as u64);
        match self.metadata.length {
            Some(length) if estimate > length => length,
            _ => estimate,
        }
    }
}

/// Streams property changes of a single player into typed updates.
pub struct PlayerUpdateListener {
    metadata_stream: Fuse<PropertyStream<'static, std::collections::HashMap<String, zbus::zvariant::OwnedValue>>>,
    status_stream: Fuse<PropertyStream<'static, String>>,
    volume_stream: Fuse<PropertyStream<'static, f64>>,
    shuffle_stream: Fuse<PropertyStream<'static, bool>>,
    loop_stream: Fuse<PropertyStream<'static, String>>,
    seeked: SeekedStream,
}

impl PlayerUpdateListener {
    pub async fn new(player: &PlayerProxy<'static>) -> Result<Self> {
        Ok(Self {
            metadata_stream: player.receive_metadata_changed().await.fuse(),
            status_stream: player.receive_playback_status_changed().await.fuse(),
            volume_stream: player.receive_volume_changed().await.fuse(),
            shuffle_stream: player.receive_shuffle_changed().await.fuse(),
            loop_stream: player.receive_loop_status_changed().await.fuse(),
            seeked: player
                .receive_seeked()
                .await
                .context("Failed to receive seek signal")?,
        })
    }

    pub async fn update(&mut self) -> Result<PlayerUpdate> {
        select! {
            metadata = self.metadata_stream.next() => {
                metadata.context("Failed to receive metadata update event")?.get().await.context("Failed to get player metadata").map(|raw| PlayerUpdate::Metadata(TrackMetadata::from_raw(&raw)))
            },
            status = self.status_stream.next() => {
                status.context("Failed to receive status update event")?.get().await.context("Failed to get player playback status")?.parse().map(PlayerUpdate::Status)
            }
            volume = self.volume_stream.next() => {
                volume.context("Failed to receive volume update event")?.get().await.context("Failed to get player volume").map(PlayerUpdate::Volume)
            }
            shuffle = self.shuffle_stream.next() => {
                shuffle.context("Failed to receive shuffle update event")?.get().await.context("Failed to get player shuffle flag").map(PlayerUpdate::Shuffle)
            }
            loop_status = self.loop_stream.next() => {
                loop_status.context("Failed to receive loop status update event")?.get().await.context("Failed to get player loop status")?.parse().map(PlayerUpdate::Loop)
            }
            seek = self.seeked.next() => {
                seek.context("Failed to receive seek signal")?.args().context("Failed to get player seeked position").map(|p| PlayerUpdate::Position(p.position, Instant::now()))
            }
        }
    }
}
