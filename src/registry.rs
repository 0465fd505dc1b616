//! The live set of players tracked on the bus.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

use anyhow::{ensure, Result};
use tokio::{sync::mpsc, task::JoinHandle};
use zbus::{names::OwnedBusName, Connection};

use crate::{
    dbus::{
        self,
        media_player2::MediaPlayer2Proxy,
        player::PlayerProxy,
    },
    filter::PlayerFilter,
    metadata::TrackMetadata,
    player::{PlayerState, PlayerUpdate, PlayerUpdateListener, UpdateEffect},
};

/// Channel item: which player an update belongs to.
pub type UpdateMessage = (Arc<OwnedBusName>, PlayerUpdate);

pub struct PlayerEntry {
    pub state: PlayerState,
    pub player: PlayerProxy<'static>,
    pub app: MediaPlayer2Proxy<'static>,
    updater: JoinHandle<Result<()>>,
}

impl Drop for PlayerEntry {
    fn drop(&mut self) {
        self.updater.abort();
    }
}

#[derive(Default)]
pub struct PlayerRegistry {
    players: HashMap<Arc<OwnedBusName>, PlayerEntry>,
    /// Last non-empty art seen per player, surviving tracks that omit it.
    art_cache: HashMap<String, String>,
}

impl PlayerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &OwnedBusName) -> Option<&PlayerEntry> {
        self.players.get(name)
    }

    pub fn states(&self) -> impl Iterator<Item = (&Arc<OwnedBusName>, &PlayerState)> {
        self.players.iter().map(|(name, entry)| (name, &entry.state))
    }

    /// Bring the tracked set in line with the names currently on the bus.
    /// Names failing the filter never become players; a failed connection is
    /// skipped and retried on the next pass. Returns whether the set changed.
    pub async fn reconcile(
        &mut self,
        conn: &Connection,
        filter: &PlayerFilter,
        update_sender: &mpsc::Sender<UpdateMessage>,
    ) -> Result<bool> {
        let observed: HashSet<OwnedBusName> = dbus::list_player_names(conn)
            .await?
            .into_iter()
            .filter(|n| filter.allows_name(n.as_str()))
            .collect();

        let mut changed = false;

        let vanished: Vec<_> = self
            .players
            .keys()
            .filter(|name| !observed.contains(name.as_ref()))
            .map(Arc::clone)
            .collect();
        for name in vanished {
            if let Some(entry) = self.players.get(&name) {
                tracing::info!(%name, silent_for = ?entry.state.last_seen.elapsed(), "Player gone");
            }
            self.remove(&name);
            changed = true;
        }

        for name in observed {
            if self.players.contains_key(&name) {
                continue;
            }
            let name = Arc::new(name);
            match connect_player(conn, Arc::clone(&name), update_sender.clone()).await {
                Ok(entry) => {
                    tracing::info!(%name, "New player registered");
                    self.players.insert(name, entry);
                    changed = true;
                }
                Err(e) => {
                    tracing::warn!(%name, ?e, "Failed to connect to player; will retry on next scan");
                }
            }
        }

        Ok(changed)
    }

    fn remove(&mut self, name: &Arc<OwnedBusName>) {
        // Dropping the entry aborts its update listener.
        self.players.remove(name);
        self.art_cache.remove(art_cache_key(name.as_str()));
    }

    /// Apply an update to the named player. Returns [`None`] when the player
    /// is no longer tracked (a stale completion; the caller drops it).
    pub fn apply(
        &mut self,
        name: &OwnedBusName,
        update: PlayerUpdate,
        now: Instant,
    ) -> Option<UpdateEffect> {
        let entry = self.players.get_mut(name)?;
        Some(entry.state.apply_update(update, now))
    }

    /// Re-query the named player's authoritative position in the background.
    /// The result re-enters the loop as a position update and is dropped by
    /// [`Self::apply`] if the player vanished in the meantime.
    pub fn spawn_position_resync(
        &self,
        name: &Arc<OwnedBusName>,
        update_sender: &mpsc::Sender<UpdateMessage>,
    ) {
        let Some(entry) = self.players.get(name) else {
            return;
        };
        let player = entry.player.clone();
        let name = Arc::clone(name);
        let update_sender = update_sender.clone();
        tokio::spawn(async move {
            match player.position().await {
                Ok(position) => {
                    let update = PlayerUpdate::Position(position, Instant::now());
                    let _ = update_sender.send((name, update)).await;
                }
                Err(e) => tracing::debug!(%name, ?e, "Position re-query failed"),
            }
        });
    }

    /// Resolve art for the named player: write-through on fresh art, cache
    /// fallback when the current track has none.
    pub fn resolve_art(&mut self, name: &OwnedBusName, metadata: &TrackMetadata) -> Option<String> {
        let key = art_cache_key(name.as_str());
        match metadata.art_url.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(art) => {
                self.art_cache.insert(key.to_owned(), art.to_owned());
                Some(art.to_owned())
            }
            None => self.art_cache.get(key).cloned(),
        }
    }
}

/// Multi-instance players suffix their bus name; cache art per application.
fn art_cache_key(name: &str) -> &str {
    match name.find(".instance") {
        Some(at) => &name[..at],
        None => name,
    }
}

async fn connect_player(
    conn: &Connection,
    name: Arc<OwnedBusName>,
    update_sender: mpsc::Sender<UpdateMessage>,
) -> Result<PlayerEntry> {
    let player = PlayerProxy::builder(conn)
        .destination(Arc::unwrap_or_clone(Arc::clone(&name)))?
        .build()
        .await?;
    let app = MediaPlayer2Proxy::builder(conn)
        .destination(Arc::unwrap_or_clone(Arc::clone(&name)))?
        .build()
        .await?;

    let identity = app
        .identity()
        .await
        .inspect_err(|e| tracing::debug!(?e, "Player has no Identity"))
        .ok();
    let state = PlayerState::new(&player, identity).await?;
    tracing::debug!(?state);

    let mut listener = PlayerUpdateListener::new(&player).await?;
    let listener_name = Arc::clone(&name);
    let updater = tokio::spawn(async move {
        loop {
            let update = match listener.update().await {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!(?e, "Failed to parse player update");
                    continue;
                }
            };
            let result = update_sender.send((Arc::clone(&listener_name), update)).await;
            ensure!(result.is_ok(), "Player updates listener closed");
        }
    });

    Ok(PlayerEntry {
        state,
        player,
        app,
        updater,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn art_cache_key_strips_instance_suffix() {
        assert_eq!(
            art_cache_key("org.mpris.MediaPlayer2.chromium.instance1234"),
            "org.mpris.MediaPlayer2.chromium"
        );
        assert_eq!(
            art_cache_key("org.mpris.MediaPlayer2.mpv"),
            "org.mpris.MediaPlayer2.mpv"
        );
    }

    #[test]
    fn art_cache_write_through_and_fallback() {
        let mut registry = PlayerRegistry::new();
        let name = OwnedBusName::try_from("org.mpris.MediaPlayer2.mpv").unwrap();

        let mut with_art = TrackMetadata::default();
        with_art.art_url = Some("file:///tmp/cover.png".to_owned());
        assert_eq!(
            registry.resolve_art(&name, &with_art).as_deref(),
            Some("file:///tmp/cover.png")
        );

        // The next track omits art; the cached one fills in.
        let without_art = TrackMetadata::default();
        assert_eq!(
            registry.resolve_art(&name, &without_art).as_deref(),
            Some("file:///tmp/cover.png")
        );

        // Blank art does not overwrite the cache.
        let mut blank = TrackMetadata::default();
        blank.art_url = Some("  ".to_owned());
        assert_eq!(
            registry.resolve_art(&name, &blank).as_deref(),
            Some("file:///tmp/cover.png")
        );
    }

    #[test]
    fn unknown_player_art_misses() {
        let mut registry = PlayerRegistry::new();
        let name = OwnedBusName::try_from("org.mpris.MediaPlayer2.unknown").unwrap();
        assert_eq!(registry.resolve_art(&name, &TrackMetadata::default()), None);
    }
}
