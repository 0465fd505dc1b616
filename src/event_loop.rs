//! The single dispatcher loop. Every mutation of engine state happens here,
//! in reaction to one event at a time: bus activity, player property
//! updates, control calls, fetch completions, and timers.

use std::{path::Path, sync::Arc, time::Instant};

use anyhow::{bail, Context as _, Result};
use futures_lite::StreamExt as _;
use tokio::{select, sync::mpsc};
use zbus::{names::OwnedBusName, Connection};

use crate::{
    config::Settings,
    dbus::{
        self,
        control::{ControlEvent, LyricPush, PlayerAction},
        BusActivity, BusChange,
    },
    debounce::Debounce,
    lyrics::{lrclib::LyricsClient, LyricTrack, TrackKey},
    output::StatusModule,
    player::{PlayerUpdate, UpdateEffect},
    registry::{PlayerRegistry, UpdateMessage},
    select::PlayerSelector,
    sync::{LyricsSync, TICK_PERIOD},
};

/// Completed network lookup, tagged with the key it was issued under.
type FetchMessage = (TrackKey, LyricTrack);

struct Controller {
    conn: Connection,
    settings: Settings,
    registry: PlayerRegistry,
    selector: PlayerSelector,
    lyrics: LyricsSync,
    lyrics_client: Arc<LyricsClient>,
    update_sender: mpsc::Sender<UpdateMessage>,
    fetch_sender: mpsc::Sender<FetchMessage>,
}

pub async fn event_loop(conn: Connection, settings: Settings) -> Result<()> {
    let mut bus_stream = dbus::player_bus_changes(&conn).await?;

    let (update_sender, mut update_receiver) = mpsc::channel(16);
    let (fetch_sender, mut fetch_receiver) = mpsc::channel(4);
    let (control_sender, mut control_receiver) = mpsc::channel(8);
    dbus::control::serve(&conn, control_sender).await?;

    let lyrics_client = Arc::new(LyricsClient::new().context("Failed to set up the lyrics client")?);

    let mut ctl = Controller {
        lyrics: LyricsSync::new(settings.lyrics_enabled),
        selector: PlayerSelector::new(settings.pinned_player.clone()),
        registry: PlayerRegistry::new(),
        conn,
        settings,
        lyrics_client,
        update_sender,
        fetch_sender,
    };

    let mut refresh = Debounce::new(ctl.settings.refresh_delay());
    let mut tick = tokio::time::interval(TICK_PERIOD);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Pick up everything already on the bus before the first signal.
    ctl.reconcile().await;
    ctl.refresh_now();

    loop {
        select! {
            bus_change = bus_stream.next() => {
                let Some(BusChange { name, activity }) = bus_change else {
                    bail!("DBus NameOwnerChanged stream closed");
                };
                tracing::debug!(%name, appeared = matches!(activity, BusActivity::Created), "Player bus activity");
                if ctl.reconcile().await {
                    ctl.refresh_now();
                }
            }
            update = update_receiver.recv() => {
                // Unwrap: the controller holds a sender, so the channel
                // cannot close.
                let (name, update) = update.unwrap();
                if ctl.apply_update(&name, update) {
                    refresh.trigger();
                }
            }
            event = control_receiver.recv() => {
                let Some(event) = event else {
                    bail!("Control service dropped");
                };
                ctl.handle_control(event).await;
            }
            fetched = fetch_receiver.recv() => {
                let (key, track) = fetched.unwrap();
                ctl.complete_fetch(key, track);
            }
            () = &mut refresh.timer, if refresh.is_armed() => {
                refresh.disarm();
                ctl.refresh_now();
            }
            _ = tick.tick() => {
                ctl.on_tick();
            }
        }
    }
}

impl Controller {
    /// Re-list bus names and update the registry; returns whether the player
    /// set changed. Directory failures are transient: log and carry on.
    async fn reconcile(&mut self) -> bool {
        match self
            .registry
            .reconcile(&self.conn, &self.settings.filter, &self.update_sender)
            .await
        {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!(?e, "Failed to scan the bus for players");
                false
            }
        }
    }

    /// Apply one property update; returns whether a refresh should be
    /// scheduled. Updates for players that vanished mid-flight are dropped.
    fn apply_update(&mut self, name: &Arc<OwnedBusName>, update: PlayerUpdate) -> bool {
        tracing::debug!(%name, ?update, "Player update");
        let Some(effect) = self.registry.apply(name, update, Instant::now()) else {
            tracing::debug!(%name, "Dropping update for an untracked player");
            return false;
        };
        if effect == UpdateEffect::RefreshAndResync {
            self.registry.spawn_position_resync(name, &self.update_sender);
        }
        true
    }

    async fn handle_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Action(action) => self.handle_action(action).await,
            ControlEvent::Lyric(push) => self.handle_lyric_push(&push),
            ControlEvent::LyricsEnabled(enabled) => {
                tracing::info!(enabled, "Lyrics feature toggled");
                self.lyrics.set_enabled(enabled);
                if enabled {
                    // Kick off a fetch for whatever is active now.
                    self.refresh_now();
                } else {
                    self.render();
                }
            }
            ControlEvent::Liked(liked) => {
                tracing::info!(liked, "Track liked status changed");
            }
        }
    }

    async fn handle_action(&mut self, action: PlayerAction) {
        let now = Instant::now();
        if matches!(action, PlayerAction::Next | PlayerAction::Previous) {
            // A deliberate skip: pin arbitration to the current winner for
            // the lock window.
            self.selector.mark_user_action(now);
        }

        let Some(name) = self
            .selector
            .select(self.registry.states(), &self.settings.filter, now)
        else {
            tracing::debug!(?action, "No active player for action");
            return;
        };
        let Some(entry) = self.registry.get(&name) else {
            return;
        };

        let result = match action {
            PlayerAction::PlayPause => entry.player.play_pause().await,
            PlayerAction::Next => entry.player.next().await,
            PlayerAction::Previous => entry.player.previous().await,
            PlayerAction::ToggleShuffle => match entry.state.shuffle {
                Some(shuffle) => entry.player.set_shuffle(!shuffle).await,
                None => Ok(()),
            },
            PlayerAction::ToggleLoop => {
                let next = entry
                    .state
                    .loop_status
                    .unwrap_or(crate::player::LoopStatus::None)
                    .cycled();
                entry.player.set_loop_status(next.as_str()).await
            }
            PlayerAction::Raise => entry.app.raise().await,
        };
        if let Err(e) = result {
            tracing::warn!(%name, ?action, ?e, "Remote call failed");
        }
    }

    fn handle_lyric_push(&mut self, push: &LyricPush) {
        let active = self
            .selector
            .select(self.registry.states(), &self.settings.filter, Instant::now());
        self.lyrics
            .apply_push(push, active.as_ref().map(|n| n.as_str()));
        self.render();
    }

    fn complete_fetch(&mut self, key: TrackKey, track: LyricTrack) {
        if self.lyrics.complete_fetch(&key, track) {
            tracing::info!(title = key.title(), "Lyrics loaded");
        }
    }

    /// Engine tick: advance the lyric cursor and correct position drift.
    fn on_tick(&mut self) {
        let now = Instant::now();
        let active = self
            .selector
            .select(self.registry.states(), &self.settings.filter, now);
        let state = active
            .as_ref()
            .and_then(|name| self.registry.get(name))
            .map(|entry| &entry.state);
        let command = self.lyrics.tick(state, now);
        if command.resync {
            if let Some(name) = &active {
                self.registry.spawn_position_resync(name, &self.update_sender);
            }
        }
        if command.changed {
            self.render();
        }
    }

    /// The debounced downstream pass: arbitrate, reconcile lyric state with
    /// the winner, and render.
    fn refresh_now(&mut self) {
        let now = Instant::now();
        let winner = self
            .selector
            .select(self.registry.states(), &self.settings.filter, now);
        if self.selector.commit(winner.as_ref()) {
            tracing::info!(winner = ?winner.as_ref().map(|n| n.as_str()), "Active player changed");
            self.lyrics.reset();
        }

        if let Some(name) = &winner {
            if let Some(entry) = self.registry.get(name) {
                let metadata = entry.state.metadata.clone();
                if let Some(key) = TrackKey::of(&metadata) {
                    if self.lyrics.needs_fetch(&key) {
                        self.lyrics.begin_fetch(key.clone());
                        self.spawn_fetch(key, &metadata);
                    }
                }
            }
        }

        self.render();
    }

    fn spawn_fetch(&self, key: TrackKey, metadata: &crate::metadata::TrackMetadata) {
        let client = Arc::clone(&self.lyrics_client);
        let album = metadata.album.clone();
        let duration_secs = metadata.length.map(|l| l.as_secs());
        let sender = self.fetch_sender.clone();
        tokio::spawn(async move {
            match client.fetch(&key, album.as_deref(), duration_secs).await {
                Ok(track) => {
                    let _ = sender.send((key, track)).await;
                }
                // The engine keeps the key stamped, so a failed lookup is
                // not retried until the track changes.
                Err(e) => tracing::warn!(title = key.title(), ?e, "Lyrics fetch failed"),
            }
        });
    }

    /// Print the module for the committed winner. The sink is side-effect
    /// only; its failures never feed back into engine state.
    fn render(&mut self) {
        let module = self.build_module();
        if let Err(e) = module.print() {
            tracing::warn!(?e, "Failed to write the status module");
        }
    }

    fn build_module(&mut self) -> StatusModule {
        let Some(name) = self.selector.last_winner().map(Arc::clone) else {
            return StatusModule::idle();
        };
        let Some(entry) = self.registry.get(&name) else {
            return StatusModule::idle();
        };
        let metadata = entry.state.metadata.clone();
        let art = self
            .registry
            .resolve_art(&name, &metadata)
            .or_else(|| self.fallback_art());
        // Re-borrow: resolve_art needed the registry mutably.
        let Some(entry) = self.registry.get(&name) else {
            return StatusModule::idle();
        };
        StatusModule::for_player(&entry.state, art.as_deref(), self.lyrics.current_line())
    }

    fn fallback_art(&self) -> Option<String> {
        let path = self.settings.fallback_art.as_deref()?;
        Path::new(path).exists().then(|| format!("file://{path}"))
    }
}
