//! Picks the single player to represent out of everything on the bus.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use zbus::names::OwnedBusName;

use crate::{
    filter::PlayerFilter,
    player::{PlaybackStatus, PlayerState},
};

/// After a deliberate skip the previous winner keeps the slot for this long,
/// so the display does not jump mid-action.
const ACTION_LOCK_WINDOW: Duration = Duration::from_millis(3000);

const SCORE_PLAYING: i32 = 500;
const SCORE_PAUSED: i32 = 100;
/// Hard exclusion for web players failing the allow-list URL match.
const SCORE_EXCLUDED: i32 = -1;

/// Selection state: the last committed winner and the lock stamp of the last
/// user transport action. Scoring itself is stateless.
pub struct PlayerSelector {
    pinned: Option<String>,
    last_winner: Option<Arc<OwnedBusName>>,
    last_action: Option<Instant>,
}

impl PlayerSelector {
    #[must_use]
    pub fn new(pinned: Option<String>) -> Self {
        Self {
            pinned,
            last_winner: None,
            last_action: None,
        }
    }

    /// Stamp a user-initiated transport action, engaging the lock window.
    /// Automatic rescoring never calls this.
    pub fn mark_user_action(&mut self, now: Instant) {
        self.last_action = Some(now);
    }

    #[must_use]
    pub fn last_winner(&self) -> Option<&Arc<OwnedBusName>> {
        self.last_winner.as_ref()
    }

    /// Record the winner of a refresh pass; returns whether it changed.
    pub fn commit(&mut self, winner: Option<&Arc<OwnedBusName>>) -> bool {
        let changed = self.last_winner.as_deref() != winner.map(Arc::as_ref);
        self.last_winner = winner.map(Arc::clone);
        changed
    }

    /// Pick the active player. Pure over the given player set and `now`; the
    /// committed winner only participates through the lock window.
    pub fn select<'a, I>(
        &self,
        players: I,
        filter: &PlayerFilter,
        now: Instant,
    ) -> Option<Arc<OwnedBusName>>
    where
        I: IntoIterator<Item = (&'a Arc<OwnedBusName>, &'a PlayerState)>,
    {
        let players: Vec<_> = players.into_iter().collect();

        if let Some(pin) = self.pinned.as_deref() {
            if let Some((name, _)) = players.iter().find(|(n, _)| n.as_str() == pin) {
                return Some(Arc::clone(name));
            }
        }

        let locked = self
            .last_action
            .is_some_and(|at| now.saturating_duration_since(at) < ACTION_LOCK_WINDOW);
        if locked {
            if let Some(last) = &self.last_winner {
                if let Some((name, _)) = players.iter().find(|(n, _)| *n == last) {
                    return Some(Arc::clone(name));
                }
            }
        }

        let mut scored: Vec<_> = players
            .iter()
            .map(|&(name, state)| (score(state, filter), name, state))
            .collect();
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.2.last_playing.cmp(&a.2.last_playing))
        });

        let &(top_score, top_name, top_state) = scored.first()?;
        if top_score < 0 {
            return None;
        }

        // A paused player must not outrank one that is actively playing
        // merely by recency.
        if top_state.status != PlaybackStatus::Playing {
            if let Some(&(_, name, _)) = scored.iter().find(|(s, _, p)| {
                *s > 0 && p.status == PlaybackStatus::Playing && p.metadata.has_title()
            }) {
                return Some(Arc::clone(name));
            }
        }

        Some(Arc::clone(top_name))
    }
}

fn score(state: &PlayerState, filter: &PlayerFilter) -> i32 {
    if state.metadata.is_web_content() {
        let url = state.metadata.url.as_deref().unwrap_or_default();
        if !filter.permits_web_url(url) {
            return SCORE_EXCLUDED;
        }
    }
    match state.status {
        PlaybackStatus::Playing if state.metadata.has_title() => SCORE_PLAYING,
        PlaybackStatus::Paused if state.metadata.has_title() => SCORE_PAUSED,
        _ => 0,
    }
}
