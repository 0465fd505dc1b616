use std::time::Duration;

use crate::{args::Args, filter::PlayerFilter};

/// Debounce window for coalescing bursts of player change events.
const REFRESH_DELAY: Duration = Duration::from_millis(150);
/// Longer window for players that propagate properties slowly.
const COMPAT_REFRESH_DELAY: Duration = Duration::from_millis(800);

/// Immutable settings snapshot consumed by the engine. The engine never
/// writes configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    pub filter: PlayerFilter,
    /// Bus name that always wins arbitration while present.
    pub pinned_player: Option<String>,
    pub lyrics_enabled: bool,
    pub compat_delay: bool,
    /// Art shown when a player never reported any.
    pub fallback_art: Option<String>,
}

impl Settings {
    #[must_use]
    pub fn from_args(args: &Args) -> Self {
        Self {
            filter: PlayerFilter::new(args.filter_mode, &args.filter_list),
            pinned_player: args.pin_player.clone(),
            lyrics_enabled: !args.no_lyrics,
            compat_delay: args.compat_delay,
            fallback_art: args.fallback_art.clone(),
        }
    }

    #[must_use]
    pub fn refresh_delay(&self) -> Duration {
        if self.compat_delay {
            COMPAT_REFRESH_DELAY
        } else {
            REFRESH_DELAY
        }
    }
}
