//! Allow/deny filtering of player bus names.

use clap::ValueEnum;

/// How the substring list is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FilterMode {
    /// Every player is accepted.
    Off,
    /// Players matching the list are hidden.
    Deny,
    /// Only players matching the list are shown.
    Allow,
}

/// Case-insensitive substring filter applied to candidate bus names before
/// they are tracked, and (in allow mode) to web-content URLs during scoring.
#[derive(Clone, Debug)]
pub struct PlayerFilter {
    mode: FilterMode,
    needles: Vec<String>,
}

impl PlayerFilter {
    #[must_use]
    pub fn new(mode: FilterMode, list: &str) -> Self {
        Self {
            mode,
            needles: list
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        let haystack = haystack.to_lowercase();
        self.needles.iter().any(|n| haystack.contains(n))
    }

    /// Whether a bus name may become a tracked player. An empty list denies
    /// nothing in deny mode and allows nothing in allow mode.
    #[must_use]
    pub fn allows_name(&self, bus_name: &str) -> bool {
        match self.mode {
            FilterMode::Off => true,
            FilterMode::Deny => !self.matches(bus_name),
            FilterMode::Allow => self.matches(bus_name),
        }
    }

    /// Whether a player serving web content (an `http`/`https` URL) survives
    /// scoring. Only allow mode gates on the URL; everything else passes.
    #[must_use]
    pub fn permits_web_url(&self, url: &str) -> bool {
        if self.mode != FilterMode::Allow {
            return true;
        }
        let url = url.to_lowercase();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return true;
        }
        self.needles.iter().any(|n| url.contains(n))
    }
}
