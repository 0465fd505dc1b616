//! Strongly-typed view of the MPRIS `a{sv}` metadata bag.
//!
//! The dynamic wire format is decoded once at the boundary; nothing past this
//! module touches `zvariant` values.

use std::{collections::HashMap, ops::Deref, time::Duration};

use zbus::zvariant::{OwnedValue, Value};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub art_url: Option<String>,
    /// `mpris:trackid`; a change signals a track switch.
    pub track_id: Option<String>,
    /// Total track length, when the player reports one.
    pub length: Option<Duration>,
    /// `xesam:url`; used for web-content gating.
    pub url: Option<String>,
}

impl TrackMetadata {
    #[must_use]
    pub fn from_raw(raw: &HashMap<String, OwnedValue>) -> Self {
        let get = |key: &str| raw.get(key).map(Deref::deref);
        Self {
            title: get("xesam:title").and_then(value_str),
            artists: get("xesam:artist").map(value_str_list).unwrap_or_default(),
            album: get("xesam:album").and_then(value_str),
            art_url: get("mpris:artUrl").and_then(value_str),
            track_id: get("mpris:trackid").and_then(value_str),
            length: get("mpris:length")
                .and_then(value_u64)
                .map(Duration::from_micros),
            url: get("xesam:url").and_then(value_str),
        }
    }

    /// Title, if present and non-empty.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.trim().is_empty())
    }

    #[must_use]
    pub fn has_title(&self) -> bool {
        self.title().is_some()
    }

    /// All artists joined for display and lookup keys.
    #[must_use]
    pub fn artist_line(&self) -> Option<String> {
        if self.artists.is_empty() {
            None
        } else {
            Some(self.artists.join(", "))
        }
    }

    /// Whether the played content comes from the web rather than a local file.
    #[must_use]
    pub fn is_web_content(&self) -> bool {
        self.url
            .as_deref()
            .is_some_and(|u| u.starts_with("http://") || u.starts_with("https://"))
    }
}

/// Strings arrive as `s` or (for track ids) as `o`.
fn value_str(v: &Value<'_>) -> Option<String> {
    match v {
        Value::Str(s) => Some(s.to_string()),
        Value::ObjectPath(o) => Some(o.to_string()),
        Value::Value(inner) => value_str(inner),
        _ => None,
    }
}

fn value_str_list(v: &Value<'_>) -> Vec<String> {
    match v {
        Value::Array(a) => a.iter().filter_map(value_str).collect(),
        Value::Value(inner) => value_str_list(inner),
        // Some players publish a single artist as a bare string.
        other => value_str(other).into_iter().collect(),
    }
}

fn value_u64(v: &Value<'_>) -> Option<u64> {
    match v {
        Value::I64(n) => u64::try_from(*n).ok(),
        Value::U64(n) => Some(*n),
        Value::I32(n) => u64::try_from(*n).ok(),
        Value::U32(n) => Some(u64::from(*n)),
        Value::Value(inner) => value_u64(inner),
        _ => None,
    }
}
