use anyhow::{Context as _, Result};
use futures_lite::{Stream, StreamExt as _};
use zbus::{fdo::DBusProxy, names::OwnedBusName, Connection};

pub mod control;
pub mod media_player2;
pub mod player;

const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2";

pub enum BusActivity {
    Created,
    Destroyed,
}

/// D-Bus's activity parsed from `NameOwnerChanged` signal
pub struct BusChange {
    pub name: OwnedBusName,
    pub activity: BusActivity,
}
impl BusChange {
    pub const fn new(name: OwnedBusName, activity: BusActivity) -> Self {
        Self { name, activity }
    }
    pub fn is_player(&self) -> bool {
        self.name.starts_with(MPRIS_PREFIX)
    }
}

/// Return a stream of MPRIS player appearances/disappearances on the bus.
/// Each item is a cue to re-list the full name set, not an authoritative
/// delta.
pub async fn player_bus_changes(conn: &Connection) -> Result<impl Stream<Item = BusChange>> {
    let proxy = DBusProxy::new(conn)
        .await
        .context("Failed to create DBusProxy")?;

    Ok(proxy
        .receive_name_owner_changed()
        .await
        .context("Failed to listen for NameOwnerChanged signal on DBus")?
        .filter_map(|s| {
            let args = s
                .args()
                .inspect_err(|e| tracing::warn!(?e, "Failed to parse NameOwnerChanged argument"))
                .ok()?;
            let change = match (args.new_owner.is_some(), args.old_owner.is_some()) {
                (true, false) => BusActivity::Created,
                (false, true) => BusActivity::Destroyed,
                _ => return None,
            };
            Some(BusChange::new(args.name.into(), change))
        })
        .filter(BusChange::is_player))
}

/// List every MPRIS player name currently owned on the bus.
pub async fn list_player_names(conn: &Connection) -> Result<Vec<OwnedBusName>> {
    let proxy = DBusProxy::new(conn)
        .await
        .context("Failed to create DBusProxy")?;
    Ok(proxy
        .list_names()
        .await
        .context("Failed to list currently-owned names on DBus")?
        .into_iter()
        .filter(|n| n.starts_with(MPRIS_PREFIX))
        .collect())
}
