//! Proxy for the application-level `org.mpris.MediaPlayer2` interface.

#[zbus::proxy(
    interface = "org.mpris.MediaPlayer2",
    default_path = "/org/mpris/MediaPlayer2"
)]
pub trait MediaPlayer2 {
    /// Bring the player's user interface to the front.
    fn raise(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn identity(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn desktop_entry(&self) -> zbus::Result<String>;
}
