use std::{fs::File, io, sync::Mutex};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::filter::FilterMode;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// How to filter players appearing on the bus.
    #[clap(long, value_enum, default_value = "off")]
    pub filter_mode: FilterMode,
    /// Comma-separated, case-insensitive substrings matched against player
    /// bus names (and, in allow mode, against web-content URLs).
    #[clap(long, default_value = "")]
    pub filter_list: String,
    /// Always represent this player while it is present, bypassing scoring.
    /// Takes the full bus name, e.g. `org.mpris.MediaPlayer2.mpv`.
    #[clap(long)]
    pub pin_player: Option<String>,
    /// Disable the synced lyrics lookup and display.
    #[clap(long)]
    pub no_lyrics: bool,
    /// Wait longer before refreshing, for players with slow property
    /// propagation.
    #[clap(long)]
    pub compat_delay: bool,
    /// Path to an image shown when a player never reported any album art.
    #[clap(long)]
    pub fallback_art: Option<String>,
    /// File to write the log to. If not specified, logs will be written to stderr.
    #[clap(long, short)]
    log_file: Option<String>,
}

impl Args {
    /// Build the tracing subscriber using parameters from the command line arguments
    ///
    /// # Panics
    ///
    /// Panics if the log file cannot be opened.
    pub fn init_tracing_subscriber(&self) {
        let builder = tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env());

        match self.log_file.as_ref() {
            None => builder.with_writer(io::stderr).init(),
            Some(f) => builder
                .with_writer(Mutex::new(File::create(f).unwrap()))
                .init(),
        }
    }
}
