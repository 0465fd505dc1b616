use anyhow::Result;
use clap::Parser as _;
use event_loop::event_loop;
use zbus::Connection;

mod args;
mod config;
mod dbus;
mod debounce;
mod event_loop;
mod filter;
mod lyrics;
mod metadata;
mod output;
mod player;
mod registry;
mod select;
mod sync;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = args::Args::parse();
    args.init_tracing_subscriber();
    let settings = config::Settings::from_args(&args);

    let connection = Connection::session().await?;
    event_loop(connection, settings).await
}
