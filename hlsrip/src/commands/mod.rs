mod client;
mod playlist;
mod save;

pub use playlist::Playlist;
pub use save::Save;

use clap::{ArgAction, ColorChoice, Parser, Subcommand};

/// Download, decrypt and merge AES-128 encrypted HLS streams.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// When to output colored text.
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Show debug logs, use twice for trace logs of every crate.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Playlist(Playlist),
    Save(Save),
}
