use super::client::{ClientOptions, fetch_playlist};
use anyhow::Result;
use clap::Args;
use hlsrip::{HttpTransport, PipelineConfig};
use log::info;
use reqwest::Url;
use std::{fs, path::PathBuf};

/// Download a playlist to a local file.
#[derive(Debug, Clone, Args)]
pub struct Playlist {
    /// http(s):// url of the .m3u8 playlist.
    #[arg(required = true)]
    pub url: Url,

    /// Path of the saved playlist.
    #[arg(short, long, default_value = "video.m3u8")]
    pub output: PathBuf,

    #[command(flatten)]
    pub client: ClientOptions,
}

impl Playlist {
    pub fn execute(self) -> Result<()> {
        let transport = HttpTransport::new(self.client.client()?);
        let config = self.client.config(PipelineConfig::default())?;
        let response = fetch_playlist(&transport, &config, &self.url)?;

        fs::write(&self.output, &response.body)?;
        info!("Saved {} (from {})", self.output.display(), response.url);
        Ok(())
    }
}
