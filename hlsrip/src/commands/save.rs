use super::client::{ClientOptions, fetch_playlist};
use anyhow::{Result, anyhow};
use clap::Args;
use hlsrip::{
    Destination, HttpTransport, Manifest, Observer, Phase, Pipeline, PipelineConfig,
    SegmentProgress, Transport,
};
use kdam::{Bar, BarExt, tqdm};
use log::{info, warn};
use reqwest::Url;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Download, decrypt and merge an AES-128 encrypted HLS playlist.
#[derive(Debug, Clone, Args)]
pub struct Save {
    /// http(s):// | .m3u8
    #[arg(required = true)]
    pub input: String,

    /// Base url to be used for building absolute url to segment.
    /// This flag is usually needed for local input files.
    /// By default redirected playlist url is used.
    #[arg(long)]
    pub base_url: Option<Url>,

    /// Directory where the merged file is saved.
    /// By default current working directory is used.
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Title of the merged file without extension.
    /// By default the playlist file name is used.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Container extension of the merged file.
    #[arg(long, default_value = "mp4")]
    pub ext: String,

    /// Parse playlist and returns it in json format.
    #[arg(long)]
    pub parse: bool,

    #[command(flatten)]
    pub client: ClientOptions,

    /// Milliseconds to wait before the first retry, later retries wait linearly longer.
    #[arg(long, help_heading = "Download Options", default_value_t = 1000)]
    pub backoff: u64,

    /// Maximum number of retries to download an individual segment.
    #[arg(long, help_heading = "Download Options", default_value_t = 3)]
    pub retry_count: u8,

    /// Maximum number of threads for parllel downloading of segments.
    /// Number of threads should be in range 1-64 (inclusive).
    #[arg(short, long, help_heading = "Download Options", default_value_t = 10, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub threads: u8,
}

impl Save {
    pub fn execute(self) -> Result<()> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(self.client.client()?));
        let config = self.client.config(
            PipelineConfig::default()
                .threads(self.threads as usize)
                .retries(self.retry_count)
                .backoff(Duration::from_millis(self.backoff)),
        )?;
        let manifest = self.manifest(transport.as_ref(), &config)?;

        if self.parse {
            serde_json::to_writer(std::io::stdout(), &manifest)?;
            return Ok(());
        }

        let mut destination = Destination::new(self.title()).extension(&self.ext);

        if let Some(directory) = &self.directory {
            destination = destination.directory(directory);
        }

        let pipeline = Pipeline::new(transport, config);
        let cancel = pipeline.cancel_handle();

        ctrlc::set_handler(move || {
            warn!("Ctrl+C received, stopping gracefully.");
            cancel.cancel();
        })?;

        info!("Saving to {}", destination.path().display());
        pipeline.run(&manifest, &destination, &mut SegmentBar::default())?;
        Ok(())
    }

    fn manifest(&self, transport: &dyn Transport, config: &PipelineConfig) -> Result<Manifest> {
        let path = Path::new(&self.input);

        if path.exists() {
            if self.base_url.is_none() {
                warn!("base url is not set, relative segment uris cannot be resolved");
            }

            return Ok(Manifest::load(path, self.base_url.as_ref())?);
        }

        let url = self
            .input
            .parse::<Url>()
            .map_err(|_| anyhow!("{} is neither a file nor a url.", self.input))?;
        info!("Fetching playlist {}", url);
        let response = fetch_playlist(transport, config, &url)?;
        let base_url = self.base_url.clone().unwrap_or(response.url);
        Ok(Manifest::parse(&response.body, Some(&base_url))?)
    }

    fn title(&self) -> String {
        if let Some(output) = &self.output {
            return output.to_owned();
        }

        let name = match self.input.parse::<Url>() {
            Ok(url) if url.scheme().starts_with("http") => url
                .path_segments()
                .and_then(|mut x| x.next_back())
                .map(|x| x.to_owned()),
            _ => Some(self.input.to_owned()),
        };

        name.as_deref()
            .map(Path::new)
            .and_then(|x| x.file_stem())
            .map(|x| x.to_string_lossy().into_owned())
            .filter(|x| !x.is_empty())
            .unwrap_or_else(|| "video".to_owned())
    }
}

/// Segment progress bar with downloaded size as description.
#[derive(Default)]
struct SegmentBar {
    pb: Option<Bar>,
    bytes: usize,
}

impl Observer for SegmentBar {
    fn on_phase(&mut self, phase: Phase) {
        if matches!(phase, Phase::Sealed | Phase::Failed) && self.pb.take().is_some() {
            eprintln!();
        }
    }

    fn on_segment(&mut self, progress: &SegmentProgress) {
        self.bytes += progress.bytes;
        let pb = self
            .pb
            .get_or_insert_with(|| tqdm!(total = progress.total, unit = "seg".to_owned()));
        pb.set_description(hlsrip::format_bytes(self.bytes, 2));
        let _ = pb.update(1);
    }
}
