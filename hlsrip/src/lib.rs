//! Download, decrypt and merge AES-128 encrypted HLS streams.
//!
//! ```no_run
//! use hlsrip::{Destination, HttpTransport, Manifest, Pipeline, PipelineConfig};
//! use std::{path::Path, sync::Arc};
//!
//! let manifest = Manifest::load(Path::new("video.m3u8"), None)?;
//! let pipeline = Pipeline::new(Arc::new(HttpTransport::default()), PipelineConfig::default());
//! let path = pipeline.run(&manifest, &Destination::new("12"), &mut ())?;
//! println!("{}", path.display());
//! # Ok::<(), hlsrip::Error>(())
//! ```

mod config;
mod decrypt;
mod error;
mod fetch;
mod key;
mod manifest;
mod merger;
mod pipeline;
mod transport;
mod utils;

pub use config::{DEFAULT_ORIGIN, DEFAULT_USER_AGENT, PipelineConfig, default_headers};
pub use decrypt::{Decryptor, PlainSegment};
pub use error::{
    AssemblyError, Error, FetchCause, KeyFetchError, ManifestError, Result, TransportError,
};
pub use fetch::{RawSegment, SegmentFetcher};
pub use key::{KeyMaterial, KeyResolver};
pub use manifest::{KeyRef, Manifest, SegmentRef};
pub use merger::{Destination, Merger, assemble};
pub use pipeline::{CancelHandle, Observer, Phase, Pipeline, SegmentProgress};
pub use reqwest;
pub use transport::{HttpTransport, Response, Transport};
pub use utils::format_bytes;
