use crate::{
    config::PipelineConfig,
    error::{Error, FetchCause, Result},
    manifest::SegmentRef,
    transport::Transport,
};
use log::debug;
use reqwest::header::HeaderMap;
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

const STOP_POLL: Duration = Duration::from_millis(50);

/// Encrypted bytes of one segment.
#[derive(Clone, Debug)]
pub struct RawSegment {
    pub index: usize,
    pub data: Vec<u8>,
}

/// Downloads segments, retrying timeouts, connection errors and HTTP 5xx.
pub struct SegmentFetcher {
    transport: Arc<dyn Transport>,
    headers: HeaderMap,
    timeout: Duration,
    retries: u8,
    backoff: Duration,
}

impl SegmentFetcher {
    pub fn new(transport: Arc<dyn Transport>, config: &PipelineConfig) -> Self {
        Self {
            transport,
            headers: config.headers.clone(),
            timeout: config.timeout,
            retries: config.retries,
            backoff: config.backoff,
        }
    }

    pub fn fetch(&self, segment: &SegmentRef) -> Result<RawSegment> {
        self.fetch_until(segment, &|| false)
    }

    /// Same as [`fetch`](Self::fetch) but gives up with [`Error::Cancelled`]
    /// as soon as `stop` returns true, checked before every retry and while
    /// waiting out the backoff.
    pub fn fetch_until(
        &self,
        segment: &SegmentRef,
        stop: &dyn Fn() -> bool,
    ) -> Result<RawSegment> {
        let mut attempts: u16 = 0;

        loop {
            if stop() {
                return Err(Error::Cancelled);
            }

            attempts += 1;

            let cause = match self.transport.get(&segment.uri, &self.headers, self.timeout) {
                Ok(response) if response.status.is_success() => {
                    return Ok(RawSegment {
                        index: segment.index,
                        data: response.body,
                    });
                }
                Ok(response) => FetchCause::Status(response.status),
                Err(error) => FetchCause::Transport(error),
            };

            if !cause.is_transient() || attempts > self.retries as u16 {
                return Err(Error::SegmentFetch {
                    index: segment.index,
                    attempts,
                    cause,
                });
            }

            debug!(
                "Retrying segment {} ({}), attempt {} of {}",
                segment.index,
                cause,
                attempts + 1,
                self.retries as u16 + 1
            );

            if !wait(self.backoff * attempts as u32, stop) {
                return Err(Error::Cancelled);
            }
        }
    }
}

/// Sleeps for `duration` in short steps, returns false if `stop` fired meanwhile.
fn wait(duration: Duration, stop: &dyn Fn() -> bool) -> bool {
    let deadline = Instant::now() + duration;

    loop {
        let now = Instant::now();

        if now >= deadline {
            return true;
        }

        thread::sleep((deadline - now).min(STOP_POLL));

        if stop() {
            return false;
        }
    }
}
