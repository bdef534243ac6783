use crate::{
    config::PipelineConfig,
    decrypt::{Decryptor, PlainSegment},
    error::{Error, Result},
    fetch::SegmentFetcher,
    key::KeyResolver,
    manifest::Manifest,
    merger::{Destination, Merger},
    transport::Transport,
    utils,
};
use log::{debug, info};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    time::Duration,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Stages of a single run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ResolvingKey,
    Fetching,
    Draining,
    Sealed,
    Failed,
}

/// Reported once for every segment that finished downloading and decrypting.
#[derive(Clone, Debug)]
pub struct SegmentProgress {
    pub index: usize,
    /// Decrypted size of this segment.
    pub bytes: usize,
    pub completed: usize,
    pub total: usize,
}

/// Receives progress of a run. Called on the thread which invoked [`Pipeline::run`].
pub trait Observer {
    fn on_phase(&mut self, _phase: Phase) {}
    fn on_segment(&mut self, _progress: &SegmentProgress) {}
}

impl Observer for () {}

/// Stops a running pipeline from another thread.
///
/// A handle stays cancelled, every later run of the same [`Pipeline`] fails
/// with [`Error::Cancelled`] without touching the network or the disk.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Downloads, decrypts and merges every segment of a playlist.
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    config: PipelineConfig,
    cancel: CancelHandle,
}

struct Run<'a> {
    phase: Phase,
    observer: &'a mut dyn Observer,
    abort: Arc<AtomicBool>,
}

impl Run<'_> {
    fn transition(&mut self, phase: Phase) {
        debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.observer.on_phase(phase);
    }
}

struct AbortOnDrop(Arc<AtomicBool>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Pipeline {
    pub fn new(transport: Arc<dyn Transport>, config: PipelineConfig) -> Self {
        Self {
            transport,
            config,
            cancel: CancelHandle::default(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Runs every phase and returns the path of the sealed output file.
    ///
    /// The first error aborts the run. Queued segments are skipped, results
    /// of in-flight ones are discarded and no output file is left behind.
    pub fn run(
        &self,
        manifest: &Manifest,
        destination: &Destination,
        observer: &mut dyn Observer,
    ) -> Result<PathBuf> {
        let mut run = Run {
            phase: Phase::Idle,
            observer,
            abort: Arc::new(AtomicBool::new(false)),
        };

        match self.execute(manifest, destination, &mut run) {
            Ok(path) => {
                run.transition(Phase::Sealed);
                Ok(path)
            }
            Err(e) => {
                run.transition(Phase::Failed);
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        manifest: &Manifest,
        destination: &Destination,
        run: &mut Run,
    ) -> Result<PathBuf> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        run.transition(Phase::ResolvingKey);
        let key = KeyResolver::new(self.transport.clone(), &self.config)
            .resolve(manifest.primary_key())?;
        let decryptor = Decryptor::new(Arc::new(key));
        let fetcher = Arc::new(SegmentFetcher::new(self.transport.clone(), &self.config));

        let total = manifest.segments().len();
        let mut merger = Merger::create(destination)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.max(1))
            .thread_name(|i| format!("segment-{}", i))
            .build()?;
        let (sender, receiver) = mpsc::channel::<Result<PlainSegment>>();

        run.transition(Phase::Fetching);
        info!(
            "Downloading {} segments using {} threads",
            total,
            self.config.threads.max(1)
        );

        for segment in manifest.segments() {
            let segment = segment.clone();
            let fetcher = fetcher.clone();
            let decryptor = decryptor.clone();
            let sender = sender.clone();
            let abort = run.abort.clone();
            let cancel = self.cancel.clone();

            pool.spawn(move || {
                let stop = || abort.load(Ordering::SeqCst) || cancel.is_cancelled();

                if stop() {
                    return;
                }

                let result = fetcher
                    .fetch_until(&segment, &stop)
                    .and_then(|raw| decryptor.decrypt(raw));
                // receiver is gone once the run failed
                let _ = sender.send(result);
            });
        }

        drop(sender);
        // stops queued segments whenever draining ends early
        let _abort = AbortOnDrop(run.abort.clone());
        run.transition(Phase::Draining);

        let mut pending = BTreeMap::new();
        let mut completed = 0;

        while completed < total {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let segment = match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(result) => result?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) if self.cancel.is_cancelled() => {
                    return Err(Error::Cancelled);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Incomplete {
                        received: completed,
                        expected: total,
                    });
                }
            };

            completed += 1;
            run.observer.on_segment(&SegmentProgress {
                index: segment.index,
                bytes: segment.data.len(),
                completed,
                total,
            });
            pending.insert(segment.index, segment);

            while let Some(segment) = pending.remove(&merger.position()) {
                merger.write(&segment)?;
            }
        }

        let stored = merger.stored();
        let path = merger.seal(total)?;
        info!(
            "Saved {} ({})",
            path.display(),
            utils::format_bytes(stored, 2)
        );
        Ok(path)
    }
}
