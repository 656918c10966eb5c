//! Per-view cover loading with cooperative cancellation.
//!
//! Decoding runs on one worker thread per view. Finished loads travel back over
//! a channel that only the owning view drains, so the registry and the view's
//! rows are only ever touched from the coordinating thread. A load's effect is
//! suppressed when its view's [`CancelScope`] is canceled or when a manual
//! refresh bumped the album's cover generation after the load was issued.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::album::{Album, AlbumKey, CoverImage};
use crate::registry::{CoverWrite, RegistryHandle};

/// Cancellation token owned by one browser view.
///
/// Canceled once at view teardown; a canceled scope stays canceled.
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    canceled: Arc<AtomicBool>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when this call performed the cancellation.
    pub fn cancel(&self) -> bool {
        !self.canceled.swap(true, Ordering::AcqRel)
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverState {
    Unscanned,
    Loading,
    Scanned,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("no cover image found for album {0}")]
    NotFound(AlbumKey),
    #[error("failed to read cover: {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode cover {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
}

/// Album data handed to the decoder; owned so it can cross to the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverRequest {
    pub key: AlbumKey,
    pub title: String,
    pub song_paths: Vec<PathBuf>,
}

impl CoverRequest {
    pub fn for_album(album: &Album) -> Self {
        Self {
            key: album.key().clone(),
            title: album.title.clone(),
            song_paths: album.songs.iter().map(|song| song.path.clone()).collect(),
        }
    }
}

/// Fetches and decodes cover artwork. Called on the loader's worker thread.
pub trait CoverDecoder: Send + Sync {
    fn decode_cover(
        &self,
        request: &CoverRequest,
        scale_factor: f64,
    ) -> Result<CoverImage, DecodeError>;
}

struct CoverJob {
    request: CoverRequest,
    generation: u64,
    scale_factor: f64,
    scope: CancelScope,
}

struct CoverCompletion {
    key: AlbumKey,
    generation: u64,
    result: Result<CoverImage, DecodeError>,
}

/// What happened to a finished load once it reached the coordinating thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Cover (or its absence) was stored; the row needs a redraw if still shown.
    Applied(AlbumKey),
    Canceled(AlbumKey),
    Stale(AlbumKey),
    /// The album left the registry while loading.
    Missing(AlbumKey),
}

impl CompletionOutcome {
    pub fn key(&self) -> &AlbumKey {
        match self {
            Self::Applied(key) | Self::Canceled(key) | Self::Stale(key) | Self::Missing(key) => {
                key
            }
        }
    }
}

pub struct CoverLoadCoordinator {
    registry: RegistryHandle,
    scope: CancelScope,
    job_sender: Option<mpsc::Sender<CoverJob>>,
    completion_receiver: mpsc::Receiver<CoverCompletion>,
    /// Album key to the cover generation its outstanding load was issued for.
    in_flight: HashMap<AlbumKey, u64>,
}

impl CoverLoadCoordinator {
    pub fn new(registry: RegistryHandle, decoder: Arc<dyn CoverDecoder>) -> Self {
        let (job_sender, job_receiver) = mpsc::channel::<CoverJob>();
        let (completion_sender, completion_receiver) = mpsc::channel::<CoverCompletion>();
        let spawned = thread::Builder::new()
            .name("covergrid-cover-loader".to_string())
            .spawn(move || run_worker(decoder.as_ref(), job_receiver, completion_sender));
        let job_sender = match spawned {
            Ok(_) => Some(job_sender),
            Err(err) => {
                warn!("Cover loader: failed to spawn worker thread: {}", err);
                None
            }
        };
        Self {
            registry,
            scope: CancelScope::new(),
            job_sender,
            completion_receiver,
            in_flight: HashMap::new(),
        }
    }

    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    pub fn is_loading(&self, key: &AlbumKey) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn cover_state(&self, album: &Album) -> CoverState {
        if album.is_scanned() {
            CoverState::Scanned
        } else if self.is_loading(album.key()) {
            CoverState::Loading
        } else {
            CoverState::Unscanned
        }
    }

    /// Issues a load for `key`. Returns false when nothing was issued.
    ///
    /// Scanned albums are skipped unless `force` is set; a forced load makes
    /// any older in-flight load for the album stale.
    pub fn request_load(&mut self, key: &AlbumKey, scale_factor: f64, force: bool) -> bool {
        if self.scope.is_canceled() {
            return false;
        }
        let Some(job_sender) = self.job_sender.as_ref() else {
            return false;
        };
        if force {
            self.registry.mark_unscanned(std::slice::from_ref(key));
        }
        let candidate = self.registry.read(|index| {
            index
                .get(key)
                .filter(|album| !album.is_scanned())
                .map(|album| (CoverRequest::for_album(album), album.cover_generation))
        });
        let Some((request, generation)) = candidate else {
            return false;
        };
        if self.in_flight.get(key) == Some(&generation) {
            return false;
        }

        let job = CoverJob {
            request,
            generation,
            scale_factor,
            scope: self.scope.clone(),
        };
        if job_sender.send(job).is_err() {
            warn!("Cover loader: worker gone, dropping load album={}", key);
            self.job_sender = None;
            return false;
        }
        debug!(
            "Cover loader: load issued album={} generation={} scale={}",
            key, generation, scale_factor
        );
        self.in_flight.insert(key.clone(), generation);
        true
    }

    /// Settles every completion that has already arrived.
    pub fn process_completions(&mut self) -> Vec<CompletionOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(completion) = self.completion_receiver.try_recv() {
            outcomes.push(self.settle(completion));
        }
        outcomes
    }

    /// Blocks up to `timeout` for the next completion and settles it.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> Option<CompletionOutcome> {
        let completion = self.completion_receiver.recv_timeout(timeout).ok()?;
        Some(self.settle(completion))
    }

    /// Cancels the scope and stops the worker once its current decode returns.
    pub fn cancel(&mut self) {
        if self.scope.cancel() {
            debug!(
                "Cover loader: scope canceled pending={}",
                self.in_flight.len()
            );
        }
        self.job_sender = None;
    }

    fn settle(&mut self, completion: CoverCompletion) -> CompletionOutcome {
        let CoverCompletion {
            key,
            generation,
            result,
        } = completion;
        if self.in_flight.get(&key) == Some(&generation) {
            self.in_flight.remove(&key);
        }
        if self.scope.is_canceled() {
            debug!(
                "Cover loader: discarded completion for canceled scope album={}",
                key
            );
            return CompletionOutcome::Canceled(key);
        }

        let cover = match result {
            Ok(image) => Some(Arc::new(image)),
            Err(err) => {
                debug!("Cover loader: no cover album={} reason={}", key, err);
                None
            }
        };
        match self.registry.write_cover(&key, generation, cover) {
            CoverWrite::Applied => CompletionOutcome::Applied(key),
            CoverWrite::Stale => {
                debug!(
                    "Cover loader: discarded stale completion album={} generation={}",
                    key, generation
                );
                CompletionOutcome::Stale(key)
            }
            CoverWrite::Missing => {
                debug!("Cover loader: album removed while loading album={}", key);
                CompletionOutcome::Missing(key)
            }
        }
    }
}

impl Drop for CoverLoadCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn run_worker(
    decoder: &dyn CoverDecoder,
    jobs: mpsc::Receiver<CoverJob>,
    completions: mpsc::Sender<CoverCompletion>,
) {
    while let Ok(job) = jobs.recv() {
        if job.scope.is_canceled() {
            continue;
        }
        let result = decoder.decode_cover(&job.request, job.scale_factor);
        let completion = CoverCompletion {
            key: job.request.key,
            generation: job.generation,
            result,
        };
        if completions.send(completion).is_err() {
            break;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    pub fn solid_cover(edge: u32) -> CoverImage {
        CoverImage::new(image::RgbaImage::from_pixel(
            edge,
            edge,
            image::Rgba([200, 40, 40, 255]),
        ))
    }

    /// Succeeds immediately for every album except those listed as missing.
    #[derive(Default)]
    pub struct InstantDecoder {
        pub missing: Vec<AlbumKey>,
    }

    impl CoverDecoder for InstantDecoder {
        fn decode_cover(
            &self,
            request: &CoverRequest,
            _scale_factor: f64,
        ) -> Result<CoverImage, DecodeError> {
            if self.missing.contains(&request.key) {
                return Err(DecodeError::NotFound(request.key.clone()));
            }
            Ok(solid_cover(4))
        }
    }

    /// Reports each decode start and blocks until the test releases it.
    pub struct GatedDecoder {
        started: Mutex<mpsc::Sender<AlbumKey>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    pub struct Gate {
        pub started: mpsc::Receiver<AlbumKey>,
        pub release: mpsc::Sender<()>,
    }

    impl Gate {
        pub fn wait_started(&self) -> AlbumKey {
            self.started
                .recv_timeout(Duration::from_secs(5))
                .expect("decode should start")
        }

        pub fn open(&self) {
            self.release.send(()).expect("decoder should be waiting");
        }
    }

    pub fn gated_decoder() -> (Arc<GatedDecoder>, Gate) {
        let (started_sender, started) = mpsc::channel();
        let (release, release_receiver) = mpsc::channel();
        let decoder = GatedDecoder {
            started: Mutex::new(started_sender),
            release: Mutex::new(release_receiver),
        };
        (Arc::new(decoder), Gate { started, release })
    }

    impl CoverDecoder for GatedDecoder {
        fn decode_cover(
            &self,
            request: &CoverRequest,
            _scale_factor: f64,
        ) -> Result<CoverImage, DecodeError> {
            let _ = self
                .started
                .lock()
                .expect("gate lock poisoned")
                .send(request.key.clone());
            let _ = self
                .release
                .lock()
                .expect("gate lock poisoned")
                .recv_timeout(Duration::from_secs(5));
            Ok(solid_cover(4))
        }
    }
}
