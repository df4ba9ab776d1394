//! Model session lifecycle and serialized inference access
//!
//! [`ModelManager`] is the single authority for one segmentation model:
//! it fetches weights lazily, builds an inference session with provider
//! fallback, and serializes every inference request through one FIFO queue.
//! The manager is an explicitly constructed service shared via `Arc`; there
//! is no ambient global session.

use crate::config::ScanConfig;
use crate::download::ModelFetcher;
use crate::error::{ClosetError, Result};
use crate::progress::{NoOpProgress, ProgressSink};
use ndarray::Array4;
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, oneshot, watch, Mutex};

/// A loaded model session capable of running one request at a time
///
/// Implementations are not reentrant; the manager guarantees exclusive
/// access by running them on a dedicated worker thread.
pub trait InferenceSession: Send {
    /// Run the model on a normalized NCHW input tensor
    ///
    /// # Errors
    /// - Model execution failures
    /// - Tensor conversion or shape errors
    fn run(&mut self, input: Array4<f32>) -> Result<Array4<f32>>;
}

/// Builds inference sessions from raw model weights
///
/// Injected into [`ModelManager`] so session construction stays swappable
/// across runtime backends and replaceable in tests.
pub trait SessionFactory: Send + Sync {
    /// Construct a session from ONNX weight bytes
    ///
    /// # Errors
    /// - Malformed model data
    /// - Provider construction failing on every fallback tier
    fn build(&self, model_data: &[u8], config: &ScanConfig) -> Result<Box<dyn InferenceSession>>;
}

/// One queued inference request
struct InferenceJob {
    input: Array4<f32>,
    reply: oneshot::Sender<Result<Array4<f32>>>,
}

/// Shared record of how an in-flight load ended, for attached waiters
type LoadOutcome = Arc<OnceLock<std::result::Result<(), String>>>;

enum SessionState {
    Unloaded,
    Loading(watch::Receiver<u8>, LoadOutcome),
    Ready(mpsc::UnboundedSender<InferenceJob>),
}

/// Owns the lifecycle of one segmentation model session
pub struct ModelManager {
    config: ScanConfig,
    fetcher: ModelFetcher,
    factory: Arc<dyn SessionFactory>,
    state: Arc<Mutex<SessionState>>,
}

impl ModelManager {
    /// Create a manager with the default ONNX Runtime session factory
    ///
    /// # Errors
    /// - Failed to initialize the model cache or HTTP client
    #[cfg(feature = "onnx")]
    pub fn new(config: ScanConfig) -> Result<Self> {
        let fetcher = ModelFetcher::new()?;
        let factory: Arc<dyn SessionFactory> = Arc::new(crate::backends::OnnxSessionFactory);
        Ok(Self::with_factory(config, fetcher, factory))
    }

    /// Create a manager with an injected fetcher and session factory
    #[must_use]
    pub fn with_factory(
        config: ScanConfig,
        fetcher: ModelFetcher,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            config,
            fetcher,
            factory,
            state: Arc::new(Mutex::new(SessionState::Unloaded)),
        }
    }

    /// The configuration this manager was built with
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Whether the session is loaded and accepting inference requests
    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.lock().await, SessionState::Ready(_))
    }

    /// Load the model if needed, reporting progress into `sink`
    ///
    /// Idempotent and single-flight: a ready manager reports `100`
    /// immediately, and concurrent callers attach to the in-flight load
    /// instead of fetching twice. Every sink observes a monotonically
    /// non-decreasing sequence that contains `100` exactly once on success.
    ///
    /// # Errors
    /// - `ClosetError::ModelInit` when fetching weights or building the
    ///   session fails; the manager reverts to unloaded so a retry can
    ///   succeed
    pub async fn initialize(&self, sink: &dyn ProgressSink) -> Result<()> {
        let (rx, outcome) = {
            let mut state = self.state.lock().await;
            match &*state {
                SessionState::Ready(_) => {
                    drop(state);
                    sink.on_progress(100);
                    return Ok(());
                },
                SessionState::Loading(rx, outcome) => (rx.clone(), Arc::clone(outcome)),
                SessionState::Unloaded => {
                    let (tx, rx) = watch::channel(0u8);
                    let outcome: LoadOutcome = Arc::new(OnceLock::new());
                    *state = SessionState::Loading(rx.clone(), Arc::clone(&outcome));
                    self.spawn_load(tx, Arc::clone(&outcome));
                    (rx, outcome)
                },
            }
        };

        follow_progress(rx, &outcome, sink).await
    }

    /// Run one inference, initializing the model first if needed
    ///
    /// Concurrent calls are served strictly in arrival order through a
    /// single queue; the session never executes two requests at once. A
    /// failed request leaves the queue serving later requests.
    ///
    /// # Errors
    /// - `ClosetError::ModelInit` when lazy initialization fails
    /// - `ClosetError::Inference` when the model run fails
    pub async fn infer(&self, input: Array4<f32>) -> Result<Array4<f32>> {
        self.initialize(&NoOpProgress).await?;

        let jobs = {
            let state = self.state.lock().await;
            match &*state {
                SessionState::Ready(jobs) => jobs.clone(),
                _ => return Err(ClosetError::inference("Model session is not ready")),
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        jobs.send(InferenceJob {
            input,
            reply: reply_tx,
        })
        .map_err(|_| ClosetError::inference("Inference worker is gone"))?;

        reply_rx
            .await
            .map_err(|_| ClosetError::inference("Inference worker dropped the request"))?
    }

    /// Start the load flight as an independent task
    ///
    /// The flight outlives the initiating caller, so attached waiters still
    /// complete if the first caller goes away.
    fn spawn_load(&self, tx: watch::Sender<u8>, outcome: LoadOutcome) {
        let state = Arc::clone(&self.state);
        let fetcher = self.fetcher.clone();
        let factory = Arc::clone(&self.factory);
        let config = self.config.clone();

        tokio::spawn(async move {
            let loaded = load_session(&fetcher, factory, &config, &tx).await;

            match loaded {
                Ok(jobs) => {
                    let _ = outcome.set(Ok(()));
                    {
                        let mut guard = state.lock().await;
                        *guard = SessionState::Ready(jobs);
                    }
                    // State is published before the final percent so a
                    // caller that observes 100 finds the session ready
                    let _ = tx.send(100);
                },
                Err(e) => {
                    log::warn!("Model initialization failed: {e}");
                    let _ = outcome.set(Err(e.to_string()));
                    let mut guard = state.lock().await;
                    *guard = SessionState::Unloaded;
                },
            }
        });
    }
}

/// Fetch weights, build the session, and start its worker thread
async fn load_session(
    fetcher: &ModelFetcher,
    factory: Arc<dyn SessionFactory>,
    config: &ScanConfig,
    tx: &watch::Sender<u8>,
) -> Result<mpsc::UnboundedSender<InferenceJob>> {
    let variant = config
        .model_spec
        .variant
        .unwrap_or(config.engine.default_variant());
    let fetch_sink = WatchSink { tx };
    let weights_path = fetcher
        .ensure_weights(&config.model_spec.source, variant, &fetch_sink)
        .await?;

    let model_data = tokio::fs::read(&weights_path)
        .await
        .map_err(|e| ClosetError::file_io_error("read model weights", &weights_path, e))?;

    log::debug!(
        "Building inference session ({} bytes of weights)",
        model_data.len()
    );

    let build_config = config.clone();
    let session = tokio::task::spawn_blocking(move || factory.build(&model_data, &build_config))
        .await
        .map_err(|e| ClosetError::model_init(format!("Session build task failed: {e}")))??;

    let (job_tx, job_rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("closetkit-inference".to_string())
        .spawn(move || worker_loop(session, job_rx))
        .map_err(|e| ClosetError::model_init(format!("Failed to start inference worker: {e}")))?;

    Ok(job_tx)
}

/// Dedicated thread owning the session; jobs are served in arrival order
fn worker_loop(
    mut session: Box<dyn InferenceSession>,
    mut jobs: mpsc::UnboundedReceiver<InferenceJob>,
) {
    while let Some(job) = jobs.blocking_recv() {
        let result = session.run(job.input);
        if let Err(e) = &result {
            log::warn!("Inference request failed: {e}");
        }
        // A caller that dropped its reply channel just discards the result
        let _ = job.reply.send(result);
    }
    log::debug!("Inference worker shutting down");
}

/// Forwards fetch progress into the load's watch channel
///
/// Download percentages are capped at 99; the manager sends the final 100
/// itself once the session is built, so 100 always means ready.
struct WatchSink<'a> {
    tx: &'a watch::Sender<u8>,
}

impl ProgressSink for WatchSink<'_> {
    fn on_progress(&self, percent: u8) {
        let capped = percent.min(99);
        let current = *self.tx.borrow();
        if capped > current {
            let _ = self.tx.send(capped);
        }
    }
}

/// Mirror an in-flight load's progress into a caller's sink
///
/// Values are de-duplicated so the sink sees a non-decreasing sequence
/// ending at the first `100`. A channel that closes before `100` means the
/// load failed; the recorded outcome supplies the error message.
async fn follow_progress(
    mut rx: watch::Receiver<u8>,
    outcome: &LoadOutcome,
    sink: &dyn ProgressSink,
) -> Result<()> {
    let mut last: Option<u8> = None;
    loop {
        let value = *rx.borrow_and_update();
        if last.map_or(true, |seen| value > seen) {
            sink.on_progress(value);
            last = Some(value);
        }
        if value >= 100 {
            return Ok(());
        }
        if rx.changed().await.is_err() {
            let message = outcome
                .get()
                .and_then(|result| result.as_ref().err().cloned())
                .unwrap_or_else(|| "Model load aborted before completion".to_string());
            return Err(ClosetError::model_init(message));
        }
    }
}
