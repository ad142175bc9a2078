//! Media engine contract and session lifecycle
//!
//! ## States
//!
//! `Unloaded -> Loading -> Ready`, or `Loading -> Failed`. A failed engine
//! is loaded again on the next request. At most one initialization is in
//! flight; every caller waiting on it sees the same outcome.

use crate::error::{MediaError, Result};
use crate::ffmpeg::FfmpegError;
use crate::progress::{emit, Status, StatusSink};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Receives the engine's best-effort completion ratio (`0..=1`).
pub type RatioCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// External transcoding engine.
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    async fn initialize(&self) -> std::result::Result<(), FfmpegError>;
    async fn write_file(&self, name: &str, bytes: &[u8]) -> std::result::Result<(), FfmpegError>;
    async fn run(&self, args: &[String], progress: RatioCallback) -> std::result::Result<(), FfmpegError>;
    async fn read_file(&self, name: &str) -> std::result::Result<Vec<u8>, FfmpegError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
    /// Initialization failed; holds the reason for reporting.
    Failed(String),
}

impl EngineState {
    pub fn as_str(&self) -> &str {
        match self {
            EngineState::Unloaded => "unloaded",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::Failed(_) => "failed",
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self, EngineState::Ready | EngineState::Failed(_))
    }
}

/// Sole owner of the engine session state.
pub struct EngineLifecycle<E: MediaEngine> {
    engine: Arc<E>,
    state: Arc<watch::Sender<EngineState>>,
    status: Option<StatusSink>,
}

impl<E: MediaEngine> EngineLifecycle<E> {
    pub fn new(engine: Arc<E>) -> Self {
        let (state, _) = watch::channel(EngineState::Unloaded);
        Self {
            engine,
            state: Arc::new(state),
            status: None,
        }
    }

    pub fn with_status(mut self, sink: StatusSink) -> Self {
        self.status = Some(sink);
        self
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    /// Load the engine if it is not loaded or loading, then wait for the outcome.
    pub async fn begin_load(&self) -> Result<()> {
        self.load(false).await
    }

    /// Same as [`Self::begin_load`], reported as a startup preload.
    pub async fn preload(&self) -> Result<()> {
        self.load(true).await
    }

    /// Return immediately when ready, otherwise load first.
    pub async fn ensure_ready(&self) -> Result<()> {
        if *self.state.borrow() == EngineState::Ready {
            return Ok(());
        }
        self.begin_load().await
    }

    async fn load(&self, preloading: bool) -> Result<()> {
        let mut rx = self.state.subscribe();

        let started = self.state.send_if_modified(|state| match state {
            EngineState::Unloaded | EngineState::Failed(_) => {
                *state = EngineState::Loading;
                true
            }
            EngineState::Loading | EngineState::Ready => false,
        });

        if started {
            let percent = if preloading { 5 } else { 10 };
            emit(self.status.as_ref(), Status::EngineLoading { percent, preloading });
            self.spawn_initialize();
        }

        let outcome = {
            let settled = rx
                .wait_for(EngineState::is_settled)
                .await
                .map_err(|_| MediaError::EngineUnavailable("engine session closed".to_string()))?;
            settled.clone()
        };

        match outcome {
            EngineState::Ready => Ok(()),
            EngineState::Failed(reason) => Err(MediaError::EngineUnavailable(reason)),
            EngineState::Unloaded | EngineState::Loading => Err(MediaError::EngineUnavailable(
                "engine did not settle".to_string(),
            )),
        }
    }

    // Runs detached so a dropped caller cannot strand the other waiters.
    fn spawn_initialize(&self) {
        let engine = Arc::clone(&self.engine);
        let state = Arc::clone(&self.state);
        let sink = self.status.clone();

        tokio::spawn(async move {
            info!("Initializing media engine");
            match engine.initialize().await {
                Ok(()) => {
                    state.send_replace(EngineState::Ready);
                    emit(sink.as_ref(), Status::EngineReady);
                }
                Err(e) => {
                    error!("Media engine failed to load: {}", e);
                    state.send_replace(EngineState::Failed(e.to_string()));
                    emit(sink.as_ref(), Status::EngineFailed);
                }
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory engine with scripted outcomes.
    #[derive(Default)]
    pub(crate) struct ScriptedEngine {
        pub init_calls: AtomicUsize,
        pub fail_init: AtomicBool,
        pub fail_run: AtomicBool,
        pub files: Mutex<HashMap<String, Vec<u8>>>,
        pub runs: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl MediaEngine for ScriptedEngine {
        async fn initialize(&self) -> std::result::Result<(), FfmpegError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            if self.fail_init.load(Ordering::SeqCst) {
                return Err(FfmpegError::NotInstalled("offline".to_string()));
            }
            Ok(())
        }

        async fn write_file(&self, name: &str, bytes: &[u8]) -> std::result::Result<(), FfmpegError> {
            self.files.lock().unwrap().insert(name.to_string(), bytes.to_vec());
            Ok(())
        }

        async fn run(&self, args: &[String], progress: RatioCallback) -> std::result::Result<(), FfmpegError> {
            self.runs.lock().unwrap().push(args.to_vec());
            if self.fail_run.load(Ordering::SeqCst) {
                return Err(FfmpegError::ExecutionFailed("unsupported codec".to_string()));
            }
            for ratio in [0.25, 0.1, 0.8, 1.0] {
                progress(ratio);
            }
            if let Some(output) = args.last() {
                self.files.lock().unwrap().insert(output.clone(), b"encoded".to_vec());
            }
            Ok(())
        }

        async fn read_file(&self, name: &str) -> std::result::Result<Vec<u8>, FfmpegError> {
            self.files
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| FfmpegError::InvalidOutput(name.to_string()))
        }
    }

    #[tokio::test]
    async fn test_initial_state_is_unloaded() {
        let lifecycle = EngineLifecycle::new(Arc::new(ScriptedEngine::default()));
        assert_eq!(lifecycle.state(), EngineState::Unloaded);
    }

    #[tokio::test]
    async fn test_concurrent_loads_initialize_once() {
        let engine = Arc::new(ScriptedEngine::default());
        let lifecycle = EngineLifecycle::new(Arc::clone(&engine));

        let (a, b) = tokio::join!(lifecycle.begin_load(), lifecycle.begin_load());
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), EngineState::Ready);

        lifecycle.begin_load().await.unwrap();
        lifecycle.ensure_ready().await.unwrap();
        assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_shared_and_retried_later() {
        let engine = Arc::new(ScriptedEngine::default());
        engine.fail_init.store(true, Ordering::SeqCst);
        let lifecycle = EngineLifecycle::new(Arc::clone(&engine));

        let (a, b) = tokio::join!(lifecycle.begin_load(), lifecycle.ensure_ready());
        assert!(matches!(a, Err(MediaError::EngineUnavailable(_))));
        assert!(matches!(b, Err(MediaError::EngineUnavailable(_))));
        assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(lifecycle.state(), EngineState::Failed(_)));

        engine.fail_init.store(false, Ordering::SeqCst);
        lifecycle.ensure_ready().await.unwrap();
        assert_eq!(engine.init_calls.load(Ordering::SeqCst), 2);
        assert_eq!(lifecycle.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_load_statuses() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: StatusSink = Arc::new(move |s: &Status| seen_clone.lock().unwrap().push(s.clone()));

        let lifecycle = EngineLifecycle::new(Arc::new(ScriptedEngine::default())).with_status(sink);
        lifecycle.preload().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                Status::EngineLoading { percent: 5, preloading: true },
                Status::EngineReady
            ]
        );
    }
}
