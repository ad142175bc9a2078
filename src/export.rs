//! Export flow
//!
//! Strictly sequential per request: readiness, input hand-off, compile and
//! assemble, run, read back. One export at a time per session.

use crate::args::{assemble, EngineArguments, InputNames};
use crate::engine::{EngineLifecycle, MediaEngine, RatioCallback};
use crate::error::{MediaError, Result};
use crate::pipeline::compile;
use crate::presets;
use crate::progress::{emit, ProgressTracker, Status, StatusSink};
use crate::request::EditRequest;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Finished export, ready to hand to the user.
#[derive(Debug, Clone)]
pub struct ExportedAsset {
    pub name: String,
    pub bytes: Vec<u8>,
    pub args: EngineArguments,
}

/// Compile and assemble without touching the engine.
pub fn plan(request: &EditRequest) -> EngineArguments {
    assemble(
        &compile(request),
        request,
        &InputNames::default(),
        presets::OUTPUT_VIDEO_NAME,
    )
}

/// Engine session plus the export entry point.
pub struct EditSession<E: MediaEngine> {
    lifecycle: EngineLifecycle<E>,
    busy: AtomicBool,
    status: Option<StatusSink>,
}

impl<E: MediaEngine> EditSession<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            lifecycle: EngineLifecycle::new(engine),
            busy: AtomicBool::new(false),
            status: None,
        }
    }

    pub fn with_status(engine: Arc<E>, sink: StatusSink) -> Self {
        Self {
            lifecycle: EngineLifecycle::new(engine).with_status(Arc::clone(&sink)),
            busy: AtomicBool::new(false),
            status: Some(sink),
        }
    }

    pub fn lifecycle(&self) -> &EngineLifecycle<E> {
        &self.lifecycle
    }

    pub fn status(&self) -> Option<&StatusSink> {
        self.status.as_ref()
    }

    pub async fn export(&self, video: &[u8], request: &EditRequest) -> Result<ExportedAsset> {
        let _guard = BusyGuard::acquire(&self.busy)?;

        let result = self.run_export(video, request).await;
        match &result {
            Ok(asset) => {
                info!("Export finished: {} ({} bytes)", asset.name, asset.bytes.len());
                emit(self.status.as_ref(), Status::Done);
            }
            Err(e) => {
                error!("Export failed: {}", e);
                emit(self.status.as_ref(), Status::ExportFailed);
            }
        }
        result
    }

    async fn run_export(&self, video: &[u8], request: &EditRequest) -> Result<ExportedAsset> {
        self.lifecycle.ensure_ready().await?;
        emit(self.status.as_ref(), Status::Preparing);

        let inputs = InputNames::default();
        let engine = self.lifecycle.engine();
        engine.write_file(&inputs.video, video).await?;
        if let Some(sticker) = &request.sticker_asset {
            engine.write_file(&inputs.sticker, sticker.bytes()).await?;
        }

        let pipeline = compile(request);
        let args = assemble(&pipeline, request, &inputs, presets::OUTPUT_VIDEO_NAME);
        debug!("Engine args: {:?}", args.as_slice());

        let tracker = ProgressTracker::new(self.status.clone());
        let tracker_clone = Arc::clone(&tracker);
        let progress: RatioCallback = Arc::new(move |ratio: f64| {
            tracker_clone.report(ratio);
        });

        emit(self.status.as_ref(), Status::ExportingHq);
        engine.run(args.as_slice(), progress).await?;

        emit(self.status.as_ref(), Status::Finalizing);
        let bytes = engine.read_file(presets::OUTPUT_VIDEO_NAME).await?;

        Ok(ExportedAsset {
            name: presets::EXPORT_ASSET_NAME.to_string(),
            bytes,
            args,
        })
    }
}

struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MediaError::ExportInProgress)?;
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
