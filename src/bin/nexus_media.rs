// nexus_media - export/sticker daemon
// Independent editing service accessible via Unix Domain Socket

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use nexus_media::organ::{MediaOrgan, Organ, Response, Stimulus};
use nexus_media::{EngineConfig, FfmpegEngine, Status, StatusSink};

#[derive(Parser)]
#[command(name = "nexus_media", version, about = "Nexus Media Daemon - FFmpeg Edit Compiler")]
struct Args {
    /// Unix socket path for UDS server
    #[arg(long, default_value = "/tmp/nexus_media.sock")]
    socket_path: String,

    /// Directory backing the engine's input/output files
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// ffmpeg binary
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe binary (progress estimation)
    #[arg(long, default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// Skip loading the engine at startup
    #[arg(long)]
    no_preload: bool,
}

/// Largest request frame accepted from a client.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Latest status updates, reported by the health op.
#[derive(Default)]
struct StatusBoard {
    last: Mutex<Option<Status>>,
    engine_percent: AtomicU8,
}

impl StatusBoard {
    fn sink(self: &Arc<Self>) -> StatusSink {
        let board = Arc::clone(self);
        Arc::new(move |status: &Status| {
            if let Some(percent) = status.engine_percent() {
                board.engine_percent.store(percent, Ordering::Relaxed);
            }
            if let Ok(mut last) = board.last.lock() {
                *last = Some(status.clone());
            }
        })
    }

    fn last_message(&self) -> Option<String> {
        self.last.lock().ok().and_then(|last| last.as_ref().map(|s| s.to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args = Args::parse();

    info!("Starting Nexus Media Daemon");
    info!("   Socket: {}", args.socket_path);

    // Track startup time for health checks
    let start_time = std::time::Instant::now();

    let mut config = EngineConfig {
        ffmpeg_path: args.ffmpeg.clone(),
        ffprobe_path: args.ffprobe.clone(),
        ..EngineConfig::default()
    };
    if let Some(work_dir) = &args.work_dir {
        config.work_dir = work_dir.clone();
    }
    info!("   Work dir: {}", config.work_dir.display());

    let board = Arc::new(StatusBoard::default());
    let organ = Arc::new(MediaOrgan::with_status(
        Arc::new(FfmpegEngine::new(config)),
        board.sink(),
    ));

    if !args.no_preload {
        let organ = Arc::clone(&organ);
        tokio::spawn(async move {
            if let Err(e) = organ.session().lifecycle().preload().await {
                warn!("Engine preload failed: {}", e);
                warn!("Exports will retry loading on demand");
            }
        });
    }

    // Remove old socket if exists
    let socket_path = PathBuf::from(&args.socket_path);
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)
            .context("Failed to remove old socket")?;
    }

    // Create UDS listener
    let listener = UnixListener::bind(&socket_path)
        .context("Failed to bind Unix socket")?;

    info!("   Listening on {}", args.socket_path);

    // Serve requests
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let organ = Arc::clone(&organ);
                let board = Arc::clone(&board);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, organ, board, start_time).await {
                        error!("Connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
}

/// Handle a single UDS connection
async fn handle_connection(
    mut stream: UnixStream,
    organ: Arc<MediaOrgan>,
    board: Arc<StatusBoard>,
    start_time: std::time::Instant,
) -> Result<()> {
    let mut buffer = vec![0u8; 65536]; // 64KB buffer

    loop {
        // Read request length (4 bytes)
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Client disconnected");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_BYTES {
            anyhow::bail!("Request frame too large: {} bytes", len);
        }
        if len > buffer.len() {
            buffer.resize(len, 0);
        }

        // Read request body
        stream.read_exact(&mut buffer[..len]).await?;

        // Parse stimulus
        let stimulus: Stimulus = serde_json::from_slice(&buffer[..len])
            .context("Failed to parse stimulus")?;

        debug!("Received: op={}", stimulus.op);

        // Handle health check specially (no organ processing needed)
        let response = if stimulus.op == "health" || stimulus.op == "health.check" {
            Response {
                ok: true,
                output: serde_json::json!({
                    "status": "healthy",
                    "organ": "nexus_media",
                    "version": env!("CARGO_PKG_VERSION"),
                    "uptime_ms": start_time.elapsed().as_millis() as u64,
                    "engine": organ.session().lifecycle().state().as_str(),
                    "engine_percent": board.engine_percent.load(Ordering::Relaxed),
                    "status": board.last_message(),
                }),
                latency_ms: 0,
                cost: None,
            }
        } else {
            match organ.stimulate(stimulus).await {
                Ok(resp) => resp,
                Err(e) => {
                    error!("Stimulate error: {:?}", e);
                    Response {
                        ok: false,
                        output: serde_json::json!({
                            "error": e.kind(),
                            "message": e.user_message(),
                        }),
                        latency_ms: 0,
                        cost: None,
                    }
                }
            }
        };

        // Serialize response
        let response_bytes = serde_json::to_vec(&response)
            .context("Failed to serialize response")?;

        // Write response length + body
        let len_bytes = (response_bytes.len() as u32).to_be_bytes();
        stream.write_all(&len_bytes).await?;
        stream.write_all(&response_bytes).await?;
        stream.flush().await?;

        debug!("Sent: ok={}, latency={}ms", response.ok, response.latency_ms);
    }
}
