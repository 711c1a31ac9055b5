//! One mirroring session: receive, decode and report, sharing a single
//! running flag.
//!
//! ```text
//!  MessageSource ──► SessionState ──► StreamState ──► DecodePipeline ──► frames
//!        (receive, this task)            (shared)      (decode task)      │
//!                    │                                                    ▼
//!                    └── video settings / touch ──► ControlSink     stats reporter
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use scrcpy_ws_core::input::{ControlSink, DEFAULT_CLICK_HOLD, TouchInjector};
use scrcpy_ws_core::pipeline::{
    DecodePipeline, DecoderLauncher, Frame, PipelineStats, StreamState,
};
use scrcpy_ws_core::protocol::{ScreenSize, SessionInfo};
use scrcpy_ws_core::session::{Dispatched, SessionState};
use scrcpy_ws_core::ScrcpyError;

use crate::config::ClientConfig;
use crate::connection::MessageSource;
use crate::snapshot::write_ppm;

/// Progress line every this many video payloads.
const PACKET_LOG_EVERY: u64 = 100;

const SWIPE_DURATION: Duration = Duration::from_millis(500);
const SWIPE_STEPS: u32 = 10;

// ── ScriptedAction ───────────────────────────────────────────────

/// Touch input sent once the session is ready, in touch-space
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedAction {
    Tap { x: u32, y: u32 },
    Swipe { from: (u32, u32), to: (u32, u32) },
}

impl ScriptedAction {
    /// `"x,y"`.
    pub fn parse_tap(s: &str) -> Result<Self, ScrcpyError> {
        match parse_coords(s)?.as_slice() {
            &[x, y] => Ok(Self::Tap { x, y }),
            _ => Err(ScrcpyError::InvalidArgument(format!(
                "tap needs x,y: {s:?}"
            ))),
        }
    }

    /// `"x1,y1,x2,y2"`.
    pub fn parse_swipe(s: &str) -> Result<Self, ScrcpyError> {
        match parse_coords(s)?.as_slice() {
            &[x1, y1, x2, y2] => Ok(Self::Swipe {
                from: (x1, y1),
                to: (x2, y2),
            }),
            _ => Err(ScrcpyError::InvalidArgument(format!(
                "swipe needs x1,y1,x2,y2: {s:?}"
            ))),
        }
    }
}

fn parse_coords(s: &str) -> Result<Vec<u32>, ScrcpyError> {
    s.split(',')
        .map(|part| {
            u32::from_str(part.trim())
                .map_err(|e| ScrcpyError::InvalidArgument(format!("bad coordinate {part:?}: {e}")))
        })
        .collect()
}

// ── SessionSummary ───────────────────────────────────────────────

/// What a finished session reports.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub device: Option<SessionInfo>,
    pub touch_screen: ScreenSize,
    pub messages: u64,
    pub video_packets: u64,
    pub frames_decoded: u64,
    pub decoder_restarts: u64,
    pub snapshot: Option<PathBuf>,
}

// ── StreamRecorder ───────────────────────────────────────────────

/// Appends every video payload verbatim to a file.
struct StreamRecorder {
    out: BufWriter<File>,
    path: PathBuf,
    bytes: u64,
}

impl StreamRecorder {
    async fn create(path: &Path) -> Result<Self, ScrcpyError> {
        let file = File::create(path).await?;
        info!("recording stream to {}", path.display());
        Ok(Self {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
            bytes: 0,
        })
    }

    async fn write(&mut self, payload: &[u8]) -> Result<(), ScrcpyError> {
        self.out.write_all(payload).await?;
        self.bytes += payload.len() as u64;
        Ok(())
    }

    async fn finish(mut self) -> Result<(), ScrcpyError> {
        self.out.flush().await?;
        info!("recorded {} bytes to {}", self.bytes, self.path.display());
        Ok(())
    }
}

// ── MirrorSession ────────────────────────────────────────────────

pub struct MirrorSession {
    config: ClientConfig,
    actions: Vec<ScriptedAction>,
}

impl MirrorSession {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<ScriptedAction>) -> Self {
        self.actions = actions;
        self
    }

    /// Run until `running` drops, the transport closes, or the decoder
    /// cannot be launched.
    pub async fn run<S, R, L>(
        &self,
        control: S,
        mut inbound: R,
        launcher: L,
        running: Arc<AtomicBool>,
    ) -> Result<SessionSummary, ScrcpyError>
    where
        S: ControlSink + 'static,
        R: MessageSource,
        L: DecoderLauncher + 'static,
    {
        let cfg = &self.config;
        let stream = Arc::new(StreamState::new(cfg.max_buffer_bytes()));
        let mut state = SessionState::new(cfg.video_settings(), Arc::clone(&stream));
        let control = Arc::new(Mutex::new(control));

        // ── decode activity ──────────────────────────────────────
        let mut pipeline = DecodePipeline::new(cfg.pipeline(), Arc::clone(&stream), launcher);
        let frames = pipeline.frame_receiver();
        let stats = pipeline.stats_receiver();
        let decode: JoinHandle<(Result<(), ScrcpyError>, u64)> = tokio::spawn({
            let running = Arc::clone(&running);
            async move {
                let result = pipeline.run(Arc::clone(&running)).await;
                if let Err(e) = &result {
                    error!("decoder failed: {e}");
                    running.store(false, Ordering::SeqCst);
                }
                (result, pipeline.restarts())
            }
        });

        // ── display / consumption activity ───────────────────────
        let reporter = tokio::spawn(report_stats(stats.clone(), cfg.stats_interval()));

        // ── receive activity ─────────────────────────────────────
        let mut recorder = match cfg.record_path() {
            Some(path) => Some(StreamRecorder::create(&path).await?),
            None => None,
        };
        let mut actions: Option<JoinHandle<()>> = None;
        let mut video_packets = 0u64;
        let recv_timeout = cfg.recv_timeout();

        let received = loop {
            if !running.load(Ordering::SeqCst) {
                break Ok(());
            }
            let data = match inbound.recv(recv_timeout).await {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(e) => break Err(e),
            };

            match state.handle_binary(&data).await {
                Ok(Dispatched::Ready { settings }) => {
                    if let Some(msg) = settings {
                        debug!("sending video settings ({} bytes)", msg.len());
                        if let Err(e) = control.lock().await.send_control(msg).await {
                            break Err(e);
                        }
                    }
                    if actions.is_none() && !self.actions.is_empty() {
                        actions = Some(tokio::spawn(run_actions(
                            Arc::clone(&control),
                            state.touch_screen_receiver(),
                            self.actions.clone(),
                        )));
                    }
                }
                Ok(Dispatched::Video { .. }) => {
                    video_packets += 1;
                    if video_packets % PACKET_LOG_EVERY == 0 {
                        info!("received {video_packets} video packets");
                    }
                    if let Some(rec) = recorder.as_mut() {
                        if let Err(e) = rec.write(&data).await {
                            warn!("stream recording stopped: {e}");
                            recorder = None;
                        }
                    }
                }
                Ok(Dispatched::Device(_) | Dispatched::DuplicateInitial) => {}
                Err(e) => warn!("dropping malformed message: {e}"),
            }
        };

        // ── teardown ─────────────────────────────────────────────
        running.store(false, Ordering::SeqCst);
        if let Some(handle) = actions {
            handle.abort();
        }
        let (decoded, restarts) = decode
            .await
            .map_err(|e| ScrcpyError::Other(format!("decode task: {e}")))?;
        reporter.abort();

        if let Some(rec) = recorder {
            if let Err(e) = rec.finish().await {
                warn!("flushing stream recording failed: {e}");
            }
        }

        let last = frames.borrow().clone();
        let snapshot = match (cfg.snapshot_path(), last) {
            (Some(path), Some(frame)) => save_snapshot(&frame, path).await,
            (Some(_), None) => {
                warn!("no frame decoded; snapshot skipped");
                None
            }
            _ => None,
        };

        let summary = SessionSummary {
            device: state.info().cloned(),
            touch_screen: state.touch_screen(),
            messages: state.messages(),
            video_packets,
            frames_decoded: stats.borrow().frames_decoded,
            decoder_restarts: restarts,
            snapshot,
        };
        info!(
            "session ended: {} messages, {} frames, {} decoder restarts",
            summary.messages, summary.frames_decoded, summary.decoder_restarts
        );

        received?;
        decoded?;
        Ok(summary)
    }
}

async fn save_snapshot(frame: &Frame, path: PathBuf) -> Option<PathBuf> {
    match write_ppm(frame, &path).await {
        Ok(()) => {
            info!(
                "snapshot of frame {} ({}x{}) written to {}",
                frame.sequence,
                frame.width,
                frame.height,
                path.display()
            );
            Some(path)
        }
        Err(e) => {
            warn!("snapshot to {} failed: {e}", path.display());
            None
        }
    }
}

async fn report_stats(mut stats: watch::Receiver<PipelineStats>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let s = stats.borrow_and_update().clone();
        let dims = s
            .dimensions
            .map_or_else(|| "unknown size".to_string(), |d| d.to_string());
        info!(
            "{} {dims}: {} frames, {:.1} fps, {} restarts",
            s.state, s.frames_decoded, s.fps, s.restarts
        );
    }
}

/// Each action uses the touch space current when it starts.
async fn run_actions<S: ControlSink>(
    control: Arc<Mutex<S>>,
    touch: watch::Receiver<ScreenSize>,
    actions: Vec<ScriptedAction>,
) {
    for action in actions {
        let screen = *touch.borrow();
        let mut sink = control.lock().await;
        let mut injector = TouchInjector::new(&mut *sink, screen);
        let result = match action {
            ScriptedAction::Tap { x, y } => injector.click(x, y, DEFAULT_CLICK_HOLD).await,
            ScriptedAction::Swipe { from, to } => injector
                .swipe(from, to, SWIPE_DURATION, SWIPE_STEPS)
                .await
                .map(|_| ()),
        };
        match result {
            Ok(()) => info!("sent {action:?}"),
            Err(e) => {
                warn!("{action:?} failed: {e}");
                return;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
