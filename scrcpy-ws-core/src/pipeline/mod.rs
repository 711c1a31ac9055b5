//! The decode pipeline: stream sink, external decoder supervision, and the
//! restart policy.
//!
//! One [`DecodePipeline`] is owned by the decode activity. It is the only
//! code that launches, terminates or relaunches the decoder process.
//! Decoded frames are published on a `watch` channel that display
//! consumers read on their own cadence.

pub mod decoder;
pub mod frame;
pub mod state;
pub mod stream;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::{ReadFailure, ScrcpyError};
use crate::h264::CodedDimensions;

pub use decoder::{
    DecoderLauncher, DecoderProcess, FfmpegLauncher, LaunchSpec, StderrClass, classify_stderr,
};
pub use frame::{Frame, PixelFormat};
pub use state::{PipelineState, RestartReason};
pub use stream::{DEFAULT_MAX_BUFFER_BYTES, ResyncPoint, StreamSink, StreamState};

// ── PipelineConfig ───────────────────────────────────────────────

/// Timing and retry bounds for the decode pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub pixel_format: PixelFormat,
    /// Per-attempt wait for one full frame.
    pub read_timeout: Duration,
    /// Incomplete reads in a row before the decoder is restarted.
    pub max_failures: u32,
    /// A decoder older than this is replaced.
    pub restart_interval: Duration,
    /// Wait for a graceful exit before killing.
    pub terminate_grace: Duration,
    /// Pause between tearing down and relaunching.
    pub settle_delay: Duration,
    /// Launch attempts in a row before the pipeline fails.
    pub max_launch_attempts: u32,
    /// Bounded wait for new stream bytes while no decoder is running.
    pub idle_wait: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Bgr24,
            read_timeout: Duration::from_millis(200),
            max_failures: 5,
            restart_interval: Duration::from_secs(30),
            terminate_grace: Duration::from_secs(1),
            settle_delay: Duration::from_millis(200),
            max_launch_attempts: 3,
            idle_wait: Duration::from_millis(500),
        }
    }
}

// ── PipelineStats ────────────────────────────────────────────────

/// Snapshot published after every state change and decoded frame.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub state: PipelineState,
    pub frames_decoded: u64,
    pub restarts: u64,
    pub launches: u64,
    pub consecutive_failures: u32,
    /// Smoothed over the last 60 frames.
    pub fps: f64,
    pub dimensions: Option<CodedDimensions>,
}

// ── FpsMeter ─────────────────────────────────────────────────────

const FPS_WINDOW: usize = 60;

#[derive(Debug, Default)]
struct FpsMeter {
    samples: VecDeque<Duration>,
    last: Option<Instant>,
    fps: f64,
}

impl FpsMeter {
    fn tick(&mut self, now: Instant) {
        if let Some(last) = self.last {
            self.samples.push_back(now.duration_since(last));
            if self.samples.len() > FPS_WINDOW {
                self.samples.pop_front();
            }
        }
        self.last = Some(now);

        let avg_secs = self.samples.iter().map(Duration::as_secs_f64).sum::<f64>()
            / self.samples.len().max(1) as f64;
        self.fps = if avg_secs > 0.0 { 1.0 / avg_secs } else { 0.0 };
    }

    /// Forget the previous frame time so the restart gap is not sampled.
    fn pause(&mut self) {
        self.last = None;
    }
}

// ── DecoderHandle ────────────────────────────────────────────────

/// The single live decoder instance.
struct DecoderHandle {
    process: Box<dyn DecoderProcess>,
    frame_size: usize,
    dimensions: CodedDimensions,
    launched_at: Instant,
    consecutive_failures: u32,
}

// ── DecodePipeline ───────────────────────────────────────────────

pub struct DecodePipeline {
    config: PipelineConfig,
    stream: Arc<StreamState>,
    launcher: Box<dyn DecoderLauncher>,
    state: PipelineState,
    decoder: Option<DecoderHandle>,
    last_frame: Option<Frame>,
    frames_decoded: u64,
    restarts: u64,
    launches: u64,
    fps: FpsMeter,
    frame_tx: watch::Sender<Option<Frame>>,
    stats_tx: watch::Sender<PipelineStats>,
}

impl DecodePipeline {
    pub fn new(
        config: PipelineConfig,
        stream: Arc<StreamState>,
        launcher: impl DecoderLauncher + 'static,
    ) -> Self {
        let (frame_tx, _) = watch::channel(None);
        let (stats_tx, _) = watch::channel(PipelineStats::default());
        Self {
            config,
            stream,
            launcher: Box::new(launcher),
            state: PipelineState::default(),
            decoder: None,
            last_frame: None,
            frames_decoded: 0,
            restarts: 0,
            launches: 0,
            fps: FpsMeter::default(),
            frame_tx,
            stats_tx,
        }
    }

    /// The last-good-frame slot.
    pub fn frame_receiver(&self) -> watch::Receiver<Option<Frame>> {
        self.frame_tx.subscribe()
    }

    pub fn stats_receiver(&self) -> watch::Receiver<PipelineStats> {
        self.stats_tx.subscribe()
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Successful relaunches so far.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// Advance the pipeline by at most one read attempt.
    ///
    /// Returns the new frame, or the last good frame when the attempt came
    /// up short, or `None` if nothing has been decoded yet. Fails with
    /// `DecoderUnavailable` once the decoder cannot be launched.
    pub async fn get_frame(&mut self) -> Result<Option<Frame>, ScrcpyError> {
        if let PipelineState::Failed { reason } = &self.state {
            return Err(ScrcpyError::DecoderUnavailable(reason.clone()));
        }

        if self.state == PipelineState::Idle && self.stream.payload_count() > 0 {
            self.state.begin_buffering()?;
            debug!("video arriving, waiting for SPS");
            self.publish_stats();
        }

        if self.state == PipelineState::Buffering {
            let Some(dims) = self.stream.dimensions() else {
                return Ok(None);
            };
            self.launch(dims).await?;
        }

        if self.state.is_waiting() {
            return Ok(None);
        }

        if self.restart_due() {
            self.restart(RestartReason::Periodic).await?;
        }
        if !self.decoder_alive() {
            self.restart(RestartReason::DecoderExited).await?;
        }

        let timeout = self.config.read_timeout;
        let result = match self.decoder.as_mut() {
            Some(handle) => handle.process.read_frame(timeout).await,
            None => {
                return Err(ScrcpyError::ProtocolViolation(
                    "decoding without a decoder process",
                ));
            }
        };

        match result {
            Ok(data) => Ok(self.accept_frame(data)),
            Err(failure) => self.read_failed(failure).await,
        }
    }

    /// The decode activity: poll frames until `running` drops, then shut
    /// the decoder down.
    ///
    /// Returns an error only for session-fatal conditions.
    pub async fn run(&mut self, running: Arc<AtomicBool>) -> Result<(), ScrcpyError> {
        let mut written = self.stream.sink().subscribe();
        info!("decode pipeline started");

        while running.load(Ordering::SeqCst) {
            match self.get_frame().await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    warn!("decode pipeline stopping: {e}");
                    self.shutdown().await;
                    return Err(e);
                }
                Err(e) => debug!("frame attempt failed: {e}"),
            }

            if self.state.is_waiting() {
                let _ = tokio::time::timeout(self.config.idle_wait, written.changed()).await;
            }
        }

        self.shutdown().await;
        info!(
            "decode pipeline stopped after {} frames, {} restarts",
            self.frames_decoded, self.restarts
        );
        Ok(())
    }

    /// Terminate the decoder, if any. The last good frame stays available.
    pub async fn shutdown(&mut self) {
        if let Some(mut handle) = self.decoder.take() {
            handle.process.terminate(self.config.terminate_grace).await;
        }
        if !self.state.is_failed() {
            self.state.reset();
        }
        self.publish_stats();
    }

    // ── Internals ────────────────────────────────────────────────

    fn restart_due(&self) -> bool {
        self.decoder
            .as_ref()
            .is_some_and(|h| h.launched_at.elapsed() >= self.config.restart_interval)
    }

    fn decoder_alive(&mut self) -> bool {
        self.decoder
            .as_mut()
            .is_some_and(|h| h.process.is_alive())
    }

    fn accept_frame(&mut self, data: Bytes) -> Option<Frame> {
        let handle = self.decoder.as_mut()?;
        handle.consecutive_failures = 0;
        let frame = Frame {
            width: handle.dimensions.width,
            height: handle.dimensions.height,
            format: self.config.pixel_format,
            data,
            sequence: self.frames_decoded,
            decoded_at: std::time::Instant::now(),
        };
        self.frames_decoded += 1;
        self.fps.tick(Instant::now());
        self.last_frame = Some(frame.clone());
        self.frame_tx.send_replace(Some(frame.clone()));
        self.publish_stats();
        Some(frame)
    }

    async fn read_failed(&mut self, failure: ReadFailure) -> Result<Option<Frame>, ScrcpyError> {
        let failures = match self.decoder.as_mut() {
            Some(handle) => {
                handle.consecutive_failures += 1;
                handle.consecutive_failures
            }
            None => 0,
        };
        trace!("frame read failed ({failures} in a row): {failure}");

        if failure == ReadFailure::DecoderExited {
            self.restart(RestartReason::DecoderExited).await?;
        } else if failures >= self.config.max_failures {
            self.restart(RestartReason::ReadFailures(failures)).await?;
        } else {
            self.publish_stats();
        }
        Ok(self.last_frame.clone())
    }

    async fn launch(&mut self, dims: CodedDimensions) -> Result<(), ScrcpyError> {
        let format = self.config.pixel_format;
        let frame_size = dims.frame_size(format.bytes_per_pixel()).ok_or_else(|| {
            ScrcpyError::InvalidArgument(format!("no frame size for {dims}"))
        })?;
        let attempts = self.config.max_launch_attempts.max(1);
        let mut reason = String::new();

        for attempt in 1..=attempts {
            let spec = LaunchSpec {
                dimensions: dims,
                format,
                frame_size,
                stream: Arc::clone(&self.stream),
                resync: self.stream.sink().resync().await,
            };
            trace!(
                "resync at {} of {} bytes written, {} header bytes",
                spec.resync.offset,
                self.stream.sink().total_written(),
                spec.resync.header.len()
            );
            match self.launcher.launch(&spec).await {
                Ok(process) => {
                    self.launches += 1;
                    self.decoder = Some(DecoderHandle {
                        process,
                        frame_size,
                        dimensions: dims,
                        launched_at: Instant::now(),
                        consecutive_failures: 0,
                    });
                    self.fps.pause();
                    self.state.start_decoding()?;
                    debug!("decoder up for {dims}, {frame_size} bytes per frame");
                    self.publish_stats();
                    return Ok(());
                }
                Err(e) => {
                    warn!("decoder launch attempt {attempt}/{attempts} failed: {e}");
                    reason = match e {
                        ScrcpyError::DecoderUnavailable(msg) => msg,
                        other => other.to_string(),
                    };
                    if attempt < attempts {
                        tokio::time::sleep(self.config.settle_delay).await;
                    }
                }
            }
        }

        self.state.fail(reason.clone())?;
        self.publish_stats();
        Err(ScrcpyError::DecoderUnavailable(reason))
    }

    async fn restart(&mut self, reason: RestartReason) -> Result<(), ScrcpyError> {
        let Some(mut old) = self.decoder.take() else {
            return Err(ScrcpyError::ProtocolViolation("restart without a decoder"));
        };
        info!("restarting decoder: {reason}");
        self.state.begin_restart(reason)?;
        self.publish_stats();

        old.process.terminate(self.config.terminate_grace).await;
        let dims = old.dimensions;
        trace!("old decoder ({} bytes per frame) terminated", old.frame_size);
        drop(old);

        tokio::time::sleep(self.config.settle_delay).await;
        self.launch(dims).await?;
        self.restarts += 1;
        self.publish_stats();
        Ok(())
    }

    fn publish_stats(&self) {
        self.stats_tx.send_replace(PipelineStats {
            state: self.state.clone(),
            frames_decoded: self.frames_decoded,
            restarts: self.restarts,
            launches: self.launches,
            consecutive_failures: self
                .decoder
                .as_ref()
                .map_or(0, |h| h.consecutive_failures),
            fps: self.fps.fps,
            dimensions: self.decoder.as_ref().map(|h| h.dimensions),
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────
