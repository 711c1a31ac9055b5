//! External decoder process abstraction and the ffmpeg implementation.
//!
//! The pipeline only sees [`DecoderLauncher`] and [`DecoderProcess`]; the
//! ffmpeg child is one implementation, tests use in-memory doubles.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, trace, warn};

use crate::codec::RawFrameCodec;
use crate::error::{ReadFailure, ScrcpyError};
use crate::h264::CodedDimensions;
use crate::pipeline::frame::PixelFormat;
use crate::pipeline::stream::{ResyncPoint, StreamState};

/// Largest chunk copied from the sink to the decoder in one write.
const FEED_CHUNK: usize = 64 * 1024;
/// Upper bound on one wait for new stream bytes in the feeder.
const FEED_POLL: Duration = Duration::from_millis(500);

// ── Traits ───────────────────────────────────────────────────────

/// Everything a launcher needs to start one decoder instance.
#[derive(Clone)]
pub struct LaunchSpec {
    pub dimensions: CodedDimensions,
    pub format: PixelFormat,
    /// `width * height * bpp`, always non-zero.
    pub frame_size: usize,
    pub stream: Arc<StreamState>,
    /// Where feeding starts, with any parameter sets to write first.
    pub resync: ResyncPoint,
}

/// Starts decoder instances.
#[async_trait]
pub trait DecoderLauncher: Send {
    async fn launch(&mut self, spec: &LaunchSpec) -> Result<Box<dyn DecoderProcess>, ScrcpyError>;
}

/// One running decoder. Owned by a single task.
#[async_trait]
pub trait DecoderProcess: Send {
    /// Wait up to `timeout` for exactly one frame.
    async fn read_frame(&mut self, timeout: Duration) -> Result<Bytes, ReadFailure>;

    fn is_alive(&mut self) -> bool;

    /// Ask the process to stop, force-kill it after `grace`.
    async fn terminate(&mut self, grace: Duration);
}

// ── Stderr classification ────────────────────────────────────────

const ERROR_KEYWORDS: [&str; 9] = [
    "error",
    "failed",
    "invalid",
    "cannot",
    "unable",
    "no such",
    "not found",
    "missing",
    "unrecognized",
];

const NOISE_PATTERNS: [&str; 9] = [
    "frame=",
    "fps=",
    "speed=",
    "time=",
    "bitrate=",
    "size=",
    "copyright",
    "built with",
    "configuration",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrClass {
    Error,
    /// Progress and banner lines.
    Noise,
    Info,
}

pub fn classify_stderr(line: &str) -> StderrClass {
    let lower = line.to_ascii_lowercase();
    if NOISE_PATTERNS.iter().any(|p| lower.contains(p)) {
        StderrClass::Noise
    } else if ERROR_KEYWORDS.iter().any(|k| lower.contains(k)) {
        StderrClass::Error
    } else {
        StderrClass::Info
    }
}

// ── FfmpegLauncher ───────────────────────────────────────────────

/// Launches `ffmpeg` reading Annex-B H.264 on stdin and writing packed
/// raw frames on stdout.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    program: PathBuf,
    threads: u32,
}

impl FfmpegLauncher {
    pub fn new(program: impl Into<PathBuf>, threads: u32) -> Self {
        Self {
            program: program.into(),
            threads: threads.max(1),
        }
    }

    /// Run `ffmpeg -version` and return its first line.
    pub async fn probe(&self, timeout: Duration) -> Result<String, ScrcpyError> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, output)
            .await
            .map_err(|_| {
                ScrcpyError::DecoderUnavailable(format!(
                    "{} -version did not answer within {timeout:?}",
                    self.program.display()
                ))
            })?
            .map_err(|e| {
                ScrcpyError::DecoderUnavailable(format!("{}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            return Err(ScrcpyError::DecoderUnavailable(format!(
                "{} -version exited with {}",
                self.program.display(),
                output.status
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().next().unwrap_or_default().to_string())
    }

    /// Arguments for one decoder instance.
    pub fn args(&self, spec: &LaunchSpec) -> Vec<String> {
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "h264",
            "-i",
            "pipe:0",
            "-f",
            "rawvideo",
            "-pix_fmt",
            spec.format.ffmpeg_name(),
            "-fps_mode",
            "passthrough",
            "-an",
            "-sn",
            "-vcodec",
            "rawvideo",
            "-threads",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain([self.threads.to_string(), "-".to_string()])
        .collect()
    }
}

#[async_trait]
impl DecoderLauncher for FfmpegLauncher {
    async fn launch(&mut self, spec: &LaunchSpec) -> Result<Box<dyn DecoderProcess>, ScrcpyError> {
        let unavailable =
            |what: &str| ScrcpyError::DecoderUnavailable(format!("{}: {what}", self.program.display()));

        let mut child = Command::new(&self.program)
            .args(self.args(spec))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| unavailable(&e.to_string()))?;

        let stdin = child.stdin.take().ok_or_else(|| unavailable("no stdin pipe"))?;
        let stdout = child.stdout.take().ok_or_else(|| unavailable("no stdout pipe"))?;
        let stderr = child.stderr.take().ok_or_else(|| unavailable("no stderr pipe"))?;

        info!(
            "decoder launched (pid {:?}) for {} {}, feeding from offset {}",
            child.id(),
            spec.dimensions,
            spec.format.ffmpeg_name(),
            spec.resync.offset
        );

        let feeder = tokio::spawn(feed_decoder(
            stdin,
            Arc::clone(&spec.stream),
            spec.resync.clone(),
        ));
        let stderr_task = tokio::spawn(drain_stderr(stderr));
        let codec = RawFrameCodec::new(spec.frame_size)?;

        Ok(Box::new(FfmpegProcess {
            child,
            frames: FramedRead::with_capacity(stdout, codec, spec.frame_size),
            feeder,
            stderr_task,
            frame_size: spec.frame_size,
        }))
    }
}

/// Copy the sink into the decoder's stdin, following new appends.
async fn feed_decoder(mut stdin: ChildStdin, stream: Arc<StreamState>, resync: ResyncPoint) {
    let mut written = stream.sink().subscribe();
    if !resync.header.is_empty() {
        trace!("writing {} bytes of parameter sets", resync.header.len());
        if let Err(e) = stdin.write_all(&resync.header).await {
            debug!("decoder stdin closed: {e}");
            return;
        }
    }
    let mut offset = resync.offset;
    loop {
        let _ = written.borrow_and_update();
        match stream.sink().read_from(offset, FEED_CHUNK).await {
            Some((start, chunk)) => {
                if start > offset {
                    debug!("feeder skipped {} compacted bytes", start - offset);
                }
                offset = start + chunk.len() as u64;
                if let Err(e) = stdin.write_all(&chunk).await {
                    debug!("decoder stdin closed: {e}");
                    return;
                }
            }
            None => {
                if let Ok(Err(_)) = tokio::time::timeout(FEED_POLL, written.changed()).await {
                    return;
                }
            }
        }
    }
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match classify_stderr(line) {
            StderrClass::Error => warn!("decoder: {line}"),
            StderrClass::Info => debug!("decoder: {line}"),
            StderrClass::Noise => trace!("decoder: {line}"),
        }
    }
}

// ── FfmpegProcess ────────────────────────────────────────────────

struct FfmpegProcess {
    child: Child,
    frames: FramedRead<ChildStdout, RawFrameCodec>,
    feeder: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
    frame_size: usize,
}

#[async_trait]
impl DecoderProcess for FfmpegProcess {
    async fn read_frame(&mut self, timeout: Duration) -> Result<Bytes, ReadFailure> {
        match tokio::time::timeout(timeout, self.frames.next()).await {
            Ok(Some(Ok(frame))) => Ok(frame),
            Ok(Some(Err(e))) => {
                debug!("decoder stdout error: {e}");
                Err(ReadFailure::DecoderExited)
            }
            Ok(None) => Err(ReadFailure::DecoderExited),
            Err(_) => {
                let received = self.frames.read_buffer().len();
                if received == 0 {
                    Err(ReadFailure::DecodeTimeout(timeout))
                } else {
                    Err(ReadFailure::ShortRead {
                        received,
                        expected: self.frame_size,
                    })
                }
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self, grace: Duration) {
        // Dropping the feeder closes stdin; ffmpeg flushes and exits on EOF.
        self.feeder.abort();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!("decoder exited: {status}"),
            Ok(Err(e)) => warn!("waiting for decoder failed: {e}"),
            Err(_) => {
                warn!("decoder still running after {grace:?}; killing");
                if let Err(e) = self.child.kill().await {
                    warn!("failed to kill decoder: {e}");
                }
            }
        }
        self.stderr_task.abort();
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        self.feeder.abort();
        self.stderr_task.abort();
    }
}

// ── Tests ────────────────────────────────────────────────────────
