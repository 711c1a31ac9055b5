//! The elementary stream sink shared by the receive and decode activities.
//!
//! Video payloads are appended in arrival order. Offsets are absolute
//! (bytes since the session started) so a reader keeps a stable position
//! even after the front of the buffer has been compacted away.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::h264::nal::{NalScanner, NalType};
use crate::h264::sps::{SpsInfo, parse_sps};
use crate::h264::CodedDimensions;

/// Default compaction threshold.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 5 * 1024 * 1024;

/// Without any keyframe to resync on, the buffer is dropped past this
/// multiple of the threshold.
const HARD_LIMIT_FACTOR: usize = 4;

/// An unterminated NAL unit up to this size is rescanned with the next
/// payload; longer ones only keep [`SPLIT_TAIL`] bytes.
const CARRY_LIMIT: usize = 64 * 1024;

/// Enough trailing bytes to catch a start code split across payloads.
const SPLIT_TAIL: usize = 4;

const ANNEX_B_START: [u8; 4] = [0, 0, 0, 1];

// ── ResyncPoint ──────────────────────────────────────────────────

/// Where a freshly launched decoder starts: `header` is written first,
/// then the sink from `offset` on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncPoint {
    pub offset: u64,
    /// Parameter sets the data at `offset` does not carry itself.
    pub header: Bytes,
}

// ── NalTracker ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyPoint {
    offset: u64,
    /// The SPS and PPS sit in the sink right at `offset`.
    has_params: bool,
}

#[derive(Default)]
struct ParameterSets {
    sps: Option<Bytes>,
    pps: Option<Bytes>,
}

impl ParameterSets {
    fn header(&self) -> Bytes {
        let mut out = BytesMut::new();
        for unit in [&self.sps, &self.pps].into_iter().flatten() {
            out.extend_from_slice(&ANNEX_B_START);
            out.extend_from_slice(unit);
        }
        out.freeze()
    }
}

/// Follows NAL boundaries across payloads.
///
/// Start codes are tracked as soon as they are seen; unit contents are
/// only read once the next start code closes them.
#[derive(Default)]
struct NalTracker {
    carry: Vec<u8>,
    /// Absolute offset of `carry[0]`.
    carry_at: u64,
    /// Newest unit start already classified.
    seen: Option<u64>,
    /// Newest unit start already read as a complete unit.
    closed: Option<u64>,
    /// Start of the SPS/PPS run in front of the next IDR.
    group: Option<u64>,
    prev: Option<NalType>,
    key: Option<KeyPoint>,
    params: ParameterSets,
}

impl NalTracker {
    /// Scan `payload`, which lands at absolute offset `at`. Returns the
    /// bodies of SPS units this payload completed.
    fn scan(&mut self, at: u64, payload: &[u8]) -> Vec<Bytes> {
        let base = if self.carry.is_empty() { at } else { self.carry_at };
        let mut window = std::mem::take(&mut self.carry);
        window.extend_from_slice(payload);

        let mut completed = Vec::new();
        let mut last_start = None;
        for nal in NalScanner::new(&window) {
            let abs = base + nal.start as u64;
            last_start = Some(nal.start);
            if self.seen.is_none_or(|s| abs > s) {
                self.seen = Some(abs);
                self.mark(nal.nal_type, abs);
            }
            if nal.end < window.len() && self.closed.is_none_or(|c| abs > c) {
                self.closed = Some(abs);
                let unit = Bytes::copy_from_slice(nal.payload(&window));
                match nal.nal_type {
                    NalType::Sps => {
                        completed.push(unit.slice(1..));
                        self.params.sps = Some(unit);
                    }
                    NalType::Pps => self.params.pps = Some(unit),
                    _ => {}
                }
            }
        }

        let keep_from = match last_start {
            Some(start) if window.len() - start <= CARRY_LIMIT => start,
            _ => window.len().saturating_sub(SPLIT_TAIL),
        };
        self.carry_at = base + keep_from as u64;
        self.carry = window.split_off(keep_from);
        completed
    }

    fn mark(&mut self, nal_type: NalType, at: u64) {
        match nal_type {
            NalType::Sps => {
                let start = *self.group.get_or_insert(at);
                self.key = Some(KeyPoint {
                    offset: start,
                    has_params: true,
                });
            }
            NalType::Pps | NalType::Sei => {}
            NalType::Idr => {
                // later slices of the same picture are not new keyframes
                if self.prev != Some(NalType::Idr) {
                    self.key = Some(match self.group {
                        Some(start) => KeyPoint {
                            offset: start,
                            has_params: true,
                        },
                        None => KeyPoint {
                            offset: at,
                            has_params: false,
                        },
                    });
                }
                self.group = None;
            }
            _ => self.group = None,
        }
        self.prev = Some(nal_type);
    }
}

// ── StreamSink ───────────────────────────────────────────────────

struct SinkBuffer {
    buf: BytesMut,
    /// Absolute offset of `buf[0]`.
    base: u64,
    tracker: NalTracker,
}

impl SinkBuffer {
    fn end(&self) -> u64 {
        self.base + self.buf.len() as u64
    }
}

/// Append-only byte store guarded by an async mutex.
///
/// Writers are the receive activity; readers are decoder feeders. The
/// total written so far is published on a `watch` channel so readers can
/// wait for new data without polling. Past the threshold the front is cut
/// at the latest keyframe; the most recent SPS and PPS outlive any cut.
pub struct StreamSink {
    inner: Mutex<SinkBuffer>,
    written_tx: watch::Sender<u64>,
    max_bytes: usize,
}

impl StreamSink {
    pub fn new(max_bytes: usize) -> Self {
        let (written_tx, _) = watch::channel(0);
        Self {
            inner: Mutex::new(SinkBuffer {
                buf: BytesMut::new(),
                base: 0,
                tracker: NalTracker::default(),
            }),
            written_tx,
            max_bytes: max_bytes.max(1),
        }
    }

    /// Append one payload. Returns the bodies of any SPS units that became
    /// complete with it, including one split across earlier payloads.
    pub async fn append(&self, payload: &[u8]) -> Vec<Bytes> {
        let mut inner = self.inner.lock().await;
        let at = inner.end();
        let completed = inner.tracker.scan(at, payload);
        inner.buf.extend_from_slice(payload);
        let end = inner.end();

        if inner.buf.len() > self.max_bytes {
            self.compact(&mut inner);
        }
        drop(inner);

        self.written_tx.send_replace(end);
        completed
    }

    fn compact(&self, inner: &mut SinkBuffer) {
        match inner.tracker.key {
            Some(key) if key.offset > inner.base => {
                let drop_len = (key.offset - inner.base) as usize;
                inner.buf.advance(drop_len);
                inner.base = key.offset;
                debug!(
                    "stream sink compacted {drop_len} bytes, {} retained",
                    inner.buf.len()
                );
            }
            _ if inner.buf.len() > self.max_bytes * HARD_LIMIT_FACTOR => {
                warn!(
                    "stream sink holds {} bytes with no keyframe to resync on; discarding",
                    inner.buf.len()
                );
                inner.base = inner.end();
                inner.buf.clear();
                inner.tracker.key = None;
            }
            _ => {}
        }
    }

    /// Copy up to `max_len` bytes starting at absolute `offset`.
    ///
    /// If `offset` was compacted away, reading resumes at the oldest byte
    /// still held; the returned start offset tells the caller where.
    /// Returns `None` when nothing past `offset` has been written yet.
    pub async fn read_from(&self, offset: u64, max_len: usize) -> Option<(u64, Bytes)> {
        let inner = self.inner.lock().await;
        let start = offset.max(inner.base);
        if start >= inner.end() {
            return None;
        }
        let rel = (start - inner.base) as usize;
        let len = (inner.buf.len() - rel).min(max_len.max(1));
        Some((start, Bytes::copy_from_slice(&inner.buf[rel..rel + len])))
    }

    /// The latest keyframe still held, with the parameter sets it needs.
    /// Without one, the oldest retained byte behind the last known SPS
    /// and PPS.
    pub async fn resync(&self) -> ResyncPoint {
        let inner = self.inner.lock().await;
        match inner.tracker.key {
            Some(key) if key.offset >= inner.base => ResyncPoint {
                offset: key.offset,
                header: if key.has_params {
                    Bytes::new()
                } else {
                    inner.tracker.params.header()
                },
            },
            _ => ResyncPoint {
                offset: inner.base,
                header: inner.tracker.params.header(),
            },
        }
    }

    /// Total bytes ever appended.
    pub fn total_written(&self) -> u64 {
        *self.written_tx.borrow()
    }

    /// Receiver notified on every append.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.written_tx.subscribe()
    }

    #[cfg(test)]
    async fn retained(&self) -> usize {
        self.inner.lock().await.buf.len()
    }
}

// ── StreamState ──────────────────────────────────────────────────

/// Sink plus the coded dimensions learned from the first valid SPS.
pub struct StreamState {
    sink: StreamSink,
    sps: OnceLock<SpsInfo>,
    payloads: AtomicU64,
}

impl StreamState {
    pub fn new(max_buffer_bytes: usize) -> Self {
        Self {
            sink: StreamSink::new(max_buffer_bytes),
            sps: OnceLock::new(),
            payloads: AtomicU64::new(0),
        }
    }

    pub fn sink(&self) -> &StreamSink {
        &self.sink
    }

    pub fn sps_info(&self) -> Option<SpsInfo> {
        self.sps.get().copied()
    }

    pub fn dimensions(&self) -> Option<CodedDimensions> {
        self.sps.get().map(|s| s.dimensions)
    }

    /// Number of video payloads ingested.
    pub fn payload_count(&self) -> u64 {
        self.payloads.load(Ordering::Relaxed)
    }

    /// Append and, while dimensions are unknown, try each SPS the
    /// payload completed.
    ///
    /// Returns the SPS info the first time dimensions become known. The
    /// payload is appended before the dimensions are published, so a
    /// decoder launched on them always finds the SPS in the sink.
    pub async fn ingest(&self, payload: &[u8]) -> Option<SpsInfo> {
        let completed = self.sink.append(payload).await;
        self.payloads.fetch_add(1, Ordering::Relaxed);
        if self.sps.get().is_some() {
            return None;
        }

        let info = completed.iter().find_map(|body| match parse_sps(body) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("SPS not usable yet: {e}");
                None
            }
        })?;
        if self.sps.set(info).is_err() {
            return None;
        }
        info!(
            "stream dimensions {} (profile {}, level {})",
            info.dimensions, info.profile_idc, info.level_idc
        );
        Some(info)
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BYTES)
    }
}

// ── Tests ────────────────────────────────────────────────────────
