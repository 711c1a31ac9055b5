//! Decode pipeline state machine.
//!
//! Provides a `PipelineState` enum with validated transitions that return
//! `Result` instead of panicking.

use std::fmt;
use std::time::Instant;

use crate::error::ScrcpyError;

// ── RestartReason ────────────────────────────────────────────────

/// Why a running decoder is being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// The refresh interval elapsed.
    Periodic,
    /// The decoder process is gone.
    DecoderExited,
    /// This many incomplete reads in a row.
    ReadFailures(u32),
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Periodic => write!(f, "periodic refresh"),
            Self::DecoderExited => write!(f, "decoder exited"),
            Self::ReadFailures(n) => write!(f, "{n} consecutive incomplete reads"),
        }
    }
}

// ── PipelineState ────────────────────────────────────────────────

/// The current phase of the decode pipeline.
///
/// ```text
///  Idle ──► Buffering ──► Decoding ◄──► Restarting
///                │                          │
///                └────────► Failed ◄────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No video received yet. Initial state, and the state after shutdown.
    #[default]
    Idle,

    /// Video is arriving but no SPS has been parsed.
    Buffering,

    /// A decoder process is running.
    Decoding {
        /// When the current decoder was launched.
        since: Instant,
    },

    /// The old decoder is being torn down and a new one launched.
    Restarting { reason: RestartReason },

    /// The decoder could not be launched. Terminal.
    Failed { reason: String },
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Buffering => write!(f, "Buffering"),
            Self::Decoding { .. } => write!(f, "Decoding"),
            Self::Restarting { .. } => write!(f, "Restarting"),
            Self::Failed { .. } => write!(f, "Failed"),
        }
    }
}

impl PipelineState {
    pub fn is_decoding(&self) -> bool {
        matches!(self, Self::Decoding { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Idle or Buffering: nothing to read from yet.
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Idle | Self::Buffering)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Buffering`.
    ///
    /// Valid from: `Idle`.
    pub fn begin_buffering(&mut self) -> Result<(), ScrcpyError> {
        match self {
            Self::Idle => {
                *self = Self::Buffering;
                Ok(())
            }
            _ => Err(ScrcpyError::ProtocolViolation(
                "cannot buffer: not in Idle state",
            )),
        }
    }

    /// Transition to `Decoding`.
    ///
    /// Valid from: `Buffering`, `Restarting`.
    pub fn start_decoding(&mut self) -> Result<(), ScrcpyError> {
        match self {
            Self::Buffering | Self::Restarting { .. } => {
                *self = Self::Decoding {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(ScrcpyError::ProtocolViolation(
                "cannot decode: not in Buffering or Restarting state",
            )),
        }
    }

    /// Transition to `Restarting`.
    ///
    /// Valid from: `Decoding`.
    pub fn begin_restart(&mut self, reason: RestartReason) -> Result<(), ScrcpyError> {
        match self {
            Self::Decoding { .. } => {
                *self = Self::Restarting { reason };
                Ok(())
            }
            _ => Err(ScrcpyError::ProtocolViolation(
                "cannot restart: not in Decoding state",
            )),
        }
    }

    /// Transition to `Failed`.
    ///
    /// Valid from: `Buffering` (first launch), `Restarting` (relaunch).
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), ScrcpyError> {
        match self {
            Self::Buffering | Self::Restarting { .. } => {
                *self = Self::Failed {
                    reason: reason.into(),
                };
                Ok(())
            }
            _ => Err(ScrcpyError::ProtocolViolation(
                "cannot fail: no launch in progress",
            )),
        }
    }

    /// Force-reset to `Idle` regardless of current state.
    ///
    /// Used on shutdown after the decoder has been terminated.
    pub fn reset(&mut self) {
        *self = Self::Idle;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_idle() {
        let s = PipelineState::default();
        assert_eq!(s, PipelineState::Idle);
        assert!(s.is_waiting());
    }

    #[test]
    fn happy_path() {
        let mut s = PipelineState::default();
        s.begin_buffering().unwrap();
        assert_eq!(s, PipelineState::Buffering);
        s.start_decoding().unwrap();
        assert!(s.is_decoding());
        s.begin_restart(RestartReason::ReadFailures(5)).unwrap();
        assert_eq!(
            s,
            PipelineState::Restarting {
                reason: RestartReason::ReadFailures(5)
            }
        );
        s.start_decoding().unwrap();
        assert!(s.is_decoding());
    }

    #[test]
    fn failed_relaunch() {
        let mut s = PipelineState::Restarting {
            reason: RestartReason::DecoderExited,
        };
        s.fail("ffmpeg: not found").unwrap();
        assert!(s.is_failed());
        assert!(s.start_decoding().is_err());
        assert!(s.begin_buffering().is_err());
    }

    #[test]
    fn invalid_transitions() {
        let mut s = PipelineState::Idle;
        assert!(s.start_decoding().is_err());
        assert!(s.begin_restart(RestartReason::Periodic).is_err());
        assert!(s.fail("x").is_err());

        let mut s = PipelineState::Buffering;
        assert!(s.begin_buffering().is_err());
        assert!(s.begin_restart(RestartReason::Periodic).is_err());
    }

    #[test]
    fn reset_from_anywhere() {
        let mut s = PipelineState::Failed {
            reason: "gone".into(),
        };
        s.reset();
        assert_eq!(s, PipelineState::Idle);
    }

    #[test]
    fn display() {
        assert_eq!(PipelineState::Buffering.to_string(), "Buffering");
        assert_eq!(
            RestartReason::ReadFailures(5).to_string(),
            "5 consecutive incomplete reads"
        );
    }
}
