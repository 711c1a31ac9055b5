//! # scrcpy-ws-core
//!
//! Client-side core for mirroring an Android device through a scrcpy
//! WebSocket bridge.
//!
//! This crate contains:
//! - **Protocol**: inbound message routing (`Inbound`), `SessionInfo` and
//!   `DeviceMessage` decoding, control message builders
//! - **H.264**: `BitReader`, `NalScanner` and SPS parsing for the coded
//!   picture size
//! - **Input**: `TouchInjector` sequencing clicks and swipes onto a
//!   `ControlSink`
//! - **Pipeline**: `DecodePipeline` supervising an external decoder process
//!   with restart-on-failure and periodic refresh
//! - **Session**: `SessionState`, the per-connection state the receive
//!   activity drives
//! - **Error**: `ScrcpyError`, typed and `thiserror`-based

pub mod codec;
pub mod error;
pub mod flags;
pub mod h264;
pub mod input;
pub mod message;
pub mod pipeline;
pub mod protocol;
pub mod session;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::RawFrameCodec;
pub use error::{ReadFailure, ScrcpyError};
pub use flags::Buttons;
pub use h264::{BitReader, CodedDimensions, NalScanner, NalType, NalUnit, SpsInfo};
pub use input::{ControlSink, TouchInjector, touch_screen_size};
pub use message::{ControlMessageType, DeviceMessageType};
pub use pipeline::{
    DecodePipeline, DecoderLauncher, DecoderProcess, FfmpegLauncher, Frame, PipelineConfig,
    PipelineState, PipelineStats, PixelFormat, StreamState,
};
pub use protocol::{
    DeviceMessage, DisplayDescriptor, Inbound, InboundKind, ScreenSize, SessionInfo, TouchAction,
    VideoSettings,
};
pub use session::{Dispatched, SessionPhase, SessionState};
