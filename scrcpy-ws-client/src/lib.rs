//! # scrcpy-ws-client — Android mirroring client
//!
//! Connects to a scrcpy WebSocket bridge, negotiates video settings,
//! decodes the H.264 stream through an external `ffmpeg`, and can send
//! scripted touch input back to the device.

pub mod config;
pub mod connection;
pub mod session;
pub mod snapshot;
