//! Per-connection session state.
//!
//! Everything the receive activity learns about the device lives in one
//! [`SessionState`]: the parsed session info, whether video settings went
//! out, the touch coordinate space and the shared stream.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ScrcpyError;
use crate::h264::SpsInfo;
use crate::input::touch_screen_size;
use crate::pipeline::StreamState;
use crate::protocol::{DeviceMessage, Inbound, ScreenSize, SessionInfo, VideoSettings};

// ── SessionPhase ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No valid session info yet.
    #[default]
    Uninitialized,
    /// Session info parsed. Control messages may be sent.
    Ready,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

// ── Dispatched ───────────────────────────────────────────────────

/// What one inbound message turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// Session info accepted. `settings` is the video settings message to
    /// send, present only the first time.
    Ready { settings: Option<Bytes> },
    /// A second session info while already ready; ignored.
    DuplicateInitial,
    Device(DeviceMessage),
    Video {
        len: usize,
        /// Set when this payload made the coded dimensions known.
        learned: Option<SpsInfo>,
    },
}

// ── SessionState ─────────────────────────────────────────────────

pub struct SessionState {
    phase: SessionPhase,
    info: Option<SessionInfo>,
    video: VideoSettings,
    settings_sent: bool,
    touch_tx: watch::Sender<ScreenSize>,
    stream: Arc<StreamState>,
    messages: u64,
}

impl SessionState {
    /// `video` is what the device is asked to encode; its size also
    /// bounds the touch space until the stream reports its own.
    pub fn new(video: VideoSettings, stream: Arc<StreamState>) -> Self {
        let touch_screen = touch_screen_size(
            None,
            ScreenSize {
                width: video.width,
                height: video.height,
            },
        );
        Self {
            phase: SessionPhase::Uninitialized,
            info: None,
            video,
            settings_sent: false,
            touch_tx: watch::Sender::new(touch_screen),
            stream,
            messages: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    pub fn info(&self) -> Option<&SessionInfo> {
        self.info.as_ref()
    }

    pub fn stream(&self) -> &Arc<StreamState> {
        &self.stream
    }

    /// Coordinate space for touch events right now.
    pub fn touch_screen(&self) -> ScreenSize {
        *self.touch_tx.borrow()
    }

    /// Follows the touch space as it is refined.
    pub fn touch_screen_receiver(&self) -> watch::Receiver<ScreenSize> {
        self.touch_tx.subscribe()
    }

    pub fn settings_sent(&self) -> bool {
        self.settings_sent
    }

    /// Binary messages handled so far, of any kind.
    pub fn messages(&self) -> u64 {
        self.messages
    }

    /// Route and process one inbound binary message.
    ///
    /// Parse errors leave the session as it was; the caller logs them and
    /// keeps receiving.
    pub async fn handle_binary(&mut self, data: &[u8]) -> Result<Dispatched, ScrcpyError> {
        self.messages += 1;
        match Inbound::classify(data) {
            Inbound::InitialInfo(body) => self.handle_initial(body),
            Inbound::DeviceMessage(body) => {
                let msg = DeviceMessage::decode(body)?;
                match &msg {
                    DeviceMessage::Clipboard(text) => {
                        info!("device clipboard: {} chars", text.chars().count())
                    }
                    DeviceMessage::PushResponse { id, code } => {
                        debug!("push response id={id} code={code}")
                    }
                    DeviceMessage::Unknown { msg_type, len } => {
                        debug!("ignoring device message type {msg_type} ({len} bytes)")
                    }
                }
                Ok(Dispatched::Device(msg))
            }
            Inbound::VideoPayload(payload) => {
                let learned = self.stream.ingest(payload).await;
                if let Some(sps) = learned {
                    self.adopt_stream_size(&sps);
                }
                Ok(Dispatched::Video {
                    len: payload.len(),
                    learned,
                })
            }
        }
    }

    fn handle_initial(&mut self, body: &[u8]) -> Result<Dispatched, ScrcpyError> {
        if self.is_ready() {
            warn!("duplicate session info ignored");
            return Ok(Dispatched::DuplicateInitial);
        }

        let info = SessionInfo::decode(body)?;
        let primary = info.primary_display();
        info!(
            "device \"{}\", {} display(s), {} encoder(s), client id {}",
            info.device_name,
            info.displays.len(),
            info.encoders.len(),
            info.client_id
        );

        if self.stream.dimensions().is_none() {
            let bounds = ScreenSize {
                width: self.video.width,
                height: self.video.height,
            };
            let fitted = touch_screen_size(primary.map(|d| (d.width, d.height)), bounds);
            self.touch_tx.send_replace(fitted);
            if let Some(d) = primary {
                debug!(
                    "screen {}x{} → touch space {}x{}",
                    d.width, d.height, fitted.width, fitted.height
                );
            }
        }

        self.info = Some(info);
        self.phase = SessionPhase::Ready;
        Ok(Dispatched::Ready {
            settings: self.take_settings_message(),
        })
    }

    /// The video settings message, once per session.
    fn take_settings_message(&mut self) -> Option<Bytes> {
        if self.settings_sent {
            return None;
        }
        self.settings_sent = true;
        Some(self.video.encode())
    }

    /// Switch the touch space to the coded size, unless it is larger than
    /// the device screen.
    fn adopt_stream_size(&mut self, sps: &SpsInfo) {
        let dims = sps.dimensions;
        let screen = self.info.as_ref().and_then(SessionInfo::primary_display);
        if let Some(d) = screen {
            if i64::from(dims.width) > i64::from(d.width)
                || i64::from(dims.height) > i64::from(d.height)
            {
                warn!(
                    "stream size {dims} exceeds screen {}x{}; touch space unchanged",
                    d.width, d.height
                );
                return;
            }
        }
        match (u16::try_from(dims.width), u16::try_from(dims.height)) {
            (Ok(width), Ok(height)) => {
                self.touch_tx.send_replace(ScreenSize { width, height });
                debug!("touch space follows stream: {dims}");
            }
            _ => warn!("stream size {dims} does not fit touch fields"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stream::tests::sps_payload;
    use crate::protocol::initial::tests::sample_session;
    use crate::protocol::{MAGIC_MESSAGE, build_video_settings};

    fn video() -> VideoSettings {
        VideoSettings {
            bitrate: 5_024_288,
            max_fps: 24,
            i_frame_interval: 5,
            width: 540,
            height: 960,
        }
    }

    fn session() -> SessionState {
        SessionState::new(video(), Arc::new(StreamState::default()))
    }

    #[tokio::test]
    async fn settings_sent_exactly_once() {
        let mut s = session();
        assert_eq!(s.phase(), SessionPhase::Uninitialized);

        let msg = sample_session().to_message();
        let Dispatched::Ready { settings } = s.handle_binary(&msg).await.unwrap() else {
            panic!("expected Ready");
        };
        assert_eq!(
            settings,
            Some(build_video_settings(5_024_288, 24, 5, 540, 960))
        );
        assert!(s.is_ready());
        assert!(s.settings_sent());
        assert_eq!(s.info().unwrap().client_id, 42);

        assert_eq!(
            s.handle_binary(&msg).await.unwrap(),
            Dispatched::DuplicateInitial
        );
    }

    #[tokio::test]
    async fn truncated_initial_keeps_uninitialized() {
        let mut s = session();
        let msg = sample_session().to_message();
        let err = s.handle_binary(&msg[..40]).await.unwrap_err();
        assert!(matches!(err, ScrcpyError::TruncatedMessage { .. }));
        assert_eq!(s.phase(), SessionPhase::Uninitialized);
        assert!(!s.settings_sent());

        // a complete message afterwards still works
        assert!(matches!(
            s.handle_binary(&msg).await.unwrap(),
            Dispatched::Ready { settings: Some(_) }
        ));
    }

    #[tokio::test]
    async fn touch_space_fits_then_follows_stream() {
        let mut s = session();
        assert_eq!(s.touch_screen(), ScreenSize { width: 528, height: 960 });

        s.handle_binary(&sample_session().to_message()).await.unwrap();
        // 1080x2400 portrait fit into 540x960 → 432x960
        assert_eq!(s.touch_screen(), ScreenSize { width: 432, height: 960 });

        let Dispatched::Video { learned, .. } =
            s.handle_binary(&sps_payload(39, 29)).await.unwrap()
        else {
            panic!("expected video");
        };
        assert!(learned.is_some());
        assert_eq!(s.touch_screen(), ScreenSize { width: 640, height: 480 });
    }

    #[tokio::test]
    async fn oversized_stream_keeps_fitted_space() {
        let mut s = session();
        let mut touch = s.touch_screen_receiver();
        s.handle_binary(&sample_session().to_message()).await.unwrap();
        assert!(touch.has_changed().unwrap());
        assert_eq!(*touch.borrow_and_update(), ScreenSize { width: 432, height: 960 });

        // 1280 wide on a 1080 wide screen
        let Dispatched::Video { learned, .. } =
            s.handle_binary(&sps_payload(79, 44)).await.unwrap()
        else {
            panic!("expected video");
        };
        assert_eq!(learned.unwrap().dimensions.width, 1280);
        assert_eq!(s.touch_screen(), ScreenSize { width: 432, height: 960 });
        assert!(!touch.has_changed().unwrap());
    }

    #[tokio::test]
    async fn device_messages_are_decoded() {
        let mut s = session();
        let mut msg = MAGIC_MESSAGE.to_vec();
        msg.extend_from_slice(&[101, 0x00, 0x07, 0x00]);
        assert_eq!(
            s.handle_binary(&msg).await.unwrap(),
            Dispatched::Device(DeviceMessage::PushResponse { id: 7, code: 0 })
        );
    }

    #[tokio::test]
    async fn short_messages_are_video() {
        let mut s = session();
        let out = s.handle_binary(b"scrcpy_initial").await.unwrap();
        assert_eq!(out, Dispatched::Video { len: 14, learned: None });
        assert_eq!(s.stream().payload_count(), 1);
        assert_eq!(s.messages(), 1);
    }
}
