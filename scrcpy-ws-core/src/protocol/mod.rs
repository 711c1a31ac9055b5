//! Inbound message routing and the scrcpy wire payloads.
//!
//! Every binary WebSocket message from the server is exactly one of:
//! the one-time initial info, a device message, or a fragment of the H.264
//! elementary stream. The first two are identified by a 14-byte magic
//! prefix; anything else is video.

pub mod control;
pub mod device;
pub mod initial;
mod reader;

pub use control::{
    ScheduledTouch, ScreenSize, TouchAction, TouchEvent, VideoSettings, build_touch_event,
    build_video_settings, swipe_plan,
};
pub use device::DeviceMessage;
pub use initial::{DisplayDescriptor, SessionInfo};

/// Prefix of the initial info message.
pub const MAGIC_INITIAL: &[u8; 14] = b"scrcpy_initial";
/// Prefix of device messages.
pub const MAGIC_MESSAGE: &[u8; 14] = b"scrcpy_message";

// ── Inbound ──────────────────────────────────────────────────────

/// Classification of one inbound binary message.
///
/// Magic branches carry the body after the prefix; video carries the
/// whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    InitialInfo(&'a [u8]),
    DeviceMessage(&'a [u8]),
    VideoPayload(&'a [u8]),
}

/// Payload-free discriminant of [`Inbound`], handy for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    InitialInfo,
    DeviceMessage,
    VideoPayload,
}

impl<'a> Inbound<'a> {
    /// Route a message. Total: the video branch is the default.
    ///
    /// A magic branch is taken only when the message is strictly longer
    /// than the prefix, so a bare prefix is treated as stream bytes.
    pub fn classify(data: &'a [u8]) -> Self {
        if let Some(body) = strip_magic(data, MAGIC_INITIAL) {
            Inbound::InitialInfo(body)
        } else if let Some(body) = strip_magic(data, MAGIC_MESSAGE) {
            Inbound::DeviceMessage(body)
        } else {
            Inbound::VideoPayload(data)
        }
    }

    pub fn kind(&self) -> InboundKind {
        match self {
            Inbound::InitialInfo(_) => InboundKind::InitialInfo,
            Inbound::DeviceMessage(_) => InboundKind::DeviceMessage,
            Inbound::VideoPayload(_) => InboundKind::VideoPayload,
        }
    }
}

fn strip_magic<'a>(data: &'a [u8], magic: &[u8; 14]) -> Option<&'a [u8]> {
    if data.len() > magic.len() && data.starts_with(magic) {
        Some(&data[magic.len()..])
    } else {
        None
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_info_prefix() {
        let mut msg = MAGIC_INITIAL.to_vec();
        msg.extend_from_slice(&[1, 2, 3]);
        assert_eq!(Inbound::classify(&msg), Inbound::InitialInfo(&[1, 2, 3]));
    }

    #[test]
    fn device_message_prefix() {
        let mut msg = MAGIC_MESSAGE.to_vec();
        msg.push(101);
        let routed = Inbound::classify(&msg);
        assert_eq!(routed.kind(), InboundKind::DeviceMessage);
        assert_eq!(routed, Inbound::DeviceMessage(&[101]));
    }

    #[test]
    fn everything_else_is_video() {
        let nal = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42];
        assert_eq!(Inbound::classify(&nal), Inbound::VideoPayload(&nal));
        assert_eq!(Inbound::classify(&[]).kind(), InboundKind::VideoPayload);
        // bare prefix, no body
        assert_eq!(
            Inbound::classify(MAGIC_INITIAL).kind(),
            InboundKind::VideoPayload
        );
    }

    #[test]
    fn short_buffers_are_always_video() {
        for len in 0..14 {
            assert_eq!(
                Inbound::classify(&MAGIC_INITIAL[..len]).kind(),
                InboundKind::VideoPayload
            );
            assert_eq!(
                Inbound::classify(&MAGIC_MESSAGE[..len]).kind(),
                InboundKind::VideoPayload
            );
        }
    }

    #[test]
    fn classification_is_exclusive() {
        // Every possible one-byte body appended to each prefix and to noise.
        for byte in 0..=u8::MAX {
            let mut a = MAGIC_INITIAL.to_vec();
            a.push(byte);
            let mut b = MAGIC_MESSAGE.to_vec();
            b.push(byte);
            let mut c = b"scrcpy_unknown".to_vec();
            c.push(byte);
            assert_eq!(Inbound::classify(&a).kind(), InboundKind::InitialInfo);
            assert_eq!(Inbound::classify(&b).kind(), InboundKind::DeviceMessage);
            assert_eq!(Inbound::classify(&c).kind(), InboundKind::VideoPayload);
        }
    }
}
