//! The one-time initial info message.
//!
//! ## Wire format (after the `scrcpy_initial` prefix, big-endian)
//!
//! ```text
//! device_name:        [u8; 64]  NUL-padded UTF-8
//! display_count:      i32
//! per display:
//!   display_id:       i32
//!   width:            i32
//!   height:           i32
//!   reserved:         [u8; 12]  (rest of the 24-byte DisplayInfo block)
//!   connection_count: i32
//!   screen_info_len:  i32, then that many opaque bytes
//!   video_set_len:    i32, then that many opaque bytes
//! encoder_count:      i32
//! per encoder:        i32 length, then UTF-8 name
//! client_id:          i32
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::ScrcpyError;
use crate::protocol::MAGIC_INITIAL;
use crate::protocol::control::ScreenSize;
use crate::protocol::reader::FieldReader;

/// Fixed size of the device name field.
pub const DEVICE_NAME_LEN: usize = 64;
/// Size of the DisplayInfo block that starts each display entry.
pub const DISPLAY_INFO_LEN: usize = 24;

// ── DisplayDescriptor ────────────────────────────────────────────

/// One display reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayDescriptor {
    pub display_id: i32,
    pub width: i32,
    pub height: i32,
    /// Clients currently attached to this display.
    pub connection_count: i32,
    #[serde(skip)]
    pub screen_info: Bytes,
    #[serde(skip)]
    pub video_settings: Bytes,
}

impl DisplayDescriptor {
    /// Screen size, if both sides fit the touch message fields.
    pub fn screen_size(&self) -> Option<ScreenSize> {
        let width = u16::try_from(self.width).ok()?;
        let height = u16::try_from(self.height).ok()?;
        (width > 0 && height > 0).then_some(ScreenSize { width, height })
    }
}

// ── SessionInfo ──────────────────────────────────────────────────

/// Device, display and encoder enumeration sent once per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub device_name: String,
    pub displays: Vec<DisplayDescriptor>,
    pub encoders: Vec<String>,
    pub client_id: i32,
}

impl SessionInfo {
    /// Decode a message body (prefix already stripped).
    ///
    /// Fields are read strictly in order; the first read that would run
    /// past the end fails with [`ScrcpyError::TruncatedMessage`] and
    /// nothing is returned.
    pub fn decode(body: &[u8]) -> Result<Self, ScrcpyError> {
        let mut r = FieldReader::new(body);

        let raw_name = r.bytes(DEVICE_NAME_LEN, "device name")?;
        let name_end = raw_name.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        let device_name = String::from_utf8_lossy(&raw_name[..name_end]).into_owned();

        let display_count = r.len("display count")?;
        let mut displays = Vec::new();
        for _ in 0..display_count {
            let block = r.bytes(DISPLAY_INFO_LEN, "display info")?;
            let mut block = FieldReader::new(block);
            let display_id = block.i32("display id")?;
            let width = block.i32("display width")?;
            let height = block.i32("display height")?;

            let connection_count = r.i32("connection count")?;
            let screen_info_len = r.len("screen info length")?;
            let screen_info = Bytes::copy_from_slice(r.bytes(screen_info_len, "screen info")?);
            let video_settings_len = r.len("video settings length")?;
            let video_settings =
                Bytes::copy_from_slice(r.bytes(video_settings_len, "video settings")?);

            displays.push(DisplayDescriptor {
                display_id,
                width,
                height,
                connection_count,
                screen_info,
                video_settings,
            });
        }

        let encoder_count = r.len("encoder count")?;
        let mut encoders = Vec::new();
        for _ in 0..encoder_count {
            let len = r.len("encoder name length")?;
            let name = r.bytes(len, "encoder name")?;
            encoders.push(String::from_utf8_lossy(name).into_owned());
        }

        let client_id = r.i32("client id")?;

        Ok(Self {
            device_name,
            displays,
            encoders,
            client_id,
        })
    }

    /// Encode the body (without prefix). Reserved bytes are zero and a name
    /// longer than the field is cut to 64 bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(128 + self.displays.len() * 64);

        let mut name = [0u8; DEVICE_NAME_LEN];
        let raw = self.device_name.as_bytes();
        let n = raw.len().min(DEVICE_NAME_LEN);
        name[..n].copy_from_slice(&raw[..n]);
        buf.put_slice(&name);

        buf.put_i32(self.displays.len() as i32);
        for d in &self.displays {
            buf.put_i32(d.display_id);
            buf.put_i32(d.width);
            buf.put_i32(d.height);
            buf.put_bytes(0, DISPLAY_INFO_LEN - 12);
            buf.put_i32(d.connection_count);
            buf.put_i32(d.screen_info.len() as i32);
            buf.put_slice(&d.screen_info);
            buf.put_i32(d.video_settings.len() as i32);
            buf.put_slice(&d.video_settings);
        }

        buf.put_i32(self.encoders.len() as i32);
        for e in &self.encoders {
            buf.put_i32(e.len() as i32);
            buf.put_slice(e.as_bytes());
        }

        buf.put_i32(self.client_id);
        buf.freeze()
    }

    /// Full inbound message: prefix followed by [`encode`](Self::encode).
    pub fn to_message(&self) -> Bytes {
        let body = self.encode();
        let mut buf = BytesMut::with_capacity(MAGIC_INITIAL.len() + body.len());
        buf.put_slice(MAGIC_INITIAL);
        buf.put_slice(&body);
        buf.freeze()
    }

    /// The display the stream is mirrored from: id 0 when present,
    /// otherwise the first one listed.
    pub fn primary_display(&self) -> Option<&DisplayDescriptor> {
        self.displays
            .iter()
            .find(|d| d.display_id == 0)
            .or_else(|| self.displays.first())
    }

    /// Pretty JSON for diagnostics. Opaque display blobs are omitted.
    pub fn to_json(&self) -> Result<String, ScrcpyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_session() -> SessionInfo {
        SessionInfo {
            device_name: "Pixel 7".into(),
            displays: vec![DisplayDescriptor {
                display_id: 0,
                width: 1080,
                height: 2400,
                connection_count: 1,
                screen_info: Bytes::from_static(&[9, 8, 7]),
                video_settings: Bytes::new(),
            }],
            encoders: vec!["OMX.google.h264.encoder".into(), "c2.android.avc.encoder".into()],
            client_id: 42,
        }
    }

    #[test]
    fn round_trip() {
        let info = sample_session();
        let decoded = SessionInfo::decode(&info.encode()).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn round_trip_multiple_displays() {
        let mut info = sample_session();
        info.displays.push(DisplayDescriptor {
            display_id: 2,
            width: 1920,
            height: 1080,
            connection_count: 0,
            screen_info: Bytes::new(),
            video_settings: Bytes::from_static(&[0xAA; 36]),
        });
        info.encoders.clear();
        let decoded = SessionInfo::decode(&info.encode()).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.primary_display().unwrap().display_id, 0);
    }

    #[test]
    fn hand_built_message() {
        let mut body = Vec::new();
        let mut name = b"emulator".to_vec();
        name.resize(64, 0);
        body.extend_from_slice(&name);
        body.extend_from_slice(&1i32.to_be_bytes());
        body.extend_from_slice(&0i32.to_be_bytes());
        body.extend_from_slice(&720i32.to_be_bytes());
        body.extend_from_slice(&1280i32.to_be_bytes());
        body.extend_from_slice(&[0xEE; 12]);
        body.extend_from_slice(&3i32.to_be_bytes());
        body.extend_from_slice(&0i32.to_be_bytes());
        body.extend_from_slice(&0i32.to_be_bytes());
        body.extend_from_slice(&1i32.to_be_bytes());
        body.extend_from_slice(&4i32.to_be_bytes());
        body.extend_from_slice(b"avc1");
        body.extend_from_slice(&(-7i32).to_be_bytes());

        let info = SessionInfo::decode(&body).unwrap();
        assert_eq!(info.device_name, "emulator");
        assert_eq!(info.displays[0].width, 720);
        assert_eq!(info.displays[0].height, 1280);
        assert_eq!(info.displays[0].connection_count, 3);
        assert_eq!(info.encoders, vec!["avc1".to_string()]);
        assert_eq!(info.client_id, -7);
        assert_eq!(
            info.displays[0].screen_size(),
            Some(ScreenSize {
                width: 720,
                height: 1280
            })
        );
    }

    #[test]
    fn json_omits_opaque_blobs() {
        let json = sample_session().to_json().unwrap();
        assert!(json.contains("\"device_name\": \"Pixel 7\""));
        assert!(json.contains("\"connection_count\": 1"));
        assert!(!json.contains("screen_info"));
    }

    #[test]
    fn every_truncation_is_reported() {
        let body = sample_session().encode();
        for cut in 0..body.len() {
            let err = SessionInfo::decode(&body[..cut]).unwrap_err();
            assert!(
                matches!(err, ScrcpyError::TruncatedMessage { .. }),
                "cut at {cut}: {err}"
            );
        }
    }

    #[test]
    fn oversized_encoder_name_is_truncated_message() {
        let mut info = sample_session();
        info.encoders = vec!["x".into()];
        let mut body = info.encode().to_vec();
        // patch the encoder name length to run past the end
        let len_at = body.len() - 4 - 1 - 4;
        body[len_at..len_at + 4].copy_from_slice(&1000i32.to_be_bytes());
        assert!(matches!(
            SessionInfo::decode(&body),
            Err(ScrcpyError::TruncatedMessage {
                context: "encoder name",
                ..
            })
        ));
    }

    #[test]
    fn negative_display_count_is_malformed() {
        let mut body = vec![0u8; 64];
        body.extend_from_slice(&(-1i32).to_be_bytes());
        assert!(matches!(
            SessionInfo::decode(&body),
            Err(ScrcpyError::MalformedMessage("display count"))
        ));
    }

    #[test]
    fn message_carries_prefix() {
        let msg = sample_session().to_message();
        assert!(msg.starts_with(MAGIC_INITIAL));
    }
}
