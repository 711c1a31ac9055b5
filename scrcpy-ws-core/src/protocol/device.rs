//! Device → client messages (after the `scrcpy_message` prefix).

use crate::error::ScrcpyError;
use crate::message::DeviceMessageType;
use crate::protocol::reader::FieldReader;

/// A decoded device message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    /// Device clipboard contents.
    Clipboard(String),
    /// Acknowledgement of a pushed file or command.
    PushResponse { id: i16, code: i8 },
    /// A type this client does not handle; logged and ignored.
    Unknown { msg_type: u8, len: usize },
}

impl DeviceMessage {
    pub fn decode(body: &[u8]) -> Result<Self, ScrcpyError> {
        let mut r = FieldReader::new(body);
        let msg_type = r.u8("device message type")?;

        match DeviceMessageType::try_from(msg_type) {
            Ok(DeviceMessageType::Clipboard) => {
                let len = r.len("clipboard length")?;
                let text = r.bytes(len, "clipboard text")?;
                Ok(DeviceMessage::Clipboard(
                    String::from_utf8_lossy(text).into_owned(),
                ))
            }
            Ok(DeviceMessageType::PushResponse) => {
                let id = r.i16("push response id")?;
                let code = r.i8("push response code")?;
                Ok(DeviceMessage::PushResponse { id, code })
            }
            Err(_) => Ok(DeviceMessage::Unknown {
                msg_type,
                len: r.remaining(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipboard() {
        let text = "héllo";
        let mut body = vec![0u8];
        body.extend_from_slice(&(text.len() as i32).to_be_bytes());
        body.extend_from_slice(text.as_bytes());
        assert_eq!(
            DeviceMessage::decode(&body).unwrap(),
            DeviceMessage::Clipboard("héllo".into())
        );
    }

    #[test]
    fn push_response() {
        let body = [101u8, 0x00, 0x07, 0xFF];
        assert_eq!(
            DeviceMessage::decode(&body).unwrap(),
            DeviceMessage::PushResponse { id: 7, code: -1 }
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let body = [55u8, 1, 2, 3];
        assert_eq!(
            DeviceMessage::decode(&body).unwrap(),
            DeviceMessage::Unknown { msg_type: 55, len: 3 }
        );
    }

    #[test]
    fn truncated_clipboard() {
        let mut body = vec![0u8];
        body.extend_from_slice(&10i32.to_be_bytes());
        body.extend_from_slice(b"abc");
        assert!(matches!(
            DeviceMessage::decode(&body),
            Err(ScrcpyError::TruncatedMessage {
                context: "clipboard text",
                needed: 10,
                available: 3,
                ..
            })
        ));
        assert!(DeviceMessage::decode(&[]).is_err());
        assert!(DeviceMessage::decode(&[101, 0]).is_err());
    }
}
