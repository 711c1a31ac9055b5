//! Control and device message type codes.
//!
//! Uses proper enums with `TryFrom` — no panics on unknown values.

use crate::error::ScrcpyError;
use std::fmt;

// ── ControlMessageType ───────────────────────────────────────────

/// First byte of every client → device control message.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMessageType {
    InjectKeycode = 0,
    InjectText = 1,
    /// Touch down / move / up at absolute coordinates.
    InjectTouchEvent = 2,
    InjectScrollEvent = 3,
    BackOrScreenOn = 4,
    ExpandNotificationPanel = 5,
    ExpandSettingsPanel = 6,
    CollapsePanels = 7,
    GetClipboard = 8,
    SetClipboard = 9,
    SetScreenPowerMode = 10,
    RotateDevice = 11,
    /// Video settings negotiation.
    ChangeStreamParameters = 101,
}

impl TryFrom<u8> for ControlMessageType {
    type Error = ScrcpyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ControlMessageType::InjectKeycode),
            1 => Ok(ControlMessageType::InjectText),
            2 => Ok(ControlMessageType::InjectTouchEvent),
            3 => Ok(ControlMessageType::InjectScrollEvent),
            4 => Ok(ControlMessageType::BackOrScreenOn),
            5 => Ok(ControlMessageType::ExpandNotificationPanel),
            6 => Ok(ControlMessageType::ExpandSettingsPanel),
            7 => Ok(ControlMessageType::CollapsePanels),
            8 => Ok(ControlMessageType::GetClipboard),
            9 => Ok(ControlMessageType::SetClipboard),
            10 => Ok(ControlMessageType::SetScreenPowerMode),
            11 => Ok(ControlMessageType::RotateDevice),
            101 => Ok(ControlMessageType::ChangeStreamParameters),
            _ => Err(ScrcpyError::UnknownVariant {
                type_name: "ControlMessageType",
                value: u64::from(value),
            }),
        }
    }
}

impl fmt::Display for ControlMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── DeviceMessageType ────────────────────────────────────────────

/// First byte of a device → client message body.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceMessageType {
    Clipboard = 0,
    PushResponse = 101,
}

impl TryFrom<u8> for DeviceMessageType {
    type Error = ScrcpyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceMessageType::Clipboard),
            101 => Ok(DeviceMessageType::PushResponse),
            _ => Err(ScrcpyError::UnknownVariant {
                type_name: "DeviceMessageType",
                value: u64::from(value),
            }),
        }
    }
}

impl fmt::Display for DeviceMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMessageType::Clipboard => write!(f, "Clipboard"),
            DeviceMessageType::PushResponse => write!(f, "PushResponse"),
        }
    }
}
