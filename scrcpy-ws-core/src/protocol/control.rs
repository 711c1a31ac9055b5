//! Outbound control messages.
//!
//! Each builder returns one complete message; the transport sends it as a
//! single binary frame with no extra framing.
//!
//! ## Wire formats (big-endian)
//!
//! **Video settings** (36 bytes):
//! ```text
//! type:                     u8   = 101
//! bitrate:                  u32
//! max_fps:                  u32
//! i_frame_interval:         i8
//! width:                    u16
//! height:                   u16
//! crop (l, t, r, b):        4 x u16 = 0
//! send_frame_meta:          i8   = 0
//! locked_video_orientation: i8   = -1
//! display_id:               u32  = 0
//! codec_options_len:        u32  = 0
//! encoder_name_len:         u32  = 0
//! ```
//!
//! **Touch event** (29 bytes):
//! ```text
//! type:            u8   = 2
//! action:          u8
//! pointer_id_high: u32  = 0
//! pointer_id_low:  u32  = 0
//! x:               u32
//! y:               u32
//! screen_width:    u16
//! screen_height:   u16
//! pressure:        u16  (0xFFFF on Down, else 0)
//! buttons:         u32  = PRIMARY
//! padding:         u8   = 0
//! ```

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::flags::Buttons;
use crate::message::ControlMessageType;

/// Pause after the initial Down of a swipe before the first Move.
pub const SWIPE_PRESS_SETTLE: Duration = Duration::from_millis(50);

// ── ScreenSize ───────────────────────────────────────────────────

/// The coordinate space touch events are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScreenSize {
    pub width: u16,
    pub height: u16,
}

// ── VideoSettings ────────────────────────────────────────────────

/// Requested encoder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSettings {
    pub bitrate: u32,
    pub max_fps: u32,
    pub i_frame_interval: i8,
    pub width: u16,
    pub height: u16,
}

impl VideoSettings {
    /// Encoded size on the wire.
    pub const SIZE: usize = 36;

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(ControlMessageType::ChangeStreamParameters as u8);
        buf.put_u32(self.bitrate);
        buf.put_u32(self.max_fps);
        buf.put_i8(self.i_frame_interval);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        // crop rectangle
        buf.put_bytes(0, 8);
        // send_frame_meta
        buf.put_i8(0);
        // locked_video_orientation: unlocked
        buf.put_i8(-1);
        // display_id
        buf.put_u32(0);
        // codec options, encoder name
        buf.put_u32(0);
        buf.put_u32(0);
        buf.freeze()
    }
}

pub fn build_video_settings(
    bitrate: u32,
    max_fps: u32,
    i_frame_interval: i8,
    width: u16,
    height: u16,
) -> Bytes {
    VideoSettings {
        bitrate,
        max_fps,
        i_frame_interval,
        width,
        height,
    }
    .encode()
}

// ── Touch ────────────────────────────────────────────────────────

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchAction {
    Down = 0,
    Up = 1,
    Move = 2,
}

/// One pointer action at absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub action: TouchAction,
    pub x: u32,
    pub y: u32,
}

impl TouchEvent {
    /// Encoded size on the wire.
    pub const SIZE: usize = 29;

    pub fn new(action: TouchAction, x: u32, y: u32) -> Self {
        Self { action, x, y }
    }

    pub fn encode(&self, screen: ScreenSize) -> Bytes {
        let pressure: u16 = match self.action {
            TouchAction::Down => 0xFFFF,
            TouchAction::Up | TouchAction::Move => 0,
        };

        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(ControlMessageType::InjectTouchEvent as u8);
        buf.put_u8(self.action as u8);
        // pointer id 0, split high/low
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u32(self.x);
        buf.put_u32(self.y);
        buf.put_u16(screen.width);
        buf.put_u16(screen.height);
        buf.put_u16(pressure);
        buf.put_u32(Buttons::PRIMARY.bits());
        buf.put_u8(0);
        buf.freeze()
    }
}

pub fn build_touch_event(
    action: TouchAction,
    x: u32,
    y: u32,
    screen_width: u16,
    screen_height: u16,
) -> Bytes {
    TouchEvent::new(action, x, y).encode(ScreenSize {
        width: screen_width,
        height: screen_height,
    })
}

// ── Swipe ────────────────────────────────────────────────────────

/// A touch event and the pause to observe after sending it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTouch {
    pub event: TouchEvent,
    pub delay_after: Duration,
}

/// Down, `steps` interpolated Moves, Up.
///
/// Move `i` (1-based) sits at `from + (to - from) * i / steps`, so the last
/// Move lands on `to`. Each Move is followed by `duration / steps`. A step
/// count of zero is treated as one.
pub fn swipe_plan(
    from: (u32, u32),
    to: (u32, u32),
    steps: u32,
    duration: Duration,
) -> Vec<ScheduledTouch> {
    let steps = steps.max(1);
    let step_delay = duration / steps;
    let lerp = |a: u32, b: u32, i: u32| -> u32 {
        let delta = i64::from(b) - i64::from(a);
        (i64::from(a) + delta * i64::from(i) / i64::from(steps)) as u32
    };

    let mut plan = Vec::with_capacity(steps as usize + 2);
    plan.push(ScheduledTouch {
        event: TouchEvent::new(TouchAction::Down, from.0, from.1),
        delay_after: SWIPE_PRESS_SETTLE,
    });
    for i in 1..=steps {
        plan.push(ScheduledTouch {
            event: TouchEvent::new(TouchAction::Move, lerp(from.0, to.0, i), lerp(from.1, to.1, i)),
            delay_after: step_delay,
        });
    }
    plan.push(ScheduledTouch {
        event: TouchEvent::new(TouchAction::Up, to.0, to.1),
        delay_after: Duration::ZERO,
    });
    plan
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn video_settings_fixture() {
        let msg = build_video_settings(8_000_000, 24, 5, 540, 960);
        assert_eq!(msg.len(), VideoSettings::SIZE);
        assert_eq!(
            hex(&msg),
            concat!(
                "65", "007a1200", "00000018", "05", "021c", "03c0",
                "0000000000000000", "00", "ff", "00000000", "00000000", "00000000"
            )
        );
    }

    #[test]
    fn touch_down_fixture() {
        let msg = build_touch_event(TouchAction::Down, 100, 200, 540, 960);
        assert_eq!(msg.len(), TouchEvent::SIZE);
        assert_eq!(
            hex(&msg),
            concat!(
                "02", "00", "00000000", "00000000", "00000064", "000000c8",
                "021c", "03c0", "ffff", "00000001", "00"
            )
        );
    }

    #[test]
    fn pressure_only_on_down() {
        let screen = ScreenSize {
            width: 540,
            height: 960,
        };
        for action in [TouchAction::Up, TouchAction::Move] {
            let msg = TouchEvent::new(action, 1, 2).encode(screen);
            assert_eq!(msg[1], action as u8);
            assert_eq!(&msg[22..24], &[0, 0]);
            assert_eq!(&msg[24..28], &[0, 0, 0, 1]);
        }
    }

    #[test]
    fn swipe_plan_shape() {
        let plan = swipe_plan((0, 0), (100, 100), 10, Duration::from_secs(1));
        assert_eq!(plan.len(), 12);
        assert_eq!(plan[0].event, TouchEvent::new(TouchAction::Down, 0, 0));
        assert_eq!(plan[11].event, TouchEvent::new(TouchAction::Up, 100, 100));

        let moves = &plan[1..11];
        assert!(moves.iter().all(|s| s.event.action == TouchAction::Move));
        assert!(moves.iter().all(|s| s.delay_after == Duration::from_millis(100)));
        for pair in moves.windows(2) {
            assert!(pair[1].event.x > pair[0].event.x);
            assert!(pair[1].event.y > pair[0].event.y);
        }
        assert_eq!((moves[0].event.x, moves[0].event.y), (10, 10));
        assert_eq!((moves[9].event.x, moves[9].event.y), (100, 100));
    }

    #[test]
    fn swipe_plan_backwards() {
        let plan = swipe_plan((300, 800), (300, 200), 4, Duration::from_millis(400));
        let ys: Vec<u32> = plan.iter().map(|s| s.event.y).collect();
        assert_eq!(ys, vec![800, 650, 500, 350, 200, 200]);
        assert!(plan.iter().all(|s| s.event.x == 300));
    }

    #[test]
    fn zero_steps_still_moves_once() {
        let plan = swipe_plan((0, 0), (50, 50), 0, Duration::from_millis(200));
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[1].event, TouchEvent::new(TouchAction::Move, 50, 50));
    }
}
