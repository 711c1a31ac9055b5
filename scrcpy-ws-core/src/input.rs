//! Touch injection on top of a control message sink.
//!
//! The encoders in [`crate::protocol::control`] only build bytes; this
//! module sequences them in time (click hold, swipe steps) and hands each
//! message to a [`ControlSink`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::ScrcpyError;
use crate::protocol::control::{ScreenSize, TouchAction, TouchEvent, swipe_plan};

/// Default press duration of [`TouchInjector::click`].
pub const DEFAULT_CLICK_HOLD: Duration = Duration::from_millis(100);

// ── ControlSink ──────────────────────────────────────────────────

/// Anything that can deliver one complete control message to the device.
#[async_trait]
pub trait ControlSink: Send {
    async fn send_control(&mut self, message: Bytes) -> Result<(), ScrcpyError>;
}

#[async_trait]
impl ControlSink for tokio::sync::mpsc::Sender<Bytes> {
    async fn send_control(&mut self, message: Bytes) -> Result<(), ScrcpyError> {
        self.send(message).await?;
        Ok(())
    }
}

#[async_trait]
impl<T: ControlSink + ?Sized> ControlSink for &mut T {
    async fn send_control(&mut self, message: Bytes) -> Result<(), ScrcpyError> {
        (**self).send_control(message).await
    }
}

// ── Touch space ──────────────────────────────────────────────────

/// Aspect-fit the device screen into the requested video bounds.
///
/// Landscape devices fit to the bounds' width, portrait to its height,
/// shrinking the other axis if it would overflow. Both sides are rounded
/// down to a multiple of 16. Without a usable device size the bounds
/// themselves are used.
pub fn touch_screen_size(device: Option<(i32, i32)>, bounds: ScreenSize) -> ScreenSize {
    let align = |v: u64| (v.min(u64::from(u16::MAX)) as u16) & !15;
    let (tw, th) = (u64::from(bounds.width), u64::from(bounds.height));

    let (dw, dh) = match device {
        Some((w, h)) if w > 0 && h > 0 => (w as u64, h as u64),
        _ => {
            return ScreenSize {
                width: align(tw),
                height: align(th),
            };
        }
    };

    let (w, h) = if dw > dh {
        let scaled_h = tw * dh / dw;
        if scaled_h > th {
            (th * dw / dh, th)
        } else {
            (tw, scaled_h)
        }
    } else {
        let scaled_w = th * dw / dh;
        if scaled_w > tw {
            (tw, tw * dh / dw)
        } else {
            (scaled_w, th)
        }
    };

    ScreenSize {
        width: align(w),
        height: align(h),
    }
}

// ── TouchInjector ────────────────────────────────────────────────

/// Sends touch gestures expressed in a fixed touch coordinate space.
pub struct TouchInjector<S> {
    sink: S,
    screen: ScreenSize,
}

impl<S: ControlSink> TouchInjector<S> {
    pub fn new(sink: S, screen: ScreenSize) -> Self {
        Self { sink, screen }
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    pub fn set_screen(&mut self, screen: ScreenSize) {
        self.screen = screen;
    }

    /// Give the sink back.
    pub fn into_inner(self) -> S {
        self.sink
    }

    /// Send a single touch event.
    pub async fn touch(&mut self, action: TouchAction, x: u32, y: u32) -> Result<(), ScrcpyError> {
        let msg = TouchEvent::new(action, x, y).encode(self.screen);
        self.sink.send_control(msg).await
    }

    /// Down, hold, Up at one point.
    pub async fn click(&mut self, x: u32, y: u32, hold: Duration) -> Result<(), ScrcpyError> {
        self.touch(TouchAction::Down, x, y).await?;
        tokio::time::sleep(hold).await;
        self.touch(TouchAction::Up, x, y).await?;
        debug!("click at ({x}, {y})");
        Ok(())
    }

    /// Execute a [`swipe_plan`]. Returns the number of messages sent.
    pub async fn swipe(
        &mut self,
        from: (u32, u32),
        to: (u32, u32),
        duration: Duration,
        steps: u32,
    ) -> Result<usize, ScrcpyError> {
        let plan = swipe_plan(from, to, steps, duration);
        for step in &plan {
            self.sink.send_control(step.event.encode(self.screen)).await?;
            if !step.delay_after.is_zero() {
                tokio::time::sleep(step.delay_after).await;
            }
        }
        debug!("swipe {from:?} -> {to:?} in {} messages", plan.len());
        Ok(plan.len())
    }
}

// ── Tests ────────────────────────────────────────────────────────
