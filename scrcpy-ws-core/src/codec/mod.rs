//! Fixed-size frame splitting for the decoder's raw output stream.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::ScrcpyError;

/// Splits a byte stream into chunks of exactly `frame_size` bytes.
///
/// Bytes of an incomplete frame stay in the read buffer across calls, so a
/// read attempt that times out loses nothing. A partial frame left at end
/// of stream is dropped.
#[derive(Debug, Clone, Copy)]
pub struct RawFrameCodec {
    frame_size: usize,
}

impl RawFrameCodec {
    pub fn new(frame_size: usize) -> Result<Self, ScrcpyError> {
        if frame_size == 0 {
            return Err(ScrcpyError::InvalidArgument(
                "frame size must be non-zero".into(),
            ));
        }
        Ok(Self { frame_size })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

impl Decoder for RawFrameCodec {
    type Item = Bytes;
    type Error = ScrcpyError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < self.frame_size {
            src.reserve(self.frame_size - src.len());
            return Ok(None);
        }
        Ok(Some(src.split_to(self.frame_size).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                src.clear();
                Ok(None)
            }
        }
    }
}
