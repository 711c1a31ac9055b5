//! Bounds-checked big-endian field reads over a message body.

use bytes::Buf;

use crate::error::ScrcpyError;

/// Cursor that reports the offset and shortfall of any truncated read.
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            total: buf.len(),
        }
    }

    pub(crate) fn offset(&self) -> usize {
        self.total - self.buf.len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn need(&self, needed: usize, context: &'static str) -> Result<(), ScrcpyError> {
        if self.buf.remaining() < needed {
            return Err(ScrcpyError::TruncatedMessage {
                context,
                offset: self.offset(),
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self, context: &'static str) -> Result<u8, ScrcpyError> {
        self.need(1, context)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn i8(&mut self, context: &'static str) -> Result<i8, ScrcpyError> {
        self.need(1, context)?;
        Ok(self.buf.get_i8())
    }

    pub(crate) fn i16(&mut self, context: &'static str) -> Result<i16, ScrcpyError> {
        self.need(2, context)?;
        Ok(self.buf.get_i16())
    }

    pub(crate) fn i32(&mut self, context: &'static str) -> Result<i32, ScrcpyError> {
        self.need(4, context)?;
        Ok(self.buf.get_i32())
    }

    /// An `i32` count or length; negative values are malformed.
    pub(crate) fn len(&mut self, context: &'static str) -> Result<usize, ScrcpyError> {
        let value = self.i32(context)?;
        usize::try_from(value).map_err(|_| ScrcpyError::MalformedMessage(context))
    }

    pub(crate) fn bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], ScrcpyError> {
        self.need(n, context)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }
}
