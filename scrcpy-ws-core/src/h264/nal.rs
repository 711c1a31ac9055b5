//! Annex-B start code scanning.
//!
//! [`NalScanner`] walks a buffer and yields one [`NalUnit`] span per start
//! code. It borrows the buffer, never copies it, and can be restarted by
//! cloning or constructing a new scanner.

const START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

// ── NalType ──────────────────────────────────────────────────────

/// NAL unit type from the low five bits of the header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalType {
    /// Coded slice of a non-IDR picture.
    NonIdr,
    /// Coded slice of an IDR picture.
    Idr,
    Sei,
    Sps,
    Pps,
    Other(u8),
}

impl NalType {
    pub fn from_header(header: u8) -> Self {
        match header & 0x1F {
            1 => NalType::NonIdr,
            5 => NalType::Idr,
            6 => NalType::Sei,
            7 => NalType::Sps,
            8 => NalType::Pps,
            other => NalType::Other(other),
        }
    }

    /// The numeric `nal_unit_type`.
    pub fn as_u8(self) -> u8 {
        match self {
            NalType::NonIdr => 1,
            NalType::Idr => 5,
            NalType::Sei => 6,
            NalType::Sps => 7,
            NalType::Pps => 8,
            NalType::Other(v) => v,
        }
    }
}

// ── NalUnit ──────────────────────────────────────────────────────

/// A span of one NAL unit inside a scanned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit {
    /// Offset of the first start code byte.
    pub start: usize,
    /// Offset of the NAL header byte.
    pub header: usize,
    /// Exclusive end: the next start code or the end of the buffer.
    pub end: usize,
    pub nal_type: NalType,
}

impl NalUnit {
    /// Start code length (3 or 4).
    pub fn start_code_len(&self) -> usize {
        self.header - self.start
    }

    /// Header byte and body.
    pub fn payload<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.header..self.end]
    }

    /// Body without the header byte.
    pub fn body<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.header + 1..self.end]
    }
}

// ── NalScanner ───────────────────────────────────────────────────

/// Lazy iterator over the NAL units of an Annex-B buffer.
#[derive(Debug, Clone)]
pub struct NalScanner<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> NalScanner<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }
}

impl Iterator for NalScanner<'_> {
    type Item = NalUnit;

    fn next(&mut self) -> Option<Self::Item> {
        let (start, code_len) = find_start_code(self.data, self.cursor)?;
        let header = start + code_len;
        if header >= self.data.len() {
            self.cursor = self.data.len();
            return None;
        }

        let end = find_start_code(self.data, header + 1)
            .map(|(next, _)| next)
            .unwrap_or(self.data.len());
        self.cursor = end;

        Some(NalUnit {
            start,
            header,
            end,
            nal_type: NalType::from_header(self.data[header]),
        })
    }
}

/// Locate the next start code at or after `from`.
///
/// Returns its offset and length; a `00 00 01` preceded by a zero inside
/// the search window is reported as the 4-byte form.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    if from >= data.len() {
        return None;
    }
    let pos = data[from..]
        .windows(START_CODE.len())
        .position(|w| w == START_CODE)
        .map(|rel| from + rel)?;
    if pos > from && data[pos - 1] == 0 {
        Some((pos - 1, 4))
    } else {
        Some((pos, 3))
    }
}

// ── Tests ────────────────────────────────────────────────────────
