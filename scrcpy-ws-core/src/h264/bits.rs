//! Big-endian bit cursor with Exp-Golomb support.

use crate::error::ScrcpyError;

/// Reads bits MSB-first from a borrowed byte slice.
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Absolute bit position of the next read.
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bit offset of the next read.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bits_remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.pos)
    }

    fn ensure(&self, wanted: u32) -> Result<(), ScrcpyError> {
        let remaining = self.bits_remaining();
        if (wanted as usize) > remaining {
            return Err(ScrcpyError::OutOfData {
                wanted,
                position: self.pos,
                remaining,
            });
        }
        Ok(())
    }

    /// Read `n` bits (at most 32) as an unsigned value.
    pub fn read_bits(&mut self, n: u32) -> Result<u32, ScrcpyError> {
        if n > 32 {
            return Err(ScrcpyError::InvalidArgument(format!(
                "cannot read {n} bits into a u32"
            )));
        }
        self.ensure(n)?;

        let mut value: u64 = 0;
        for _ in 0..n {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - (self.pos % 8))) & 1;
            value = (value << 1) | u64::from(bit);
            self.pos += 1;
        }
        Ok(value as u32)
    }

    pub fn read_flag(&mut self) -> Result<bool, ScrcpyError> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn read_u8(&mut self) -> Result<u8, ScrcpyError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn skip_bits(&mut self, n: usize) -> Result<(), ScrcpyError> {
        let remaining = self.bits_remaining();
        if n > remaining {
            return Err(ScrcpyError::OutOfData {
                wanted: n.min(u32::MAX as usize) as u32,
                position: self.pos,
                remaining,
            });
        }
        self.pos += n;
        Ok(())
    }

    /// Unsigned Exp-Golomb: `2^k - 1 + suffix` where `k` is the number of
    /// leading zero bits before the stop bit.
    pub fn read_ue(&mut self) -> Result<u32, ScrcpyError> {
        let mut leading_zeros: u32 = 0;
        while !self.read_flag()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(ScrcpyError::ParseFailed("exp-golomb prefix too long"));
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) - 1 + u64::from(suffix)) as u32)
    }

    /// Signed Exp-Golomb: maps `v` to `(-1)^(v+1) * ceil(v/2)`.
    pub fn read_se(&mut self) -> Result<i32, ScrcpyError> {
        let v = i64::from(self.read_ue()?);
        let magnitude = (v + 1) / 2;
        Ok(if v % 2 == 1 { magnitude } else { -magnitude } as i32)
    }
}

/// Strip emulation-prevention bytes: every `00 00 03` becomes `00 00`.
pub fn to_rbsp(ebsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ebsp.len());
    let mut zeros = 0usize;
    for &byte in ebsp {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_reads() {
        let data = [0b1010_1100, 0xFF, 0x01];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(1).unwrap(), 1);
        assert_eq!(r.read_bits(3).unwrap(), 0b010);
        assert_eq!(r.read_bits(4).unwrap(), 0b1100);
        assert_eq!(r.read_u8().unwrap(), 0xFF);
        assert_eq!(r.position(), 16);
        assert_eq!(r.bits_remaining(), 8);
        assert_eq!(r.read_bits(8).unwrap(), 1);
        assert_eq!(r.bits_remaining(), 0);
    }

    #[test]
    fn read_past_end_is_out_of_data() {
        let data = [0xAB];
        let mut r = BitReader::new(&data);
        r.read_bits(5).unwrap();
        let err = r.read_bits(4).unwrap_err();
        assert!(matches!(
            err,
            ScrcpyError::OutOfData {
                wanted: 4,
                position: 5,
                remaining: 3
            }
        ));
    }

    #[test]
    fn full_word_read() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(32).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn unsigned_exp_golomb() {
        // 1 | 010 | 011 | 00100 | 00111 -> 0, 1, 2, 3, 6
        let data = [0b1010_0110, 0b0100_0011, 0b1000_0000];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_ue().unwrap(), 0);
        assert_eq!(r.read_ue().unwrap(), 1);
        assert_eq!(r.read_ue().unwrap(), 2);
        assert_eq!(r.read_ue().unwrap(), 3);
        assert_eq!(r.read_ue().unwrap(), 6);
    }

    #[test]
    fn signed_exp_golomb() {
        // ue 1, 2, 3, 4 -> se +1, -1, +2, -2
        let data = [0b0100_1100, 0b1000_0101, 0b0000_0000];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_se().unwrap(), 1);
        assert_eq!(r.read_se().unwrap(), -1);
        assert_eq!(r.read_se().unwrap(), 2);
        assert_eq!(r.read_se().unwrap(), -2);
    }

    #[test]
    fn exp_golomb_without_stop_bit_fails() {
        let data = [0x00, 0x00];
        let mut r = BitReader::new(&data);
        assert!(matches!(r.read_ue(), Err(ScrcpyError::OutOfData { .. })));
    }

    #[test]
    fn emulation_prevention_removed() {
        let ebsp = [0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x03];
        assert_eq!(to_rbsp(&ebsp), vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x03]);
    }
}
