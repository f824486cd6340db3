//! Bounds-checked little-endian field access

use crate::error::{CodecError, CodecResult};

/// Read-only view over one characteristic payload
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fields<'a> {
    record: &'static str,
    bytes: &'a [u8],
}

impl<'a> Fields<'a> {
    /// Wrap `bytes`, failing unless at least `needed` bytes are present
    pub(crate) fn new(record: &'static str, bytes: &'a [u8], needed: usize) -> CodecResult<Self> {
        if bytes.len() < needed {
            return Err(CodecError::TooShort {
                record,
                needed,
                actual: bytes.len(),
            });
        }
        Ok(Self { record, bytes })
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn u8(&self, offset: usize) -> CodecResult<u8> {
        self.bytes.get(offset).copied().ok_or(self.short(offset + 1))
    }

    pub(crate) fn u16(&self, offset: usize) -> CodecResult<u16> {
        Ok(u16::from_le_bytes(self.array(offset)?))
    }

    pub(crate) fn i16(&self, offset: usize) -> CodecResult<i16> {
        Ok(i16::from_le_bytes(self.array(offset)?))
    }

    pub(crate) fn u32(&self, offset: usize) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.array(offset)?))
    }

    /// Nonzero byte as `true`
    pub(crate) fn flag(&self, offset: usize) -> CodecResult<bool> {
        Ok(self.u8(offset)? != 0)
    }

    pub(crate) fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::malformed(self.record, reason)
    }

    fn array<const N: usize>(&self, offset: usize) -> CodecResult<[u8; N]> {
        self.bytes
            .get(offset..offset + N)
            .and_then(|s| s.try_into().ok())
            .ok_or(self.short(offset + N))
    }

    fn short(&self, needed: usize) -> CodecError {
        CodecError::TooShort {
            record: self.record,
            needed,
            actual: self.bytes.len(),
        }
    }
}

/// Round to two decimals, the precision published for temperatures
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_fields() {
        let fields = Fields::new("test", &[0x01, 0xfa, 0x00, 0x18, 0xfc, 0x78, 0x56, 0x34, 0x12], 0).unwrap();
        assert_eq!(fields.u8(0).unwrap(), 1);
        assert_eq!(fields.u16(1).unwrap(), 250);
        assert_eq!(fields.i16(3).unwrap(), -1000);
        assert_eq!(fields.u32(5).unwrap(), 0x1234_5678);
        assert!(fields.flag(0).unwrap());
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(
            Fields::new("test", &[0x00], 2).unwrap_err(),
            CodecError::TooShort { record: "test", needed: 2, actual: 1 }
        );
        let fields = Fields::new("test", &[0x00, 0x01], 0).unwrap();
        assert_eq!(
            fields.u16(1).unwrap_err(),
            CodecError::TooShort { record: "test", needed: 3, actual: 2 }
        );
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(21.456), 21.46);
        assert_eq!(round2(-3.0), -3.0);
    }
}
