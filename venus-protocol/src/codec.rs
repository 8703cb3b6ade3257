use crate::WireError;

/// Sequential little-endian reader over a borrowed payload slice.
///
/// Every `read_*` call advances an internal cursor and bounds-checks
/// against the slice length; there is no allocation on this path, per
/// the decoder's borrow-instead-of-copy requirement.
pub struct LeReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let available = self.bytes.len() - self.pos;
        if available < len {
            return Err(WireError::Truncated {
                offset: self.pos,
                needed: len,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    /// Confirms the reader consumed exactly the payload it was given.
    ///
    /// Handlers call this after decoding their fixed-size struct so a
    /// guest that pads a command with garbage bytes is still caught,
    /// rather than silently ignored.
    pub fn finish(self) -> Result<(), WireError> {
        let extra = self.bytes.len() - self.pos;
        if extra != 0 {
            return Err(WireError::TrailingBytes { extra });
        }
        Ok(())
    }
}

/// Sequential little-endian writer, used to encode reply structures
/// into the ring's extra region or a reply frame.
#[derive(Default)]
pub struct LeWriter {
    bytes: Vec<u8>,
}

impl LeWriter {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars() {
        let mut w = LeWriter::new();
        w.write_u32(0xdead_beef).write_u64(0x1122_3344_5566_7788);
        let bytes = w.into_bytes();

        let mut r = LeReader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_u64().unwrap(), 0x1122_3344_5566_7788);
        r.finish().unwrap();
    }

    #[test]
    fn truncated_read_reports_offset() {
        let bytes = [1u8, 2, 3];
        let mut r = LeReader::new(&bytes);
        let err = r.read_u32().unwrap_err();
        assert_eq!(
            err,
            WireError::Truncated {
                offset: 0,
                needed: 4,
                available: 3
            }
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        let bytes = [0u8; 8];
        let mut r = LeReader::new(&bytes);
        r.read_u32().unwrap();
        assert_eq!(r.finish().unwrap_err(), WireError::TrailingBytes { extra: 4 });
    }
}
