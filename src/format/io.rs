use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, SealdexError};

/// Big-endian primitive writer over a positioned sink
pub trait DataOutput {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Absolute logical position of the next byte written
    fn position(&self) -> u64;

    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_bytes(&[v])
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    /// `{u32 length}{bytes}`
    fn write_byte_string(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| {
            SealdexError::InvalidInput(format!("byte string of {} bytes is too long", bytes.len()))
        })?;
        self.write_u32(len)?;
        self.write_bytes(bytes)
    }

    fn write_preamble(&mut self, preamble: &[u8]) -> Result<()> {
        self.write_bytes(preamble)
    }
}

/// Big-endian primitive reader
pub trait DataInput {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<()>;

    fn position(&self) -> u64;

    /// Bytes left before the end of the input
    fn remaining(&self) -> u64;

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_into(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_into(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn read_byte_string(&mut self) -> Result<Vec<u8>> {
        let at = self.position();
        let len = self.read_u32()? as u64;
        if len > self.remaining() {
            return Err(SealdexError::corruption(
                at,
                format!("byte string of {} bytes overruns input", len),
            ));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    fn read_string(&mut self) -> Result<String> {
        let at = self.position();
        let bytes = self.read_byte_string()?;
        String::from_utf8(bytes).map_err(|_| SealdexError::corruption(at, "name is not UTF-8"))
    }

    fn expect_preamble(&mut self, preamble: &[u8]) -> Result<()> {
        let at = self.position();
        if (preamble.len() as u64) > self.remaining() {
            return Err(SealdexError::corruption(
                at,
                format!("missing {} preamble", preamble.escape_ascii()),
            ));
        }
        let mut buf = vec![0u8; preamble.len()];
        self.read_into(&mut buf)?;
        if buf != preamble {
            return Err(SealdexError::corruption(
                at,
                format!(
                    "expected {} preamble, found {}",
                    preamble.escape_ascii(),
                    buf.escape_ascii()
                ),
            ));
        }
        Ok(())
    }
}

/// Whole segment file held in memory with an independent cursor.
///
/// Clones share the bytes and own their position.
#[derive(Clone, Debug)]
pub struct SegmentInput {
    data: Arc<[u8]>,
    pos: usize,
}

impl SegmentInput {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self::from_bytes(data))
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data: Arc::from(data),
            pos: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.len() {
            return Err(SealdexError::corruption(
                pos,
                format!("offset past end of {} byte file", self.len()),
            ));
        }
        self.pos = pos as usize;
        Ok(())
    }
}

impl DataInput for SegmentInput {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(SealdexError::corruption(
                self.pos as u64,
                format!(
                    "unexpected end of file reading {} bytes ({} available)",
                    buf.len(),
                    self.data.len() - self.pos
                ),
            ));
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn remaining(&self) -> u64 {
        (self.data.len() - self.pos) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecOutput(Vec<u8>);

    impl DataOutput for VecOutput {
        fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
            self.0.extend_from_slice(buf);
            Ok(())
        }

        fn position(&self) -> u64 {
            self.0.len() as u64
        }
    }

    #[test]
    fn test_big_endian_layout() {
        let mut out = VecOutput(Vec::new());
        out.write_u32(1).unwrap();
        out.write_u64(0x0102).unwrap();
        out.write_byte_string(b"ab").unwrap();
        assert_eq!(
            out.0,
            vec![0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 1, 2, 0, 0, 0, 2, b'a', b'b']
        );

        let mut input = SegmentInput::from_bytes(out.0);
        assert_eq!(input.read_u32().unwrap(), 1);
        assert_eq!(input.read_u64().unwrap(), 0x0102);
        assert_eq!(input.read_byte_string().unwrap(), b"ab");
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn test_truncated_read_is_corruption() {
        let mut input = SegmentInput::from_bytes(vec![0, 0, 1]);
        let err = input.read_u32().unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_oversized_byte_string() {
        let mut input = SegmentInput::from_bytes(vec![0, 0, 0, 9, b'x']);
        assert!(input.read_byte_string().unwrap_err().is_corruption());
    }

    #[test]
    fn test_preamble_mismatch() {
        let mut input = SegmentInput::from_bytes(b"Fielx".to_vec());
        let err = input.expect_preamble(b"Field").unwrap_err();
        assert!(matches!(err, SealdexError::FormatCorruption { offset: 0, .. }));
    }

    #[test]
    fn test_clone_has_independent_position() {
        let mut a = SegmentInput::from_bytes(vec![1, 2, 3]);
        a.read_u8().unwrap();
        let mut b = a.clone();
        assert_eq!(b.read_u8().unwrap(), 2);
        assert_eq!(a.position(), 1);
        assert!(a.seek(4).is_err());
    }
}
