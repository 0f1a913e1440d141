//! Little-endian cursor over an in-memory container

use crate::error::ContainerError;

pub(crate) type ParseResult<T> = std::result::Result<T, ContainerError>;

pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes consumed since `start`
    pub fn since(&self, start: usize) -> &'a [u8] {
        &self.buf[start..self.pos]
    }

    pub fn take(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(ContainerError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> ParseResult<()> {
        self.take(n).map(|_| ())
    }

    pub fn expect_magic(&mut self, magic: &[u8], expected: &'static str) -> ParseResult<()> {
        match self.take(magic.len()) {
            Ok(bytes) if bytes == magic => Ok(()),
            _ => Err(ContainerError::BadMagic { expected }),
        }
    }

    pub fn u8(&mut self) -> ParseResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> ParseResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> ParseResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self) -> ParseResult<i32> {
        Ok(self.u32()? as i32)
    }

    /// Length-prefixed field whose length must be non-negative
    pub fn len_i32(&mut self, what: &str) -> ParseResult<usize> {
        let n = self.i32()?;
        usize::try_from(n)
            .map_err(|_| ContainerError::Invalid(format!("negative {} length: {}", what, n)))
    }
}

/// Text up to the first NUL, lossily decoded
pub(crate) fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
