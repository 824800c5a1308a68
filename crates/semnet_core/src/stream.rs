//! Byte streams used to stage and read link content.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

/// An owned, seekable byte stream.
///
/// Writes at the current position overwrite existing bytes and extend the
/// stream past its end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentStream {
    bytes: Vec<u8>,
    position: usize,
}

impl ContentStream {
    /// Creates an empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stream positioned at the start of `bytes`.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            position: 0,
        }
    }

    /// Creates a stream holding a UTF-8 string.
    #[must_use]
    pub fn from_str_content(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    /// Total length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the stream holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current read/write position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns true once the position reached the end.
    #[must_use]
    pub fn eof(&self) -> bool {
        self.position >= self.bytes.len()
    }

    /// Whole content, independent of the position.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the stream, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Content as UTF-8, if valid.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

impl From<Arc<[u8]>> for ContentStream {
    fn from(bytes: Arc<[u8]>) -> Self {
        Self::from_bytes(bytes.to_vec())
    }
}

impl From<&[u8]> for ContentStream {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl Read for ContentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.bytes.get(self.position..).unwrap_or_default();
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

impl Write for ContentStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let end = self.position + buf.len();
        if end > self.bytes.len() {
            self.bytes.resize(end, 0);
        }
        self.bytes[self.position..end].copy_from_slice(buf);
        self.position = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for ContentStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::End(delta) => self.bytes.len() as i128 + i128::from(delta),
            SeekFrom::Current(delta) => self.position as i128 + i128::from(delta),
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of content stream",
            ));
        }
        self.position = usize::try_from(target)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek overflow"))?;
        Ok(self.position as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_to_eof() {
        let mut stream = ContentStream::from_str_content("semantic");
        let mut head = [0u8; 3];
        stream.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"sem");
        assert_eq!(stream.position(), 3);
        assert!(!stream.eof());

        let mut rest = String::new();
        stream.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "antic");
        assert!(stream.eof());
    }

    #[test]
    fn write_overwrites_and_extends() {
        let mut stream = ContentStream::from_bytes(b"abcdef".to_vec());
        stream.seek(SeekFrom::Start(4)).unwrap();
        stream.write_all(b"XYZ").unwrap();
        assert_eq!(stream.as_bytes(), b"abcdXYZ");
        assert_eq!(stream.len(), 7);
    }

    #[test]
    fn seek_variants() {
        let mut stream = ContentStream::from_bytes(vec![0; 10]);
        assert_eq!(stream.seek(SeekFrom::End(-2)).unwrap(), 8);
        assert_eq!(stream.seek(SeekFrom::Current(-3)).unwrap(), 5);
        assert!(stream.seek(SeekFrom::Current(-6)).is_err());
        assert_eq!(stream.seek(SeekFrom::Start(20)).unwrap(), 20);
        assert!(stream.eof());
    }

    #[test]
    fn read_past_end_yields_nothing() {
        let mut stream = ContentStream::from_bytes(vec![1, 2]);
        stream.seek(SeekFrom::Start(5)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }
}
