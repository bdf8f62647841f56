use std::io::{BufReader, Read};

/// A buffered reader that supports returning already-read bytes to the stream.
///
/// The HTTP response parser needs a few bytes of look-ahead to recognize the
/// daemon's trailing empty chunk; bytes that turn out to belong to the next
/// response are pushed back verbatim and served by subsequent reads.
pub struct PushbackReader<R: Read> {
    inner: BufReader<R>,
    pushback: Vec<u8>,
}

impl<R: Read> PushbackReader<R> {
    const DEFAULT_BUF_SIZE: usize = 8_192;

    pub fn new(inner: R) -> Self {
        PushbackReader {
            inner: BufReader::with_capacity(Self::DEFAULT_BUF_SIZE, inner),
            pushback: Vec::new(),
        }
    }

    /// Returns the provided bytes to the stream. They will be served by the
    /// next reads, in the order they appear in `bytes`.
    pub fn unread(&mut self, bytes: &[u8]) {
        self.pushback.splice(..0, bytes.iter().copied());
    }

    /// The number of bytes that can be read without touching the underlying stream.
    pub fn buffered(&self) -> usize {
        self.pushback.len() + self.inner.buffer().len()
    }

    /// Reads a single byte, or `None` on end of stream.
    pub fn read_u8(&mut self) -> std::io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }
}

impl<R: Read> Read for PushbackReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.pushback.is_empty() {
            let n = self.pushback.len().min(buf.len());
            buf[..n].copy_from_slice(&self.pushback[..n]);
            self.pushback.drain(..n);
            return Ok(n);
        }
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::*;

    #[test]
    fn serves_pushed_back_bytes_first() {
        let mut reader = PushbackReader::new(Cursor::new(b"world".to_vec()));
        reader.unread(b"hello ");

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn nested_unread_preserves_stream_order() {
        let mut reader = PushbackReader::new(Cursor::new(b"".to_vec()));
        reader.unread(b"\r\n");
        reader.unread(b"0");

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"0\r\n");
    }

    #[test]
    fn buffered_counts_pushback_and_inner_buffer() {
        let mut reader = PushbackReader::new(Cursor::new(b"abc".to_vec()));
        assert_eq!(reader.buffered(), 0);

        // A read forces the inner buffer to fill
        let mut byte = [0u8; 1];
        reader.read(&mut byte).unwrap();
        assert_eq!(reader.buffered(), 2);

        reader.unread(&byte);
        assert_eq!(reader.buffered(), 3);
    }
}
