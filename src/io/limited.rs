use std::io::Read;

/// A reader that exposes exactly `remaining` bytes of the underlying stream.
///
/// Used for `content-length` delimited response bodies. The underlying stream
/// is never closed by this wrapper, so the connection stays usable for the
/// next request once the body has been drained.
pub struct LimitedReader<'a, R: Read> {
    inner: &'a mut R,
    remaining: usize,
}

impl<'a, R: Read> LimitedReader<'a, R> {
    pub fn new(inner: &'a mut R, limit: usize) -> Self {
        LimitedReader {
            inner,
            remaining: limit,
        }
    }
}

impl<R: Read> Read for LimitedReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }

        let limit = self.remaining.min(buf.len());
        let filled_bytes = self.inner.read(&mut buf[..limit])?;
        self.remaining -= filled_bytes;

        Ok(filled_bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::*;

    #[test]
    fn stops_at_the_limit() {
        let mut source = Cursor::new(b"0123456789".to_vec());
        let mut reader = LimitedReader::new(&mut source, 4);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"0123");

        // The rest of the stream is untouched
        let mut rest = Vec::new();
        source.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"456789");
    }

    #[test]
    fn partial_reads_decrement_the_remaining_limit() {
        let mut source = Cursor::new(b"abcdef".to_vec());
        let mut reader = LimitedReader::new(&mut source, 5);

        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn zero_limit_is_immediate_end_of_stream() {
        let mut source = Cursor::new(b"data".to_vec());
        let mut reader = LimitedReader::new(&mut source, 0);

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
}
