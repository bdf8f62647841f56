use std::io::{Error, ErrorKind, Read, Write};

use super::pushback::PushbackReader;
use super::util::{add_base16_digit, hex_digit_to_value};

/// The spurious empty chunk the daemon likes to append after a well-formed
/// chunked body.
const TRAILING_EMPTY_CHUNK: &[u8] = b"0\r\n\r\n";

/// How much payload a [ChunkedWriter] accumulates before emitting a chunk.
/// Small enough to keep latency low, large enough to keep chunk overhead low.
const CHUNK_BUFFER_SIZE: usize = 256;

/// The inner state machine of the [ChunkedReader].
#[derive(Clone, Copy)]
enum ChunkState {
    /// Expecting a chunk size line
    ChunkSize,
    /// Inside a chunk with this many payload bytes left
    InChunk(usize),
    /// Encountered the zero-length chunk
    Done,
}

/// A reader that decodes an HTTP chunked transfer encoded body.
///
/// After the terminal chunk it absorbs the daemon's trailing empty chunk when
/// its bytes are already buffered, pushing any partial match back so the next
/// response on the connection stays byte-aligned. The underlying stream is
/// never closed.
pub struct ChunkedReader<'a, R: Read> {
    inner: &'a mut PushbackReader<R>,
    state: ChunkState,
}

impl<'a, R: Read> ChunkedReader<'a, R> {
    pub fn new(inner: &'a mut PushbackReader<R>) -> Self {
        ChunkedReader {
            inner,
            state: ChunkState::ChunkSize,
        }
    }

    /// Parses a `HEX(len)\r\n` chunk size line.
    fn read_chunk_size(&mut self) -> std::io::Result<usize> {
        let mut size = 0;
        let mut digits = 0;

        loop {
            let byte = self.read_byte("an HTTP chunk size")?;
            if byte == b'\r' {
                break;
            }

            let digit = hex_digit_to_value(byte).ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidData,
                    format!("got an invalid digit {byte:#04x} in an HTTP chunk size"),
                )
            })?;
            size = add_base16_digit(size, digit);
            digits += 1;
        }

        if digits == 0 {
            return Err(Error::new(ErrorKind::InvalidData, "got an empty HTTP chunk size line"));
        }

        let byte = self.read_byte("an HTTP chunk size")?;
        if byte != b'\n' {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("expected LF after an HTTP chunk size, got {byte:#04x}"),
            ))
        }

        Ok(size)
    }

    /// Requires the two CRLF bytes that delimit chunk payloads.
    fn expect_crlf(&mut self, context: &str) -> std::io::Result<()> {
        let mut delimiter = [0u8; 2];
        self.inner.read_exact(&mut delimiter)?;
        if &delimiter != b"\r\n" {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("expected CRLF {context}, got {delimiter:02x?}"),
            ));
        }
        Ok(())
    }

    /// Consumes the daemon's trailing empty chunk if its bytes are already
    /// buffered. A partial match is pushed back verbatim.
    fn absorb_trailing_empty_chunk(&mut self) -> std::io::Result<()> {
        let mut seen = [0u8; TRAILING_EMPTY_CHUNK.len()];
        let mut matched = 0;

        while matched < TRAILING_EMPTY_CHUNK.len() && self.inner.buffered() > 0 {
            let Some(byte) = self.inner.read_u8()? else {
                break;
            };
            seen[matched] = byte;
            if byte != TRAILING_EMPTY_CHUNK[matched] {
                // Not the quirk; these bytes belong to the next response
                self.inner.unread(&seen[..=matched]);
                return Ok(());
            }
            matched += 1;
        }

        if matched > 0 && matched < TRAILING_EMPTY_CHUNK.len() {
            // The rest of the quirk may arrive later; the status line parser
            // deals with a leaked empty chunk on its own
            self.inner.unread(&seen[..matched]);
        }

        Ok(())
    }

    fn read_byte(&mut self, context: &str) -> std::io::Result<u8> {
        self.inner.read_u8()?.ok_or_else(|| {
            Error::new(
                ErrorKind::UnexpectedEof,
                format!("stream ended while reading {context}"),
            )
        })
    }
}

impl<R: Read> Read for ChunkedReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.state {
                ChunkState::Done => return Ok(0),
                ChunkState::ChunkSize => {
                    let size = self.read_chunk_size()?;
                    if size == 0 {
                        self.expect_crlf("after the terminal HTTP chunk")?;
                        self.absorb_trailing_empty_chunk()?;
                        self.state = ChunkState::Done;
                        return Ok(0);
                    }
                    self.state = ChunkState::InChunk(size);
                }
                ChunkState::InChunk(remaining) => {
                    let limit = remaining.min(buf.len());
                    let filled_bytes = self.inner.read(&mut buf[..limit])?;
                    if filled_bytes == 0 {
                        return Err(Error::new(
                            ErrorKind::UnexpectedEof,
                            format!("stream ended with {remaining} bytes of an HTTP chunk outstanding"),
                        ));
                    }

                    if filled_bytes == remaining {
                        self.expect_crlf("after an HTTP chunk payload")?;
                        self.state = ChunkState::ChunkSize;
                    } else {
                        self.state = ChunkState::InChunk(remaining - filled_bytes);
                    }

                    return Ok(filled_bytes);
                }
            }
        }
    }
}

/// A writer that encodes its input as an HTTP chunked transfer encoded body.
///
/// Writes accumulate into a fixed-size buffer and are emitted as one chunk on
/// overflow or flush. [ChunkedWriter::finish] emits the terminal chunk; the
/// underlying stream is left open and unflushed for the caller.
pub struct ChunkedWriter<'a, W: Write> {
    inner: &'a mut W,
    buf: Vec<u8>,
}

impl<'a, W: Write> ChunkedWriter<'a, W> {
    pub fn new(inner: &'a mut W) -> Self {
        ChunkedWriter {
            inner,
            buf: Vec::with_capacity(CHUNK_BUFFER_SIZE),
        }
    }

    /// Flushes any buffered payload and emits the terminal zero-length chunk.
    pub fn finish(mut self) -> std::io::Result<()> {
        self.emit_chunk()?;
        self.inner.write_all(b"0\r\n\r\n")
    }

    fn emit_chunk(&mut self) -> std::io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }

        write!(self.inner, "{:x}\r\n", self.buf.len())?;
        self.inner.write_all(&self.buf)?;
        self.inner.write_all(b"\r\n")?;
        self.buf.clear();

        Ok(())
    }
}

impl<W: Write> Write for ChunkedWriter<'_, W> {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        if self.buf.len() == CHUNK_BUFFER_SIZE {
            self.emit_chunk()?;
        }

        let accepted = (CHUNK_BUFFER_SIZE - self.buf.len()).min(data.len());
        self.buf.extend_from_slice(&data[..accepted]);

        Ok(accepted)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.emit_chunk()?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn reader_over(input: &[u8]) -> PushbackReader<Cursor<Vec<u8>>> {
        PushbackReader::new(Cursor::new(input.to_vec()))
    }

    #[test]
    fn decodes_a_multi_chunk_body() {
        let mut source = reader_over(b"6\r\nfoobar\r\n3\r\nbaz\r\n0\r\n\r\n$");

        let mut body = Vec::new();
        ChunkedReader::new(&mut source).read_to_end(&mut body).unwrap();
        assert_eq!(body, b"foobarbaz");

        // The byte after the body is untouched
        assert_eq!(source.read_u8().unwrap(), Some(b'$'));
    }

    #[test]
    fn absorbs_the_trailing_empty_chunk() {
        let mut source = reader_over(b"3\r\nfoo\r\n0\r\n\r\n0\r\n\r\n$");

        let mut body = Vec::new();
        ChunkedReader::new(&mut source).read_to_end(&mut body).unwrap();
        assert_eq!(body, b"foo");

        assert_eq!(source.read_u8().unwrap(), Some(b'$'));
    }

    #[test]
    fn pushes_back_a_partial_quirk_match() {
        let mut source = reader_over(b"3\r\nfoo\r\n0\r\n\r\n0\r");

        let mut body = Vec::new();
        ChunkedReader::new(&mut source).read_to_end(&mut body).unwrap();
        assert_eq!(body, b"foo");

        // The two consumed bytes are back on the stream
        let mut rest = Vec::new();
        source.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"0\r");
    }

    #[test]
    fn preserves_bytes_that_are_not_the_quirk() {
        let mut source = reader_over(b"3\r\nfoo\r\n0\r\n\r\nHTTP");

        let mut body = Vec::new();
        ChunkedReader::new(&mut source).read_to_end(&mut body).unwrap();
        assert_eq!(body, b"foo");

        let mut rest = Vec::new();
        source.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"HTTP");
    }

    #[test]
    fn rejects_an_invalid_chunk_size_digit() {
        let mut source = reader_over(b"xy\r\nfoo\r\n");

        let err = ChunkedReader::new(&mut source).read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_a_missing_payload_delimiter() {
        let mut source = reader_over(b"3\r\nfooXX0\r\n\r\n");

        let err = ChunkedReader::new(&mut source).read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn reports_a_truncated_chunk() {
        let mut source = reader_over(b"a\r\nfoo");

        let err = ChunkedReader::new(&mut source).read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn encodes_a_small_body_as_one_chunk() {
        let mut out = Vec::new();
        let mut writer = ChunkedWriter::new(&mut out);
        writer.write_all(b"0123456789").unwrap();
        writer.finish().unwrap();

        assert_eq!(out, b"a\r\n0123456789\r\n0\r\n\r\n");
    }

    #[test]
    fn splits_a_large_body_on_buffer_overflow() {
        let payload = vec![b'x'; CHUNK_BUFFER_SIZE + 44];

        let mut out = Vec::new();
        let mut writer = ChunkedWriter::new(&mut out);
        writer.write_all(&payload).unwrap();
        writer.finish().unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"100\r\n");
        expected.extend_from_slice(&payload[..CHUNK_BUFFER_SIZE]);
        expected.extend_from_slice(b"\r\n2c\r\n");
        expected.extend_from_slice(&payload[CHUNK_BUFFER_SIZE..]);
        expected.extend_from_slice(b"\r\n0\r\n\r\n");
        assert_eq!(out, expected);
    }

    #[test]
    fn round_trips_arbitrary_bytes() {
        let payload: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();

        let mut encoded = Vec::new();
        let mut writer = ChunkedWriter::new(&mut encoded);
        writer.write_all(&payload).unwrap();
        writer.finish().unwrap();

        let mut source = PushbackReader::new(Cursor::new(encoded));
        let mut decoded = Vec::new();
        ChunkedReader::new(&mut source).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, payload);
    }
}
