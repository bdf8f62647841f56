use std::io::Read;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

/// How many byte buffers a pipe holds before the producer blocks. Plenty for
/// the demultiplexer, which paces itself on the socket anyway.
const PIPE_CAPACITY: usize = 256;

/// Creates a bounded single-producer/single-consumer byte pipe.
///
/// The consumer side is a readable byte stream. Dropping every [PipeWriter]
/// marks end-of-stream: reads drain the remaining buffers and then report EOF.
/// Dropping the [PipeReader] makes further producer writes fail.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = sync_channel(PIPE_CAPACITY);
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            current: Vec::new(),
            pos: 0,
        },
    )
}

/// The producer side of a [pipe]. Cloneable so two frame streams can feed one
/// sink when they are merged.
#[derive(Clone)]
pub struct PipeWriter {
    tx: SyncSender<Vec<u8>>,
}

impl PipeWriter {
    /// Appends a buffer to the pipe, blocking while the pipe is full.
    ///
    /// Fails if the consumer side is gone.
    pub fn send(&self, buf: Vec<u8>) -> Result<(), ClosedPipe> {
        if buf.is_empty() {
            return Ok(());
        }
        self.tx.send(buf).map_err(|_| ClosedPipe)
    }

}

/// The pipe was closed from the consumer side.
#[derive(Debug, PartialEq, Eq)]
pub struct ClosedPipe;

/// The consumer side of a [pipe].
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.pos < self.current.len() {
                let n = (self.current.len() - self.pos).min(buf.len());
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }

            // Blocks until the producer delivers the next buffer or hangs up
            match self.rx.recv() {
                Ok(next) => {
                    self.current = next;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
    }
}
