//! Hijacked raw-stream sessions: the upgrade handshake, the multiplexed
//! stdout/stderr demultiplexer, and the session object that owns both.

use std::io::{BufWriter, Error, ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::http::{self, Request};
use crate::io::pipe::{PipeReader, PipeWriter, pipe};
use crate::io::pushback::PushbackReader;
use crate::transport::{Connection, Stream};
use crate::{DockerError, Result};

pub(crate) const RAW_STREAM_CONTENT_TYPE: &str = "application/vnd.docker.raw-stream";
pub(crate) const MULTIPLEXED_STREAM_CONTENT_TYPE: &str = "application/vnd.docker.multiplexed-stream";

/// Frame header: `[stream_id:1][reserved:3][payload_len:4 big-endian]`.
const FRAME_HEADER_SIZE: usize = 8;
const STDIN_FRAME: u8 = 0;
const STDOUT_FRAME: u8 = 1;
const STDERR_FRAME: u8 = 2;

/// What to do with the stderr side of a hijacked stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrMode {
    /// Drop stderr frames
    Off,
    /// Deliver stderr through its own reader
    #[default]
    Separate,
    /// Interleave stderr frames into the stdout reader, in wire order
    MergedWithStdout,
}

/// Reads one frame, or `None` on a clean end-of-stream between frames.
fn read_frame(reader: &mut impl Read) -> std::io::Result<Option<(u8, Vec<u8>)>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];

    // One byte first, so EOF between frames is termination rather than an error
    if reader.read(&mut header[..1])? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::new(ErrorKind::UnexpectedEof, "stream ended in the middle of a frame header")
        } else {
            e
        }
    })?;

    let length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::new(
                ErrorKind::UnexpectedEof,
                format!("stream ended before {length} frame payload bytes arrived"),
            )
        } else {
            e
        }
    })?;

    Ok(Some((header[0], payload)))
}

/// Routes frame payloads into the stdout/stderr sinks until end-of-stream.
///
/// Payloads for an absent sink, for the mirrored-stdin channel, or for a sink
/// whose reader is gone are discarded; an unknown stream id is a hard error.
fn demux_frames(
    reader: &mut impl Read,
    stdout: Option<&PipeWriter>,
    stderr: Option<&PipeWriter>,
) -> std::io::Result<()> {
    while let Some((stream_id, payload)) = read_frame(reader)? {
        let sink = match stream_id {
            STDOUT_FRAME => stdout,
            STDERR_FRAME => stderr,
            STDIN_FRAME => None,
            other => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("got a frame with unknown stream id {other}"),
                ));
            }
        };

        if let Some(sink) = sink {
            // A failed send means the reader hung up; keep draining so the
            // sibling stream stays live
            let _ = sink.send(payload);
        }
    }

    Ok(())
}

/// Splits an already-buffered multiplexed stream (a non-follow logs body)
/// into its stdout and stderr bytes.
pub(crate) fn split_frames(mut bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    loop {
        match read_frame(&mut bytes) {
            Ok(Some((STDOUT_FRAME, payload))) => stdout.extend_from_slice(&payload),
            Ok(Some((STDERR_FRAME, payload))) => stderr.extend_from_slice(&payload),
            Ok(Some((STDIN_FRAME, _))) => {}
            Ok(Some((other, _))) => {
                return Err(DockerError::protocol(format!(
                    "got a frame with unknown stream id {other}"
                )));
            }
            Ok(None) => break,
            Err(e) => {
                return Err(DockerError::from_io_error_with_description(e, || {
                    "failed to split a multiplexed stream body".into()
                }));
            }
        }
    }

    Ok((stdout, stderr))
}

fn run_demux(
    mut reader: PushbackReader<Box<dyn Stream>>,
    stdout: Option<PipeWriter>,
    stderr: Option<PipeWriter>,
    closing: Arc<AtomicBool>,
) {
    match demux_frames(&mut reader, stdout.as_ref(), stderr.as_ref()) {
        Ok(()) => tracing::trace!("the multiplexed stream ended"),
        // The session is being torn down; whatever the socket reported is noise
        Err(_) if closing.load(Ordering::SeqCst) => {}
        Err(e) => tracing::debug!("the stream demultiplexer stopped: {e}"),
    }
    // Dropping the sinks here signals end-of-stream to both pipes
}

/// Sends an upgrade request on the connection and, on a 101 with the
/// multiplexed-stream content type, hands the connection over to a new
/// [StreamSession].
pub(crate) fn upgrade(
    mut conn: Connection,
    req: Request,
    stdin: bool,
    stdout: bool,
    stderr: StderrMode,
) -> Result<StreamSession> {
    let req = req
        .header("connection", "Upgrade")
        .header("upgrade", "tcp")
        .header("content-type", RAW_STREAM_CONTENT_TYPE)
        .header("accept", MULTIPLEXED_STREAM_CONTENT_TYPE);

    let response = match http::request(&mut conn, req) {
        Ok(response) => response,
        Err(e) => {
            let _ = conn.close();
            return Err(e);
        }
    };

    let content_type = response.header("content-type");
    if !response.is_upgraded() || content_type != Some(MULTIPLEXED_STREAM_CONTENT_TYPE) {
        let err = DockerError::Upgrade {
            status: response.status.as_u16(),
            content_type: content_type.map(str::to_owned),
        };
        let _ = conn.close();
        return Err(err);
    }

    StreamSession::new(conn, stdin, stdout, stderr)
}

/// A hijacked attach/exec connection.
///
/// The read half of the socket belongs to a background demultiplexer feeding
/// the `stdout`/`stderr` pipes; the write half is exposed as `stdin`. Closing
/// the session cancels the demultiplexer and releases everything; a second
/// close is a no-op.
pub struct StreamSession {
    stdin: Option<BufWriter<Box<dyn Stream>>>,
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
    socket: Box<dyn Stream>,
    closing: Arc<AtomicBool>,
    demux: Option<JoinHandle<()>>,
    closed: bool,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession").finish_non_exhaustive()
    }
}

impl StreamSession {
    fn new(conn: Connection, stdin: bool, stdout: bool, stderr: StderrMode) -> Result<StreamSession> {
        let (_, reader, writer, socket) = conn.into_parts();

        let (stdout_tx, stdout_rx) = if stdout {
            let (tx, rx) = pipe();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let (stderr_tx, stderr_rx) = match stderr {
            StderrMode::Separate => {
                let (tx, rx) = pipe();
                (Some(tx), Some(rx))
            }
            StderrMode::MergedWithStdout => (stdout_tx.clone(), None),
            StderrMode::Off => (None, None),
        };

        let closing = Arc::new(AtomicBool::new(false));
        let demux = thread::Builder::new()
            .name("docker-stream-demux".to_owned())
            .spawn({
                let closing = Arc::clone(&closing);
                move || run_demux(reader, stdout_tx, stderr_tx, closing)
            })
            .map_err(|e| {
                DockerError::from_io_error_with_description(e, || {
                    "failed to spawn the stream demultiplexer".into()
                })
            })?;

        Ok(StreamSession {
            stdin: stdin.then_some(writer),
            stdout: stdout_rx,
            stderr: stderr_rx,
            socket,
            closing,
            demux: Some(demux),
            closed: false,
        })
    }

    /// The write side of the hijacked socket, if stdin was requested.
    pub fn stdin(&mut self) -> Option<&mut dyn Write> {
        self.stdin.as_mut().map(|writer| writer as &mut dyn Write)
    }

    pub fn stdout(&mut self) -> Option<&mut PipeReader> {
        self.stdout.as_mut()
    }

    pub fn stderr(&mut self) -> Option<&mut PipeReader> {
        self.stderr.as_mut()
    }

    /// Moves the stdout reader out of the session, e.g. to hand it to another
    /// thread. The session keeps streaming into it.
    pub fn take_stdout(&mut self) -> Option<PipeReader> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<PipeReader> {
        self.stderr.take()
    }

    /// Flushes stdin and shuts down the socket's write half so the process on
    /// the other side observes end-of-file, while output keeps streaming.
    pub fn close_stdin(&mut self) -> Result<()> {
        let Some(mut stdin) = self.stdin.take() else {
            return Ok(());
        };

        let flushed = stdin.flush();
        drop(stdin);
        let shut_down = self.socket.shutdown_write();

        flushed.map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                "failed to flush stdin before closing it".into()
            })
        })?;
        shut_down.map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                "failed to shut down the write half of a hijacked connection".into()
            })
        })
    }

    /// Cancels the demultiplexer, closes the streams, and releases the
    /// connection. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.closing.store(true, Ordering::SeqCst);

        // Dropping the readers first unblocks a demultiplexer that is parked
        // on a full pipe
        drop(self.stdout.take());
        drop(self.stderr.take());

        let flushed = match self.stdin.take() {
            Some(mut stdin) => stdin.flush(),
            None => Ok(()),
        };
        let shut_down = self.socket.shutdown();

        if let Some(demux) = self.demux.take() {
            // The demultiplexer observes the shutdown at its next socket read
            let _ = demux.join();
        }

        tracing::trace!("closed a hijacked stream session");

        flushed.map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                "failed to flush stdin while closing a stream session".into()
            })
        })?;
        shut_down.map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                "failed to shut down a hijacked connection".into()
            })
        })
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("failed to close a stream session: {e}");
        }
    }
}
