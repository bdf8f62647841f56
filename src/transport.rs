//! Dialing and ownership of the byte channel between the client and the
//! Docker daemon.

use std::io::{BufWriter, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;

use crate::io::pushback::PushbackReader;
use crate::{DockerError, Result};

/// Where the daemon listens when nobody says otherwise.
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// A bidirectional byte channel to the daemon.
///
/// Implemented for [UnixStream]; other transports can be plugged in through
/// [Client::with_factory]. Cloning duplicates the handle to the same channel
/// so the read and write halves can be owned independently.
pub trait Stream: Read + Write + Send {
    fn try_clone(&self) -> std::io::Result<Box<dyn Stream>>;
    fn shutdown(&self) -> std::io::Result<()>;
    fn shutdown_write(&self) -> std::io::Result<()>;
}

impl Stream for UnixStream {
    fn try_clone(&self) -> std::io::Result<Box<dyn Stream>> {
        UnixStream::try_clone(self).map(|socket| Box::new(socket) as Box<dyn Stream>)
    }

    fn shutdown(&self) -> std::io::Result<()> {
        UnixStream::shutdown(self, Shutdown::Both)
    }

    fn shutdown_write(&self) -> std::io::Result<()> {
        UnixStream::shutdown(self, Shutdown::Write)
    }
}

type DialFn = dyn Fn() -> Result<Box<dyn Stream>> + Send + Sync;

/// An immutable factory that produces fresh channels to one daemon on demand,
/// labeled with the logical host used for the `host` header.
///
/// Cloning a client is cheap and shares the factory.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("host", &self.inner.host).finish_non_exhaustive()
    }
}

struct ClientInner {
    host: String,
    dial: Box<DialFn>,
}

impl Client {
    /// Creates a client from a URI. Only the `unix` scheme is recognized; a
    /// bare path is treated as a Unix socket path.
    pub fn new(uri: impl AsRef<str>) -> Result<Client> {
        let uri = uri.as_ref();
        match uri.split_once("://") {
            Some(("unix", path)) => Ok(Client::unix(path)),
            Some((scheme, _)) => Err(DockerError::Unsupported(
                format!("unknown client URI scheme '{scheme}'").into(),
            )),
            None => Ok(Client::unix(uri)),
        }
    }

    /// A client for the Unix socket at `path`.
    pub fn unix(path: impl AsRef<Path>) -> Client {
        let path = path.as_ref().to_path_buf();
        Client::with_factory("localhost", move || {
            let socket = UnixStream::connect(&path).map_err(|e| {
                DockerError::from_io_error_with_description(e, || {
                    "failed to connect to the Docker socket".into()
                })
            })?;
            Ok(Box::new(socket) as Box<dyn Stream>)
        })
    }

    /// The extension point for arbitrary transports: `dial` must produce a
    /// fresh connected channel on every call.
    pub fn with_factory(
        host: impl Into<String>,
        dial: impl Fn() -> Result<Box<dyn Stream>> + Send + Sync + 'static,
    ) -> Client {
        Client {
            inner: Arc::new(ClientInner {
                host: host.into(),
                dial: Box::new(dial),
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Opens a new connection to the daemon.
    pub fn dial(&self) -> Result<Connection> {
        let socket = (self.inner.dial)()?;
        Connection::new(self.clone(), socket)
    }
}

impl Default for Client {
    fn default() -> Self {
        Client::unix(DEFAULT_DOCKER_SOCKET)
    }
}

/// An open channel to the daemon with buffered read and write halves.
///
/// A connection serves at most one in-flight HTTP request, and once it has
/// been upgraded to a raw stream it serves no further HTTP traffic at all;
/// [Connection::try_clone] dials a sibling from the same client for that case.
pub struct Connection {
    client: Client,
    reader: PushbackReader<Box<dyn Stream>>,
    writer: BufWriter<Box<dyn Stream>>,
    socket: Box<dyn Stream>,
}

impl Connection {
    fn new(client: Client, socket: Box<dyn Stream>) -> Result<Connection> {
        let read_half = socket.try_clone().map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                "failed to split off the read half of a connection".into()
            })
        })?;
        let write_half = socket.try_clone().map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                "failed to split off the write half of a connection".into()
            })
        })?;

        tracing::trace!(host = client.host(), "dialed a new Docker API connection");

        Ok(Connection {
            client,
            reader: PushbackReader::new(read_half),
            writer: BufWriter::new(write_half),
            socket,
        })
    }

    /// The logical host label for the `host` header.
    pub fn host(&self) -> &str {
        self.client.host()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Dials a fresh sibling connection from the same client.
    pub fn try_clone(&self) -> Result<Connection> {
        self.client.dial()
    }

    /// Closes the connection. The write half is flushed and the socket shut
    /// down; each step runs even if an earlier one failed.
    pub fn close(mut self) -> Result<()> {
        let flushed = self.writer.flush();
        let shut_down = self.socket.shutdown();

        tracing::trace!(host = self.client.host(), "closed a Docker API connection");

        flushed.map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                "failed to flush a connection on close".into()
            })
        })?;
        shut_down.map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                "failed to shut down a connection's socket".into()
            })
        })
    }

    pub(crate) fn reader_mut(&mut self) -> &mut PushbackReader<Box<dyn Stream>> {
        &mut self.reader
    }

    pub(crate) fn writer_mut(&mut self) -> &mut BufWriter<Box<dyn Stream>> {
        &mut self.writer
    }

    /// Tears the connection apart for a protocol upgrade: the read half, the
    /// write half, and the raw socket handle used for shutdown.
    pub(crate) fn into_parts(
        self,
    ) -> (
        Client,
        PushbackReader<Box<dyn Stream>>,
        BufWriter<Box<dyn Stream>>,
        Box<dyn Stream>,
    ) {
        (self.client, self.reader, self.writer, self.socket)
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockStream;
    use super::*;
    use crate::DockerError;

    #[test]
    fn rejects_unknown_uri_schemes() {
        let err = Client::new("tcp://127.0.0.1:2375").unwrap_err();
        assert!(matches!(err, DockerError::Unsupported(_)));
    }

    #[test]
    fn unix_clients_are_labeled_localhost() {
        let client = Client::new("unix:///var/run/docker.sock").unwrap();
        assert_eq!(client.host(), "localhost");

        // A bare path works too
        let client = Client::new("/var/run/docker.sock").unwrap();
        assert_eq!(client.host(), "localhost");
    }

    #[test]
    fn close_shuts_the_socket_down() {
        let stream = MockStream::new(b"");
        let conn = stream.client("docker.test").dial().unwrap();
        conn.close().unwrap();

        assert_eq!(stream.shutdowns(), 1);
    }

    #[test]
    fn try_clone_dials_a_sibling_from_the_same_client() {
        let stream = MockStream::new(b"");
        let conn = stream.client("docker.test").dial().unwrap();
        let sibling = conn.try_clone().unwrap();

        assert_eq!(sibling.host(), "docker.test");
    }
}
