//! A dependency-light client for the Docker Engine API that talks to the daemon
//! directly over its Unix socket, including hijacked attach/exec streams.

use std::borrow::Cow;

use thiserror::Error;

pub mod api;
pub mod http;
mod io;
pub mod names;
pub mod stream;
pub mod transport;

pub use api::Docker;
pub use http::{Body, QueryValue, Request, Response, ResponseBody};
pub use io::pipe::PipeReader;
pub use stream::{StderrMode, StreamSession};
pub use transport::{Client, Connection, Stream};

pub type Result<T> = std::result::Result<T, DockerError>;

#[derive(Error, Debug)]
pub enum DockerError {
    #[error("failed to perform an I/O operation: {description}")]
    Io {
        description: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed data on the Docker API connection: {description}")]
    Protocol { description: Cow<'static, str> },
    #[error("failed to process JSON {description}")]
    Json {
        description: Cow<'static, str>,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported configuration: {0}")]
    Unsupported(Cow<'static, str>),
    #[error("unexpected status {status} from the Docker daemon: {message}")]
    UnexpectedStatus {
        status: u16,
        message: String,
        body: Option<serde_json::Value>,
    },
    #[error("failed to switch protocols: got status {status} and content-type {content_type:?}")]
    Upgrade {
        status: u16,
        content_type: Option<String>,
    },
}

impl DockerError {
    fn from_io_error_with_description(
        source: std::io::Error,
        description: impl Fn() -> Cow<'static, str>,
    ) -> DockerError {
        DockerError::Io {
            description: description(),
            source,
        }
    }

    fn from_serde_error_with_description(
        source: serde_json::Error,
        description: impl Fn() -> Cow<'static, str>,
    ) -> DockerError {
        DockerError::Json {
            description: description(),
            source,
        }
    }

    fn protocol(description: impl Into<Cow<'static, str>>) -> DockerError {
        DockerError::Protocol {
            description: description.into(),
        }
    }
}
