//! Writing requests to and reading responses from the wire.

use std::io::{ErrorKind, Read, Write};

use flate2::read::GzDecoder;
use http::StatusCode;
use httparse::{EMPTY_HEADER, Status};
use indexmap::IndexMap;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde_json::Value;

use super::{API_VERSION_PREFIX, Body, QueryValue, Request, Response, ResponseBody};
use crate::io::chunked::{ChunkedReader, ChunkedWriter};
use crate::io::limited::LimitedReader;
use crate::io::pushback::PushbackReader;
use crate::names;
use crate::transport::{Connection, Stream};
use crate::{DockerError, Result};

/// The daemon's spurious empty chunk, as it appears when it leaks in front of
/// the next response's status line.
const LEAKED_EMPTY_CHUNK: &[u8] = b"0\r\n\r\n";

/// Docker responses carry few headers; this leaves generous room.
const MAX_RESPONSE_HEADERS: usize = 32;

/// Bytes that get percent-encoded in query parameter names and values.
const QUERY: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'=')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'{')
    .add(b'}');

impl QueryValue {
    fn encode(&self) -> Result<String> {
        match self {
            QueryValue::Str(value) => Ok(utf8_percent_encode(value, QUERY).to_string()),
            QueryValue::Int(value) => Ok(value.to_string()),
            QueryValue::Bool(value) => Ok(value.to_string()),
            QueryValue::Json(value) => {
                let compact = serde_json::to_string(value).map_err(|e| {
                    DockerError::from_serde_error_with_description(e, || "query parameter".into())
                })?;
                Ok(utf8_percent_encode(&compact, QUERY).to_string())
            }
        }
    }
}

/// Writes the request line, headers, and chunk-encoded body to the connection
/// and flushes it.
///
/// The transport owns `transfer-encoding` and the JSON `content-type`; the
/// connection's host is merged in only when the caller did not set one.
pub(crate) fn write_request(conn: &mut Connection, req: Request) -> Result<()> {
    let Request {
        method,
        path,
        query,
        mut headers,
        body,
        ..
    } = req;

    if body.is_some() {
        headers.insert("transfer-encoding".to_owned(), "chunked".to_owned());
    }
    if matches!(body, Some(Body::Json(_))) && !headers.contains_key("content-type") {
        headers.insert(
            "content-type".to_owned(),
            "application/json; charset=utf-8".to_owned(),
        );
    }
    if !headers.contains_key("host") {
        headers.insert("host".to_owned(), conn.host().to_owned());
    }

    let query_string = encode_query(&query)?;

    let writer = conn.writer_mut();
    write!(writer, "{method} {API_VERSION_PREFIX}{path}{query_string} HTTP/1.1\r\n").map_err(|e| {
        DockerError::from_io_error_with_description(e, || "failed to write the HTTP request line".into())
    })?;
    for (name, value) in &headers {
        write!(writer, "{name}: {value}\r\n").map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                format!("failed to write the '{name}' HTTP header").into()
            })
        })?;
    }
    write!(writer, "\r\n").map_err(|e| {
        DockerError::from_io_error_with_description(e, || {
            "failed to write the empty line after HTTP headers".into()
        })
    })?;

    if let Some(body) = body {
        write_body(writer, body)?;
    }

    writer.flush().map_err(|e| {
        DockerError::from_io_error_with_description(e, || "failed to flush an HTTP request".into())
    })
}

fn encode_query(query: &IndexMap<String, QueryValue>) -> Result<String> {
    if query.is_empty() {
        return Ok(String::new());
    }

    let mut out = String::from("?");
    for (i, (name, value)) in query.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(&utf8_percent_encode(name, QUERY).to_string());
        out.push('=');
        out.push_str(&value.encode()?);
    }

    Ok(out)
}

fn write_body<W: Write>(writer: &mut W, body: Body) -> Result<()> {
    let mut chunked = ChunkedWriter::new(writer);

    match body {
        Body::Json(value) => {
            serde_json::to_writer(&mut chunked, &names::to_docker(value)).map_err(|e| {
                DockerError::from_serde_error_with_description(e, || "request body".into())
            })?;
        }
        Body::Text(text) => {
            chunked.write_all(text.as_bytes()).map_err(|e| {
                DockerError::from_io_error_with_description(e, || {
                    "failed to write an HTTP request body".into()
                })
            })?;
        }
        Body::Bytes(bytes) => {
            chunked.write_all(&bytes).map_err(|e| {
                DockerError::from_io_error_with_description(e, || {
                    "failed to write an HTTP request body".into()
                })
            })?;
        }
        Body::Stream(mut reader) => {
            std::io::copy(&mut reader, &mut chunked).map_err(|e| {
                DockerError::from_io_error_with_description(e, || {
                    "failed to copy a stream into an HTTP request body".into()
                })
            })?;
        }
    }

    chunked.finish().map_err(|e| {
        DockerError::from_io_error_with_description(e, || {
            "failed to write the terminal HTTP chunk".into()
        })
    })
}

/// Reads one response from the connection, leaving the stream positioned one
/// byte past the end of the body (the daemon's trailing empty chunk included).
pub(crate) fn read_response(
    conn: &mut Connection,
    expect_json_seq: bool,
    head_only: bool,
) -> Result<Response> {
    let head = read_head(conn.reader_mut())?;

    let mut parsed_headers = [EMPTY_HEADER; MAX_RESPONSE_HEADERS];
    let mut parsed = httparse::Response::new(&mut parsed_headers);
    let code = match parsed.parse(&head) {
        Ok(Status::Complete(_)) => parsed
            .code
            .ok_or_else(|| DockerError::protocol("parsed an HTTP response without a status code"))?,
        Ok(Status::Partial) => return Err(DockerError::protocol("got a truncated HTTP response head")),
        Err(e) => {
            return Err(DockerError::protocol(format!(
                "failed to parse an HTTP response head ({e}): {:?}",
                String::from_utf8_lossy(&head)
            )));
        }
    };
    let status = StatusCode::from_u16(code)
        .map_err(|_| DockerError::protocol(format!("got an invalid HTTP status code {code}")))?;

    let mut headers = IndexMap::with_capacity(parsed.headers.len());
    for header in parsed.headers.iter() {
        headers.insert(
            header.name.to_ascii_lowercase(),
            String::from_utf8_lossy(header.value).into_owned(),
        );
    }

    if status == StatusCode::SWITCHING_PROTOCOLS {
        // The socket now carries a different protocol; the body is not ours
        return Ok(Response {
            status,
            headers,
            body: ResponseBody::None,
            upgraded: true,
        });
    }

    let mut raw = if head_only {
        Vec::new()
    } else {
        read_raw_body(conn, &headers)?
    };

    if headers
        .get("content-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
    {
        let mut decoded = Vec::new();
        GzDecoder::new(raw.as_slice()).read_to_end(&mut decoded).map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                "failed to decompress a gzipped response body".into()
            })
        })?;
        raw = decoded;
    }

    let body = decode_body(raw, &headers, expect_json_seq)?;

    Ok(Response {
        status,
        headers,
        body,
        upgraded: false,
    })
}

/// Accumulates status line and headers up to the blank line. A leaked empty
/// chunk from the previous response is consumed and the read restarted.
fn read_head(reader: &mut PushbackReader<Box<dyn Stream>>) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(256);

    loop {
        let byte = reader.read_u8().map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                "failed to read an HTTP response head".into()
            })
        })?;
        let Some(byte) = byte else {
            if head.is_empty() {
                return Err(DockerError::from_io_error_with_description(
                    std::io::Error::new(ErrorKind::UnexpectedEof, "end of stream"),
                    || "connection closed before an HTTP response".into(),
                ));
            }
            return Err(DockerError::protocol(format!(
                "stream ended in the middle of an HTTP response head after {} bytes",
                head.len()
            )));
        };

        head.push(byte);

        if head.as_slice() == LEAKED_EMPTY_CHUNK {
            // The previous response's trailing empty chunk leaked this far
            head.clear();
            continue;
        }
        if head.ends_with(b"\r\n\r\n") {
            return Ok(head);
        }
    }
}

fn read_raw_body(conn: &mut Connection, headers: &IndexMap<String, String>) -> Result<Vec<u8>> {
    let mut raw = Vec::new();

    let chunked = headers
        .get("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));

    if chunked {
        ChunkedReader::new(conn.reader_mut()).read_to_end(&mut raw).map_err(|e| {
            DockerError::from_io_error_with_description(e, || {
                "failed to read a chunked HTTP response body".into()
            })
        })?;
    } else {
        let length = match headers.get("content-length") {
            Some(value) => value.trim().parse::<usize>().map_err(|_| {
                DockerError::protocol(format!("got an invalid content-length header: '{value}'"))
            })?,
            None => 0,
        };

        if length > 0 {
            LimitedReader::new(conn.reader_mut(), length)
                .read_to_end(&mut raw)
                .map_err(|e| {
                    DockerError::from_io_error_with_description(e, || {
                        "failed to read an HTTP response body".into()
                    })
                })?;
            if raw.len() < length {
                return Err(DockerError::protocol(format!(
                    "response body ended after {} of {length} bytes",
                    raw.len()
                )));
            }
        }
    }

    Ok(raw)
}

fn decode_body(
    raw: Vec<u8>,
    headers: &IndexMap<String, String>,
    expect_json_seq: bool,
) -> Result<ResponseBody> {
    if raw.is_empty() {
        return Ok(ResponseBody::None);
    }

    let content_type = headers.get("content-type").map(String::as_str).unwrap_or("");

    if content_type.starts_with("application/json") {
        if expect_json_seq {
            let mut values = Vec::new();
            for value in serde_json::Deserializer::from_slice(&raw).into_iter::<Value>() {
                let value = value.map_err(|e| {
                    DockerError::from_serde_error_with_description(e, || {
                        "streamed response body".into()
                    })
                })?;
                values.push(names::from_docker(value));
            }
            Ok(ResponseBody::JsonSeq(values))
        } else {
            serde_json::from_slice(&raw)
                .map(|value| ResponseBody::Json(names::from_docker(value)))
                .map_err(|e| {
                    DockerError::from_serde_error_with_description(e, || "response body".into())
                })
        }
    } else if content_type.starts_with("text/plain") {
        String::from_utf8(raw)
            .map(ResponseBody::Text)
            .map_err(|_| DockerError::protocol("got a text/plain body that is not valid UTF-8"))
    } else {
        Ok(ResponseBody::Bytes(raw))
    }
}
