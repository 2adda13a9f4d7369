//! The client-side wire state machine: one transaction, one stream, one response.
//!
//! ```text
//!   CONNECTED -> REQUEST_SENT -> HEADER_PARSING -> BODY_STREAMING -> DONE
//!                                            \-> DONE (non-2x, no body)
//! ```

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use crate::response::Response;
use crate::status;
use crate::uri::GeminiUri;

pub const DEFAULT_BODY_CAP_BYTES: usize = 5 * 1024 * 1024;

/// A generous cap on the header line itself, guarding against a server that never
/// sends a CRLF. Not named explicitly in the wire protocol (which only bounds the
/// *request* line); kept far above any legitimate `meta` so it never misfires.
const MAX_HEADER_LINE_BYTES: usize = 8192;

#[derive(Debug, Error)]
pub enum ClientProtocolError {
    #[error("malformed response header: {0}")]
    ProtocolError(String),
    #[error("response body exceeds cap of {cap} bytes")]
    BodyTooLarge { cap: usize },
    #[error("connection closed before a complete response header was received")]
    ConnectionClosed,
    #[error("response body is not valid UTF-8")]
    InvalidBodyEncoding,
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs one request/response transaction over an already-connected, already-handshaken
/// stream. Does not close the stream itself; callers drop it once done (Gemini closes
/// after every transaction regardless of status).
pub async fn transact<S>(
    stream: &mut S,
    uri: &GeminiUri,
    body_cap: usize,
) -> Result<Response, ClientProtocolError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let request_line = format!("{}\r\n", uri.serialize());
    stream.write_all(request_line.as_bytes()).await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    let mut header_buf = Vec::new();
    loop {
        let byte = {
            let mut b = [0u8; 1];
            let n = reader.read(&mut b).await?;
            if n == 0 {
                if header_buf.is_empty() {
                    return Err(ClientProtocolError::ConnectionClosed);
                }
                return Err(ClientProtocolError::ConnectionClosed);
            }
            b[0]
        };
        header_buf.push(byte);
        if header_buf.len() >= 2 && header_buf[header_buf.len() - 2..] == [b'\r', b'\n'] {
            header_buf.truncate(header_buf.len() - 2);
            break;
        }
        if header_buf.len() > MAX_HEADER_LINE_BYTES {
            return Err(ClientProtocolError::ProtocolError(
                "header line too long".into(),
            ));
        }
    }

    let header = String::from_utf8(header_buf)
        .map_err(|_| ClientProtocolError::ProtocolError("header is not valid UTF-8".into()))?;

    let (status_str, meta) = header
        .split_once(' ')
        .ok_or_else(|| ClientProtocolError::ProtocolError("missing status/meta separator".into()))?;

    if status_str.len() != 2 || !status_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ClientProtocolError::ProtocolError(format!(
            "status must be exactly two digits, got {status_str:?}"
        )));
    }
    let status: status::Status = status_str
        .parse()
        .map_err(|_| ClientProtocolError::ProtocolError("status is not a number".into()))?;
    if !status::is_valid(status) {
        return Err(ClientProtocolError::ProtocolError(format!(
            "status {status} outside 10-69"
        )));
    }

    if !status::is_success(status) {
        return Ok(Response::new(status, meta, None));
    }

    let mut body_bytes = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if body_bytes.len() + n > body_cap {
            return Err(ClientProtocolError::BodyTooLarge { cap: body_cap });
        }
        body_bytes.extend_from_slice(&chunk[..n]);
    }

    std::str::from_utf8(&body_bytes).map_err(|_| ClientProtocolError::InvalidBodyEncoding)?;
    Ok(Response::new(status, meta, Some(body_bytes)))
}
