//! The server-side wire state machine: one accepted connection, one request, one
//! response, then close.
//!
//! ```text
//!   ACCEPTED -> BUFFERING -> DISPATCHING -> RESPONDING -> CLOSED
//! ```

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::fingerprint::fingerprint_der;
use crate::request::Request;
use crate::response::Response;
use crate::server::middleware::{Decision, MiddlewareChain};
use crate::server::router::Router;
use crate::server::titan::TitanParams;
use crate::uri::GeminiUri;

pub const MAX_REQUEST_LINE_BYTES: usize = 1024;

/// Hard ceiling on a Titan upload body, independent of any particular
/// [`crate::server::titan::TitanHandler`]'s own configured cap — enforced before a
/// single body byte is read, so a client can't force a large buffer allocation just by
/// declaring a large `;size=`.
pub const MAX_TITAN_BODY_BYTES: u64 = 100 * 1024 * 1024;

/// Whether an I/O error is an ordinary abrupt peer close rather than a real fault; the
/// caller should log it at DEBUG and simply finish the connection task.
fn is_graceful_close(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
    )
}

/// Reads the request line, routes it through middleware and the router, and writes
/// the response — then returns, so the caller can close the stream.
///
/// `peer_cert_der` is the DER of the client's TLS certificate, if one was presented
/// during the handshake (the server always requests one but never requires it to
/// validate against a CA; see `tls::server`).
pub async fn serve_connection<S>(
    stream: &mut S,
    remote_addr: std::net::IpAddr,
    peer_cert_der: Option<Vec<u8>>,
    middleware: &MiddlewareChain,
    router: &Router,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let request_line = match read_request_line(stream).await {
        Ok(line) => line,
        Err(ReadRequestLineError::TooLarge) => {
            write_response(
                stream,
                &Response::new(59, "Request exceeds maximum size", None),
            )
            .await;
            return;
        }
        Err(ReadRequestLineError::InvalidUtf8) => {
            write_response(stream, &Response::new(59, "Invalid UTF-8 encoding", None)).await;
            return;
        }
        Err(ReadRequestLineError::Io(err)) => {
            if is_graceful_close(&err) {
                debug!("peer closed connection before sending a request: {err}");
            } else {
                debug!("error reading request line: {err}");
            }
            return;
        }
    };

    let uri = match GeminiUri::parse(&request_line, &["gemini", "titan"]) {
        Ok(uri) => uri,
        Err(err) => {
            write_response(stream, &Response::new(59, err.to_string(), None)).await;
            return;
        }
    };

    let is_titan = uri.scheme == "titan";
    let fingerprint = peer_cert_der.as_deref().map(fingerprint_der);
    let mut request = Request::from_uri(uri).with_client_cert(peer_cert_der);

    let decision = middleware
        .process_request(request.normalized_uri().as_str(), remote_addr, fingerprint.as_deref())
        .await;

    let response = match decision {
        Decision::Deny(response) => response,
        Decision::Allow => {
            if is_titan {
                match read_titan_body(stream, request.path()).await {
                    Ok(Some(body)) => request = request.with_titan_body(body),
                    Ok(None) => {}
                    Err(ReadTitanBodyError::TooLarge) => {
                        write_response(stream, &Response::new(59, "Upload exceeds server size limit", None)).await;
                        return;
                    }
                    Err(ReadTitanBodyError::Io(err)) => {
                        if !is_graceful_close(&err) {
                            debug!("error reading titan upload body: {err}");
                        }
                        return;
                    }
                }
            }
            router.route(&request).await
        }
    };

    write_response(stream, &response).await;
}

enum ReadTitanBodyError {
    TooLarge,
    Io(std::io::Error),
}

/// Reads the exact number of bytes a Titan request line's `;size=` parameter
/// declared. Returns `Ok(None)` for a path that doesn't parse as a Titan upload at all
/// (the router's own "malformed parameters" response covers that case), so a malformed
/// `titan://` request never blocks waiting on bytes the client isn't going to send.
async fn read_titan_body<S>(stream: &mut S, path: &str) -> Result<Option<Vec<u8>>, ReadTitanBodyError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let params = match TitanParams::parse(path) {
        Some(params) => params,
        None => return Ok(None),
    };
    if params.size > MAX_TITAN_BODY_BYTES {
        return Err(ReadTitanBodyError::TooLarge);
    }

    let mut body = vec![0u8; params.size as usize];
    stream.read_exact(&mut body).await.map_err(ReadTitanBodyError::Io)?;
    Ok(Some(body))
}

enum ReadRequestLineError {
    TooLarge,
    InvalidUtf8,
    Io(std::io::Error),
}

async fn read_request_line<S>(stream: &mut S) -> Result<String, ReadRequestLineError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.map_err(ReadRequestLineError::Io)?;
        if n == 0 {
            return Err(ReadRequestLineError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before request line was complete",
            )));
        }
        buf.push(byte[0]);
        if buf.len() >= 2 && buf[buf.len() - 2..] == [b'\r', b'\n'] {
            buf.truncate(buf.len() - 2);
            break;
        }
        if buf.len() > MAX_REQUEST_LINE_BYTES {
            return Err(ReadRequestLineError::TooLarge);
        }
    }
    String::from_utf8(buf).map_err(|_| ReadRequestLineError::InvalidUtf8)
}

async fn write_response<S>(stream: &mut S, response: &Response)
where
    S: tokio::io::AsyncWrite + Unpin,
{
    let header = response.header_line();
    if let Err(err) = stream.write_all(header.as_bytes()).await {
        if !is_graceful_close(&err) {
            debug!("error writing response header: {err}");
        }
        return;
    }
    if let Some(body) = response.body() {
        if let Err(err) = stream.write_all(body).await {
            if !is_graceful_close(&err) {
                debug!("error writing response body: {err}");
            }
            return;
        }
    }
    let _ = stream.shutdown().await;
}
