//! Titan upload handler: `gemini://host/path;size=N;mime=type;token=secret` carries an
//! upload's metadata in the URI itself, followed by exactly `size` raw bytes in the
//! request body. Reuses the static handler's path-traversal defense for the write
//! target.

use std::path::PathBuf;

use async_trait::async_trait;
use percent_encoding::percent_decode_str;

use crate::request::Request;
use crate::response::Response;
use crate::server::handler::{Handler, HandlerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitanParams {
    pub path: String,
    pub size: u64,
    pub mime: Option<String>,
    pub token: Option<String>,
}

impl TitanParams {
    /// Splits the `;key=value` segments trailing a Titan path off the path itself.
    /// Gemini-reserved `;` separators mean the raw path can't contain a literal `;`.
    pub fn parse(full_path: &str) -> Option<Self> {
        let mut parts = full_path.split(';');
        let path = parts.next()?.to_owned();

        let mut size = None;
        let mut mime = None;
        let mut token = None;
        for segment in parts {
            let (key, value) = segment.split_once('=')?;
            match key {
                "size" => size = value.parse::<u64>().ok(),
                "mime" => mime = Some(value.to_owned()),
                "token" => token = Some(value.to_owned()),
                _ => {}
            }
        }

        Some(TitanParams {
            path,
            size: size?,
            mime,
            token,
        })
    }
}

pub struct TitanHandler {
    document_root: PathBuf,
    max_size_bytes: u64,
    required_token: Option<String>,
}

impl TitanHandler {
    pub fn new(document_root: impl Into<PathBuf>, max_size_bytes: u64) -> Self {
        TitanHandler {
            document_root: document_root.into(),
            max_size_bytes,
            required_token: None,
        }
    }

    pub fn with_required_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    /// Resolves the decoded upload path under the document root, rejecting traversal
    /// the same way the static handler does.
    fn resolve(&self, decoded_path: &str) -> Option<PathBuf> {
        let relative = decoded_path.trim_start_matches('/');
        if relative.is_empty() || relative.split('/').any(|seg| seg == ".." || seg == ".") {
            return None;
        }
        Some(self.document_root.join(relative))
    }
}

#[async_trait]
impl Handler for TitanHandler {
    /// Validates the upload parameters and token, then writes the body the server
    /// engine already read off the wire (see [`Request::with_titan_body`]) and attached
    /// before dispatch — the engine reads exactly `params.size` bytes once it sees a
    /// `titan://` request line, since a plain request line carries no body of its own.
    async fn handle(&self, request: &Request) -> Result<Response, HandlerError> {
        let params = match TitanParams::parse(request.path()) {
            Some(params) => params,
            None => return Ok(Response::bad_request("Malformed Titan upload parameters")),
        };

        if let Some(required) = &self.required_token {
            if params.token.as_deref() != Some(required.as_str()) {
                return Ok(Response::new(61, "Invalid Titan upload token", None));
            }
        }

        if params.size > self.max_size_bytes {
            return Ok(Response::new(59, "Upload exceeds configured size limit", None));
        }

        let body = match request.titan_body() {
            Some(body) => body,
            None => return Ok(Response::temporary_failure("Upload body was not captured")),
        };
        if body.len() as u64 != params.size {
            return Ok(Response::bad_request("Uploaded byte count does not match declared size"));
        }

        let response = match self.upload_bytes(&params, body).await {
            Ok(()) => Response::success("text/gemini", format!("Stored {} bytes at {}", params.size, params.path)),
            Err(response) => response,
        };
        Ok(response)
    }
}

impl TitanHandler {
    /// Writes `bytes` to the resolved target for `params`, used by the server engine
    /// once it has read exactly `params.size` bytes off the wire.
    pub async fn upload_bytes(&self, params: &TitanParams, bytes: &[u8]) -> Result<(), Response> {
        let decoded = percent_decode_str(&params.path)
            .decode_utf8()
            .map_err(|_| Response::bad_request("Upload path is not valid UTF-8"))?
            .into_owned();
        let target = self
            .resolve(&decoded)
            .ok_or_else(|| Response::bad_request("Upload path escapes document root"))?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|_| Response::temporary_failure("Could not create upload directory"))?;
        }

        tokio::fs::write(&target, bytes)
            .await
            .map_err(|_| Response::temporary_failure("Could not write uploaded file"))?;

        let root_canonical = self
            .document_root
            .canonicalize()
            .map_err(|_| Response::temporary_failure("Upload document root unavailable"))?;
        let written_canonical = target
            .canonicalize()
            .map_err(|_| Response::temporary_failure("Could not verify uploaded file"))?;
        if !written_canonical.starts_with(&root_canonical) {
            let _ = tokio::fs::remove_file(&target).await;
            return Err(Response::bad_request("Upload path escapes document root"));
        }

        Ok(())
    }
}
