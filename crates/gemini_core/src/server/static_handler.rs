//! Serves files out of a document root. Defends against path traversal by
//! canonicalizing the resolved path and verifying it is still inside the root —
//! string-prefix checks on `..` are not enough once symlinks are in play.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use percent_encoding::percent_decode_str;

use crate::request::Request;
use crate::response::Response;
use crate::server::handler::{Handler, HandlerError};

const DEFAULT_INDEX_FILENAMES: &[&str] = &["index.gmi", "index.gemini"];
const DEFAULT_MAX_FILE_BYTES: u64 = 100 * 1024 * 1024;

enum Resolved {
    File(PathBuf),
    Directory(PathBuf),
}

pub struct StaticHandler {
    document_root: PathBuf,
    index_filenames: Vec<String>,
    max_file_bytes: u64,
    directory_listing: bool,
}

impl StaticHandler {
    pub fn new(document_root: impl Into<PathBuf>) -> Self {
        StaticHandler {
            document_root: document_root.into(),
            index_filenames: DEFAULT_INDEX_FILENAMES.iter().map(|s| s.to_string()).collect(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            directory_listing: false,
        }
    }

    pub fn with_directory_listing(mut self, enable: bool) -> Self {
        self.directory_listing = enable;
        self
    }

    /// Resolves `request_path` (already percent-decoded URL path) against the document
    /// root, returning `None` if it escapes the root once symlinks are resolved. A
    /// directory with no index file resolves to `Resolved::Directory` rather than
    /// `None`, so the caller can decide whether to list it or report not-found.
    fn resolve(&self, request_path: &str) -> Option<Resolved> {
        let decoded = percent_decode_str(request_path).decode_utf8().ok()?;
        let relative = decoded.trim_start_matches('/');

        // Reject any component that isn't a plain file/dir name before ever touching
        // the filesystem, so a nonexistent `..` can't be used to probe outside the root.
        if relative.split('/').any(|seg| seg == ".." || seg == ".") {
            return None;
        }

        let candidate = if relative.is_empty() {
            self.document_root.clone()
        } else {
            self.document_root.join(relative)
        };

        let root_canonical = self.document_root.canonicalize().ok()?;

        if candidate.is_dir() {
            for name in &self.index_filenames {
                let candidate_index = candidate.join(name);
                if candidate_index.is_file() {
                    let resolved = candidate_index.canonicalize().ok()?;
                    return resolved.starts_with(&root_canonical).then_some(Resolved::File(resolved));
                }
            }
            let resolved = candidate.canonicalize().ok()?;
            return resolved
                .starts_with(&root_canonical)
                .then_some(Resolved::Directory(resolved));
        }

        let resolved = candidate.canonicalize().ok()?;
        resolved.starts_with(&root_canonical).then_some(Resolved::File(resolved))
    }

    fn mime_for(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
            Some(ext) if ext == "gmi" || ext == "gemini" => "text/gemini",
            Some(ext) if ext == "txt" => "text/plain",
            Some(ext) if ext == "html" || ext == "htm" => "text/html",
            Some(ext) if ext == "png" => "image/png",
            Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
            Some(ext) if ext == "gif" => "image/gif",
            Some(ext) if ext == "webp" => "image/webp",
            Some(ext) if ext == "svg" => "image/svg+xml",
            Some(ext) if ext == "pdf" => "application/pdf",
            Some(ext) if ext == "json" => "application/json",
            Some(ext) if ext == "xml" => "application/xml",
            _ => "application/octet-stream",
        }
    }

    fn normalize_base_path(path: &str) -> String {
        if path.ends_with('/') {
            path.to_owned()
        } else {
            format!("{path}/")
        }
    }

    /// The listing's parent-directory link target, or `None` at the root (`/`), which
    /// has no parent to link to.
    fn parent_link(base_path: &str) -> Option<String> {
        let trimmed = base_path.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.rfind('/') {
            Some(idx) => Some(format!("{}/", &trimmed[..idx])),
            None => Some("/".to_owned()),
        }
    }

    fn format_size(bytes: u64) -> String {
        if bytes < 1024 {
            format!("{bytes} B")
        } else {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        }
    }

    /// Builds a gemtext index of `dir`'s immediate children, linked relative to
    /// `base_path`. Directories sort before files; within each group, by name.
    async fn generate_directory_listing(dir: &Path, base_path: &str) -> std::io::Result<String> {
        let base_path = Self::normalize_base_path(base_path);

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = file_type.is_dir();
            let size = if is_dir { 0 } else { entry.metadata().await?.len() };
            entries.push((name, is_dir, size));
        }
        entries.sort_by(|a, b| match (a.1, b.1) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.0.cmp(&b.0),
        });

        let mut out = format!("# Index of {base_path}\n\n");
        if let Some(parent) = Self::parent_link(&base_path) {
            out.push_str(&format!("=> {parent} ..\n"));
        }
        if entries.is_empty() {
            out.push_str("\nThis is an empty directory.\n");
        } else {
            for (name, is_dir, size) in entries {
                if is_dir {
                    out.push_str(&format!("=> {base_path}{name}/ {name}/\n"));
                } else {
                    out.push_str(&format!("=> {base_path}{name} {name} ({})\n", Self::format_size(size)));
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Handler for StaticHandler {
    async fn handle(&self, request: &Request) -> Result<Response, HandlerError> {
        let path = match self.resolve(request.path()) {
            Some(Resolved::File(path)) => path,
            Some(Resolved::Directory(dir)) => {
                if !self.directory_listing {
                    return Ok(Response::not_found("Not found"));
                }
                return Ok(match Self::generate_directory_listing(&dir, request.path()).await {
                    Ok(listing) => Response::success("text/gemini", listing),
                    Err(_) => Response::temporary_failure("Could not list directory"),
                });
            }
            None => return Ok(Response::not_found("Not found")),
        };

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(_) => return Ok(Response::not_found("Not found")),
        };
        if metadata.len() > self.max_file_bytes {
            return Ok(Response::new(50, "File too large", None));
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Response::success(Self::mime_for(&path), bytes)),
            Err(_) => Ok(Response::new(50, "Could not read file", None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::GeminiUri;
    use std::fs;

    fn req(path: &str) -> Request {
        Request::from_uri(GeminiUri::parse(&format!("gemini://example.com{path}"), &["gemini"]).unwrap())
    }

    #[tokio::test]
    async fn serves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.gmi"), "# Hello").unwrap();
        let handler = StaticHandler::new(dir.path());

        let resp = handler.handle(&req("/hello.gmi")).await.unwrap();
        assert_eq!(resp.status(), 20);
        assert_eq!(resp.mime_type(), Some("text/gemini"));
        assert_eq!(resp.body(), Some(b"# Hello".as_slice()));
    }

    #[tokio::test]
    async fn falls_back_to_index_for_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/index.gmi"), "# Sub index").unwrap();
        let handler = StaticHandler::new(dir.path());

        let resp = handler.handle(&req("/sub/")).await.unwrap();
        assert_eq!(resp.status(), 20);
        assert_eq!(resp.body(), Some(b"# Sub index".as_slice()));
    }

    #[tokio::test]
    async fn directory_without_index_is_not_found_when_listing_disabled() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let handler = StaticHandler::new(dir.path());

        let resp = handler.handle(&req("/sub/")).await.unwrap();
        assert_eq!(resp.status(), 51);
    }

    #[tokio::test]
    async fn lists_directory_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/alpha.gmi"), "a").unwrap();
        fs::create_dir(dir.path().join("docs/sub")).unwrap();
        let handler = StaticHandler::new(dir.path()).with_directory_listing(true);

        let resp = handler.handle(&req("/docs/")).await.unwrap();
        assert_eq!(resp.status(), 20);
        let body = String::from_utf8(resp.body().unwrap().to_vec()).unwrap();
        assert!(body.starts_with("# Index of /docs/\n"));
        assert!(body.contains("=> /docs/ .."));
        assert!(body.contains("=> /docs/sub/ sub/"));
        assert!(body.contains("=> /docs/alpha.gmi alpha.gmi"));
        // directories sort before files
        assert!(body.find("sub/").unwrap() < body.find("alpha.gmi").unwrap());
    }

    #[tokio::test]
    async fn lists_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let handler = StaticHandler::new(dir.path()).with_directory_listing(true);

        let resp = handler.handle(&req("/empty/")).await.unwrap();
        assert_eq!(resp.status(), 20);
        let body = String::from_utf8(resp.body().unwrap().to_vec()).unwrap();
        assert!(body.to_lowercase().contains("empty directory"));
    }

    #[tokio::test]
    async fn root_listing_has_no_parent_link() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.gmi"), "a").unwrap();
        let handler = StaticHandler::new(dir.path()).with_directory_listing(true);

        let resp = handler.handle(&req("/")).await.unwrap();
        let body = String::from_utf8(resp.body().unwrap().to_vec()).unwrap();
        assert!(!body.lines().any(|line| line.starts_with("=>") && line.contains("..")));
    }

    #[tokio::test]
    async fn rejects_dotdot_traversal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("secret.txt"), "nope").unwrap();
        let handler = StaticHandler::new(dir.path());

        // Built directly rather than through `GeminiUri::parse`, whose underlying URL
        // parser collapses `..` path segments before the handler ever sees them — this
        // exercises the handler's own segment check in isolation, as a defense that
        // still holds if a future caller ever constructs a `Request` some other way.
        let uri = GeminiUri {
            scheme: "gemini".to_owned(),
            host: "example.com".to_owned(),
            port: 1965,
            path: "/../secret.txt".to_owned(),
            query: None,
        };
        let resp = handler.handle(&Request::from_uri(uri)).await.unwrap();
        assert_eq!(resp.status(), 51);
    }

    #[tokio::test]
    async fn rejects_symlink_escape() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("outside.txt"), "nope").unwrap();

        #[cfg(unix)]
        std::os::unix::fs::symlink(outside.path().join("outside.txt"), dir.path().join("link.txt")).unwrap();

        let handler = StaticHandler::new(dir.path());
        let resp = handler.handle(&req("/link.txt")).await.unwrap();

        #[cfg(unix)]
        assert_eq!(resp.status(), 51);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let handler = StaticHandler::new(dir.path());

        let resp = handler.handle(&req("/nope.gmi")).await.unwrap();
        assert_eq!(resp.status(), 51);
    }
}
