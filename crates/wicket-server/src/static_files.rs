//! Static file serving.
//!
//! A directory-backed handler with index file fallback, extension-based MIME
//! detection, and path traversal rejection. Mounted on the router via
//! [`Server::serve_files`](crate::Server::serve_files).

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use http::{header, Response, StatusCode};
use http_body_util::Full;
use thiserror::Error;
use tracing::debug;

use wicket_router::HttpResponse;

/// Default index file served for directory targets.
pub const DEFAULT_INDEX_FILE: &str = "index.html";

/// Errors that can occur when serving a static file.
#[derive(Debug, Error)]
pub enum StaticFileError {
    /// The requested file does not exist under the root.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path tried to escape the root directory.
    #[error("forbidden path: {0}")]
    Forbidden(String),

    /// I/O error while reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StaticFileError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A static file handler rooted at a directory.
///
/// # Example
///
/// ```rust
/// use wicket_server::StaticFiles;
///
/// let files = StaticFiles::new("./public").index("home.html");
/// ```
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index_file: String,
}

impl StaticFiles {
    /// Create a handler serving files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_file: DEFAULT_INDEX_FILE.to_string(),
        }
    }

    /// Set the index file served for directory targets.
    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index_file = index.into();
        self
    }

    /// Get the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve the file at `request_path`, relative to the root.
    ///
    /// Directory targets fall back to the index file. Paths containing a
    /// parent-directory component are rejected before touching the
    /// filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`StaticFileError`] when the path escapes the root, the file
    /// does not exist, or reading fails.
    pub async fn serve(&self, request_path: &str) -> Result<HttpResponse, StaticFileError> {
        let file_path = self.resolve_path(request_path)?;

        let file_path = if file_path.is_dir() {
            file_path.join(&self.index_file)
        } else {
            file_path
        };

        let contents = match tokio::fs::read(&file_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StaticFileError::NotFound(request_path.to_string()));
            }
            Err(e) => return Err(StaticFileError::Io(e)),
        };

        debug!(path = %file_path.display(), bytes = contents.len(), "serving static file");

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime_type(&file_path))
            .body(Full::new(Bytes::from(contents)))
            .map_err(|e| StaticFileError::Io(std::io::Error::other(e)))
    }

    fn resolve_path(&self, request_path: &str) -> Result<PathBuf, StaticFileError> {
        let relative = request_path.trim_start_matches('/');

        for component in Path::new(relative).components() {
            match component {
                Component::ParentDir => {
                    return Err(StaticFileError::Forbidden(request_path.to_string()));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StaticFileError::Forbidden(request_path.to_string()));
                }
                _ => {}
            }
        }

        Ok(self.root.join(relative))
    }
}

/// Look up the MIME type for a file path by extension.
fn mime_type(path: &Path) -> &'static str {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match extension {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/index.html"), "<h1>docs</h1>").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_serve_file() {
        let root = make_root();
        let files = StaticFiles::new(root.path());

        let response = files.serve("/app.js").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/javascript"
        );
    }

    #[tokio::test]
    async fn test_directory_serves_index() {
        let root = make_root();
        let files = StaticFiles::new(root.path());

        let response = files.serve("/docs").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_missing_file_not_found() {
        let root = make_root();
        let files = StaticFiles::new(root.path());

        let err = files.serve("/nope.css").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.to_string().contains("/nope.css"));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let root = make_root();
        let files = StaticFiles::new(root.path());

        let err = files.serve("/../etc/passwd").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = files.serve("/docs/../../secret").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_mime_type_table() {
        assert_eq!(mime_type(Path::new("a.html")), "text/html; charset=utf-8");
        assert_eq!(mime_type(Path::new("a.png")), "image/png");
        assert_eq!(mime_type(Path::new("a.unknown")), "application/octet-stream");
        assert_eq!(mime_type(Path::new("noext")), "application/octet-stream");
    }
}
