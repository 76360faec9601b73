//! Static asset server for the marketing site and widget demo page.
//!
//! GET/HEAD only, every response carries `Cache-Control: no-store`, and no
//! request may escape the configured root, neither through `..` segments nor
//! through symlinks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{debug, info, warn};

use crate::config::Config;

pub const INDEX_FILE: &str = "index.html";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

#[derive(Clone)]
struct StaticState {
    root: Arc<PathBuf>,
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Map a request path onto a file below `root`. Returns `None` when the
/// path cannot be decoded or climbs above the root.
pub fn resolve_request_path(root: &Path, uri_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(uri_path).ok()?;
    let mut relative = PathBuf::new();
    let mut depth = 0usize;
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if depth == 0 {
                    return None;
                }
                relative.pop();
                depth -= 1;
            }
            s if s.contains('\0') || s.contains('\\') => return None,
            s => {
                relative.push(s);
                depth += 1;
            }
        }
    }
    Some(root.join(relative))
}

fn plain(status: StatusCode, body: &'static str) -> Response {
    (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::CONTENT_TYPE, PLAIN_TEXT),
        ],
        body,
    )
        .into_response()
}

fn file_response(content_type: &'static str, body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::CONTENT_TYPE, content_type),
        ],
        body,
    )
        .into_response()
}

async fn stays_within_root(root: &Path, path: &Path) -> bool {
    match tokio::fs::canonicalize(path).await {
        Ok(resolved) => resolved.starts_with(root),
        Err(_) => false,
    }
}

async fn serve_static(State(state): State<StaticState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    }

    let path = if uri.path() == "/" {
        state.root.join(INDEX_FILE)
    } else {
        match resolve_request_path(&state.root, uri.path()) {
            Some(path) => path,
            None => {
                debug!("rejected static path {}", uri.path());
                return plain(StatusCode::BAD_REQUEST, "Bad Request");
            }
        }
    };

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return plain(StatusCode::NOT_FOUND, "Not Found"),
    }
    if !stays_within_root(&state.root, &path).await {
        warn!("static path escapes root via symlink: {}", uri.path());
        return plain(StatusCode::BAD_REQUEST, "Bad Request");
    }

    let content_type = content_type_for(&path);
    if method == Method::HEAD {
        return file_response(content_type, Vec::new());
    }
    match tokio::fs::read(&path).await {
        Ok(bytes) => file_response(content_type, bytes),
        Err(e) => {
            warn!("failed to read {}: {}", path.display(), e);
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

pub fn build_static_router(root: PathBuf) -> Router {
    let root = std::fs::canonicalize(&root).unwrap_or(root);
    Router::new()
        .fallback(serve_static)
        .with_state(StaticState {
            root: Arc::new(root),
        })
}

pub async fn start_static_server(config: &Config) -> anyhow::Result<()> {
    let root = config.public_root_dir();
    if !root.is_dir() {
        warn!("static root {} is not a directory", root.display());
    }
    let router = build_static_router(root.clone());

    let addr = format!("{}:{}", config.web_host, config.web_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind static server at {addr}"))?;

    info!(
        "Static server listening on http://{addr} (root {})",
        root.display()
    );
    axum::serve(listener, router)
        .await
        .context("static server error")?;
    Ok(())
}
