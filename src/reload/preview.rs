// src/reload/preview.rs

//! Static HTTP server for previewing the output tree.
//!
//! HTML pages get the live-reload client script added before `</body>`, so
//! a browser pointed at the preview server reconnects to the reload server
//! without any change to the built pages.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

/// Pages larger than this are served without the reload script.
const MAX_INJECT_BYTES: usize = 16 * 1024 * 1024;
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Serves a directory over HTTP on the current tokio runtime.
pub struct PreviewServer {
    addr: SocketAddr,
    dir: PathBuf,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for PreviewServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewServer")
            .field("addr", &self.addr)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl PreviewServer {
    /// Bind `host:port` (port `0` picks a free one) and serve `dir`.
    ///
    /// With a `script`, every HTML response carries it.
    pub async fn start(
        host: &str,
        port: u16,
        dir: impl Into<PathBuf>,
        script: Option<String>,
    ) -> anyhow::Result<Self> {
        let dir = dir.into();
        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .with_context(|| format!("binding preview server to {host}:{port}"))?;
        let addr = listener.local_addr()?;

        let app = router(&dir, script);
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            if let Err(err) = served {
                warn!(error = %err, "preview server stopped with an error");
            }
        });

        info!(url = %format!("http://{addr}/"), dir = ?dir, "preview server listening");
        Ok(Self {
            addr,
            dir,
            cancel,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop serving. Connections still open after a short grace period are
    /// dropped.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let mut task = self.task;
        if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
            debug!("preview server still draining connections; aborting it");
            task.abort();
        }
        debug!(addr = %self.addr, "preview server stopped");
    }
}

/// Router that serves `dir`, adding `script` to HTML responses when given.
pub fn router(dir: &Path, script: Option<String>) -> Router {
    let app = Router::new().fallback_service(ServeDir::new(dir));
    match script {
        Some(script) => app.layer(middleware::map_response_with_state(
            Arc::<str>::from(script),
            add_script_to_html,
        )),
        None => app,
    }
}

async fn add_script_to_html(State(script): State<Arc<str>>, response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_INJECT_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "cannot read page for reload script injection");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let page = inject_client_script(&String::from_utf8_lossy(&bytes), &script);
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(page))
}

/// Insert `script` before the last `</body>`, or append it when the page
/// has none.
pub fn inject_client_script(html: &str, script: &str) -> String {
    // ASCII lowercasing keeps byte offsets intact.
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(at) => {
            let mut page = String::with_capacity(html.len() + script.len());
            page.push_str(&html[..at]);
            page.push_str(script);
            page.push_str(&html[at..]);
            page
        }
        None => format!("{html}{script}"),
    }
}
