// src/reload/websocket.rs

//! WebSocket transport for reload messages.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, info, warn};
use tungstenite::{Message, WebSocket};

use crate::reload::{PreviewSession, ReloadMessage, ReloadNotifier};

/// A client that cannot take a message within this time is dropped.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);
/// Time a new connection gets to complete the WebSocket upgrade.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

const ACCEPT_POLL: Duration = Duration::from_millis(25);
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// A browser connected over WebSocket.
pub struct WsSession {
    socket: WebSocket<TcpStream>,
    peer: Option<SocketAddr>,
}

impl WsSession {
    /// Wrap an upgraded socket. Writes time out after [`SEND_TIMEOUT`] so a
    /// client that stopped reading fails its send and gets pruned.
    pub fn new(socket: WebSocket<TcpStream>) -> Self {
        let stream = socket.get_ref();
        let peer = stream.peer_addr().ok();
        if let Err(err) = stream.set_write_timeout(Some(SEND_TIMEOUT)) {
            warn!(?peer, error = %err, "cannot bound websocket writes");
        }
        Self { socket, peer }
    }
}

impl PreviewSession for WsSession {
    fn describe(&self) -> String {
        match self.peer {
            Some(addr) => format!("ws://{addr}"),
            None => "ws://<unknown>".to_string(),
        }
    }

    fn send(&mut self, message: &ReloadMessage) -> anyhow::Result<()> {
        let json = message.to_json()?;
        self.socket.send(Message::text(json))?;
        Ok(())
    }
}

/// Accepts preview clients and registers them with a [`ReloadNotifier`].
///
/// The listener is polled on a dedicated thread. Each connection is upgraded
/// on its own short-lived thread, so a client that never finishes the
/// handshake holds up neither other clients nor shutdown.
pub struct ReloadServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ReloadServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadServer")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl ReloadServer {
    /// Bind `host:port` (port `0` picks a free one) and start accepting.
    pub fn bind(host: &str, port: u16, notifier: ReloadNotifier) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((host, port))
            .with_context(|| format!("binding reload server to {host}:{port}"))?;
        listener
            .set_nonblocking(true)
            .context("making the reload listener non-blocking")?;
        let addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread = {
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("assetdag-reload".to_string())
                .spawn(move || accept_loop(listener, notifier, shutdown))
                .context("spawning reload server thread")?
        };

        info!(%addr, "reload server listening");
        Ok(Self {
            addr,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Snippet to embed in served pages.
    pub fn client_script(&self) -> String {
        client_script(self.addr)
    }

    /// Stop accepting new clients. Existing sessions stay registered.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(thread) = self.thread.take() else {
            return;
        };

        let deadline = Instant::now() + STOP_TIMEOUT;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                warn!(addr = %self.addr, "reload server thread did not stop; detaching it");
                return;
            }
            std::thread::sleep(ACCEPT_POLL);
        }
        if thread.join().is_err() {
            warn!("reload server thread panicked");
        }
        debug!(addr = %self.addr, "reload server stopped");
    }
}

impl Drop for ReloadServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, notifier: ReloadNotifier, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) => {
                warn!(error = %err, "failed to accept preview connection");
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
        };

        let notifier = notifier.clone();
        let spawned = std::thread::Builder::new()
            .name("assetdag-reload-handshake".to_string())
            .spawn(move || upgrade(stream, peer, notifier));
        if let Err(err) = spawned {
            warn!(%peer, error = %err, "cannot spawn handshake thread");
        }
    }
}

fn upgrade(stream: TcpStream, peer: SocketAddr, notifier: ReloadNotifier) {
    let prepared = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)))
        .and_then(|()| stream.set_write_timeout(Some(HANDSHAKE_TIMEOUT)));
    if let Err(err) = prepared {
        debug!(%peer, error = %err, "cannot configure preview connection");
        return;
    }

    match tungstenite::accept(stream) {
        Ok(socket) => notifier.connect(Box::new(WsSession::new(socket))),
        Err(err) => debug!(%peer, error = %err, "websocket handshake failed"),
    }
}

/// Browser script that listens for reload messages: stylesheet-only
/// changes re-fetch every `<link rel="stylesheet">`, anything else reloads
/// the page.
pub fn client_script(addr: SocketAddr) -> String {
    format!(
        r#"<script>
(() => {{
  const ws = new WebSocket("ws://{addr}");
  ws.onmessage = (event) => {{
    const msg = JSON.parse(event.data);
    if (msg.type !== "reload") return;
    if (msg.fullReload) {{
      location.reload();
      return;
    }}
    for (const link of document.querySelectorAll('link[rel="stylesheet"]')) {{
      const url = new URL(link.href);
      url.searchParams.set("assetdag", Date.now().toString());
      link.href = url.toString();
    }}
  }};
}})();
</script>"#
    )
}
