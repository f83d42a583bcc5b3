mod common;
use crate::common::{FakeProcessor, site_graph, with_timeout};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use assetdag::build::{BuildRun, RunPlan};
use assetdag::reload::{
    PreviewServer, PreviewSession, ReloadMessage, ReloadNotifier, ReloadServer, WsSession,
    client_script, inject_client_script,
};
use assetdag::types::AssetClass;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Clone, Default)]
struct FakeSession {
    received: Arc<Mutex<Vec<ReloadMessage>>>,
    broken: bool,
}

impl PreviewSession for FakeSession {
    fn describe(&self) -> String {
        if self.broken { "broken".into() } else { "healthy".into() }
    }

    fn send(&mut self, message: &ReloadMessage) -> anyhow::Result<()> {
        if self.broken {
            anyhow::bail!("connection reset");
        }
        self.received.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn run_with(completed: &[&str]) -> BuildRun {
    let graph = site_graph(&FakeProcessor::new());
    let mut run = BuildRun::new(1, &RunPlan::full(&graph));
    run.tasks_completed = completed.iter().map(|s| s.to_string()).collect();
    run
}

#[test]
fn style_only_runs_swap_stylesheets() {
    let graph = site_graph(&FakeProcessor::new());
    let msg = ReloadMessage::from_run(&graph, &run_with(&["styles"])).expect("message");

    assert_eq!(msg.asset_classes.iter().copied().collect::<Vec<_>>(), vec![AssetClass::Style]);
    assert!(!msg.full_reload);
}

#[test]
fn any_other_class_forces_a_full_reload() {
    let graph = site_graph(&FakeProcessor::new());
    let msg = ReloadMessage::from_run(&graph, &run_with(&["styles", "scripts", "sitemap"]))
        .expect("message");

    assert_eq!(
        msg.asset_classes.iter().copied().collect::<Vec<_>>(),
        vec![AssetClass::Markup, AssetClass::Style, AssetClass::Script]
    );
    assert!(msg.full_reload);
}

#[test]
fn nothing_succeeded_means_no_message() {
    let graph = site_graph(&FakeProcessor::new());
    assert!(ReloadMessage::from_run(&graph, &run_with(&[])).is_none());
}

#[test]
fn wire_format_is_camel_case_json() -> TestResult {
    let msg = ReloadMessage::new([AssetClass::Style, AssetClass::Image]);
    let json: serde_json::Value = serde_json::from_str(&msg.to_json()?)?;

    assert_eq!(
        json,
        serde_json::json!({
            "type": "reload",
            "assetClasses": ["style", "image"],
            "fullReload": true,
        })
    );
    Ok(())
}

#[test]
fn broadcast_prunes_failed_sessions() {
    let notifier = ReloadNotifier::new();
    let healthy = FakeSession::default();
    notifier.connect(Box::new(healthy.clone()));
    notifier.connect(Box::new(FakeSession {
        broken: true,
        ..FakeSession::default()
    }));
    assert_eq!(notifier.session_count(), 2);

    let delivered = notifier.broadcast(&ReloadMessage::new([AssetClass::Style]));
    assert_eq!(delivered, 1);
    assert_eq!(notifier.session_count(), 1);
    assert_eq!(healthy.received.lock().unwrap().len(), 1);
}

#[test]
fn notify_without_sessions_still_derives_the_message() {
    let notifier = ReloadNotifier::new();
    let graph = site_graph(&FakeProcessor::new());

    let (msg, delivered) = notifier
        .notify(&graph, &run_with(&["images"]))
        .expect("images succeeded");
    assert_eq!(delivered, 0);
    assert!(msg.full_reload);

    assert!(notifier.notify(&graph, &run_with(&[])).is_none());
}

#[test]
fn client_script_points_at_the_server() {
    let script = client_script("127.0.0.1:35729".parse().expect("addr"));
    assert!(script.contains("ws://127.0.0.1:35729"));
    assert!(script.contains("fullReload"));
}

#[test]
fn websocket_clients_receive_broadcasts() -> TestResult {
    let notifier = ReloadNotifier::new();
    let server = ReloadServer::bind("127.0.0.1", 0, notifier.clone())?;
    let addr = server.local_addr();
    assert!(server.client_script().contains(&addr.to_string()));

    let (mut client, _response) = tungstenite::connect(format!("ws://{addr}"))?;

    let deadline = Instant::now() + Duration::from_secs(5);
    while notifier.session_count() == 0 {
        assert!(Instant::now() < deadline, "client never registered");
        std::thread::sleep(Duration::from_millis(5));
    }

    let delivered = notifier.broadcast(&ReloadMessage::new([AssetClass::Style]));
    assert_eq!(delivered, 1);

    let frame = client.read()?;
    let json: serde_json::Value = serde_json::from_str(frame.to_text()?)?;
    assert_eq!(json["type"], "reload");
    assert_eq!(json["fullReload"], false);
    assert_eq!(json["assetClasses"], serde_json::json!(["style"]));

    server.shutdown();
    Ok(())
}

#[test]
fn silent_connection_blocks_neither_clients_nor_shutdown() -> TestResult {
    let notifier = ReloadNotifier::new();
    let server = ReloadServer::bind("127.0.0.1", 0, notifier.clone())?;
    let addr = server.local_addr();

    // Connects but never sends the upgrade request.
    let _silent = std::net::TcpStream::connect(addr)?;

    let (_client, _response) = tungstenite::connect(format!("ws://{addr}"))?;
    let deadline = Instant::now() + Duration::from_secs(5);
    while notifier.session_count() == 0 {
        assert!(Instant::now() < deadline, "client queued behind the silent connection");
        std::thread::sleep(Duration::from_millis(5));
    }

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        server.shutdown();
        let _ = done_tx.send(());
    });
    assert!(
        done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
        "shutdown did not return"
    );
    Ok(())
}

#[test]
fn client_that_stops_reading_is_pruned() -> TestResult {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    // Raw socket on the client side that is never read from.
    let _stalled = std::net::TcpStream::connect(addr)?;
    let (server_side, _) = listener.accept()?;
    let socket = tungstenite::WebSocket::from_raw_socket(
        server_side,
        tungstenite::protocol::Role::Server,
        None,
    );

    let notifier = ReloadNotifier::new();
    notifier.connect(Box::new(WsSession::new(socket)));
    let message = ReloadMessage::new([AssetClass::Markup]);

    let deadline = Instant::now() + Duration::from_secs(60);
    while notifier.session_count() > 0 {
        assert!(Instant::now() < deadline, "stalled client was never pruned");
        notifier.broadcast(&message);
    }
    assert_eq!(notifier.broadcast(&message), 0);
    Ok(())
}

#[test]
fn script_goes_before_the_closing_body_tag() {
    let page = inject_client_script("<html><BODY><p>hi</p></BODY></html>", "<script>x</script>");
    assert_eq!(page, "<html><BODY><p>hi</p><script>x</script></BODY></html>");

    assert_eq!(inject_client_script("<p>bare</p>", "<s/>"), "<p>bare</p><s/>");
}

/// Minimal HTTP/1.1 GET; returns the whole response as text.
async fn http_get(addr: std::net::SocketAddr, path: &str) -> std::io::Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(String::from_utf8_lossy(&response).into_owned())
}

#[tokio::test]
async fn preview_server_serves_built_files_with_the_reload_script() -> TestResult {
    let dir = tempfile::tempdir()?;
    std::fs::create_dir_all(dir.path().join("assets/css"))?;
    std::fs::write(
        dir.path().join("index.html"),
        "<html><body><h1>Home</h1></body></html>",
    )?;
    std::fs::write(dir.path().join("assets/css/common.css"), "body { color: red; }")?;

    let script = client_script("127.0.0.1:35729".parse()?);
    let server = PreviewServer::start("127.0.0.1", 0, dir.path(), Some(script.clone())).await?;
    let addr = server.local_addr();

    let page = with_timeout(http_get(addr, "/")).await?;
    assert!(page.starts_with("HTTP/1.1 200"), "{page}");
    assert!(page.contains("<h1>Home</h1>"));
    let script_at = page.find(&script).expect("script injected");
    assert!(script_at < page.rfind("</body>").expect("body kept"));

    let css = with_timeout(http_get(addr, "/assets/css/common.css")).await?;
    assert!(css.starts_with("HTTP/1.1 200"), "{css}");
    assert!(css.ends_with("body { color: red; }"));
    assert!(!css.contains("<script>"));

    let missing = with_timeout(http_get(addr, "/nope.html")).await?;
    assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");

    with_timeout(server.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn preview_server_without_script_serves_pages_untouched() -> TestResult {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("about.html"), "<body>About</body>")?;

    let server = PreviewServer::start("127.0.0.1", 0, dir.path(), None).await?;
    let page = with_timeout(http_get(server.local_addr(), "/about.html")).await?;
    assert!(page.ends_with("<body>About</body>"), "{page}");

    with_timeout(server.shutdown()).await;
    Ok(())
}
