//! Live view HTTP server.
//!
//! Routes:
//! - `GET /`            → 301 to `/index.html`
//! - `GET /index.html`  → landing page embedding the stream
//! - `GET /stream.mjpg` → `multipart/x-mixed-replace` MJPEG stream
//! - anything else      → 404
//!
//! Every connection gets its own thread, so a slow or stuck viewer never holds
//! up another viewer or the detection loop. Viewers only meet the producer
//! through the `SharedFrameBuffer`.

mod http;
mod stream;

use anyhow::{anyhow, Result};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::SharedFrameBuffer;

pub use stream::{StreamEnd, BOUNDARY};

const ACCEPT_IDLE_SLEEP: Duration = Duration::from_millis(50);

pub const INDEX_PAGE: &str = r#"<html>
<head>
  <title>Person Detector Streaming</title>
  <style>
    body { margin: 0; background-color: #000; color: #fff; text-align: center; }
    h1 { margin: 20px; }
    img { width: 100vw; max-height: calc(100vh - 80px); object-fit: contain; }
  </style>
</head>
<body>
  <h1>Person Detector Streaming</h1>
  <img src="stream.mjpg" alt="Live stream"/>
</body>
</html>
"#;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: String,
    /// Longest a streaming client waits before re-checking for shutdown.
    pub wait_poll: Duration,
    /// Socket write timeout; a viewer that stops reading is dropped after this.
    pub write_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:7123".to_string(),
            wait_poll: Duration::from_millis(500),
            write_timeout: Some(Duration::from_secs(10)),
        }
    }
}

#[derive(Debug)]
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    active_streams: Arc<AtomicUsize>,
    join: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Number of viewers currently inside the streaming loop.
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }

    /// Stop accepting connections. Streaming threads exit within one wait poll.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stream server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct StreamServer {
    cfg: ServerConfig,
    buffer: Arc<SharedFrameBuffer>,
}

impl StreamServer {
    pub fn new(cfg: ServerConfig, buffer: Arc<SharedFrameBuffer>) -> Self {
        Self { cfg, buffer }
    }

    /// Bind and start the accept thread. Bind failure is returned to the caller.
    pub fn spawn(self) -> Result<ServerHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .map_err(|e| anyhow!("invalid listen address '{}': {}", self.cfg.addr, e))?;
        let listener = TcpListener::bind(configured_addr)
            .map_err(|e| anyhow!("failed to bind {}: {}", configured_addr, e))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let active_streams = Arc::new(AtomicUsize::new(0));
        let ctx = Arc::new(ConnectionContext {
            cfg: self.cfg,
            buffer: self.buffer,
            shutdown: shutdown.clone(),
            active_streams: active_streams.clone(),
        });
        let join = std::thread::Builder::new()
            .name("stream-accept".to_string())
            .spawn(move || {
                if let Err(err) = run_accept(listener, ctx) {
                    log::error!("stream server stopped: {}", err);
                }
            })?;

        Ok(ServerHandle {
            addr,
            shutdown,
            active_streams,
            join: Some(join),
        })
    }
}

struct ConnectionContext {
    cfg: ServerConfig,
    buffer: Arc<SharedFrameBuffer>,
    shutdown: Arc<AtomicBool>,
    active_streams: Arc<AtomicUsize>,
}

/// Decrements the active stream count when a streaming handler exits.
struct ActiveStream(Arc<AtomicUsize>);

impl ActiveStream {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_accept(listener: TcpListener, ctx: Arc<ConnectionContext>) -> Result<()> {
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let ctx = ctx.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("client-{}", peer))
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, peer, &ctx) {
                            log::warn!("request from {} failed: {:#}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("could not spawn handler for {}: {}", peer, err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_IDLE_SLEEP);
                continue;
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                // Per-connection accept errors (e.g. ECONNABORTED, EMFILE) are transient.
                log::warn!("accept failed: {}", err);
                std::thread::sleep(ACCEPT_IDLE_SLEEP);
            }
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    ctx: &ConnectionContext,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(http::REQUEST_READ_TIMEOUT))?;
    stream.set_write_timeout(ctx.cfg.write_timeout)?;
    if let Err(err) = stream.set_nodelay(true) {
        log::debug!("set_nodelay failed for {}: {}", peer, err);
    }

    let request = match http::read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            http::write_error(&mut stream, 400)?;
            return Err(err);
        }
    };
    log::debug!("{} {} {}", peer, request.method, request.path);

    if request.method != "GET" {
        return http::write_method_not_allowed(&mut stream, "GET");
    }
    match request.path.as_str() {
        "/" => http::write_redirect(&mut stream, "/index.html"),
        "/index.html" => http::write_response(
            &mut stream,
            200,
            "text/html; charset=utf-8",
            INDEX_PAGE.as_bytes(),
        ),
        "/stream.mjpg" => {
            let _active = ActiveStream::enter(&ctx.active_streams);
            log::info!(
                "streaming client {} connected ({})",
                peer,
                request.header("user-agent").unwrap_or("unknown agent")
            );
            stream::write_stream_head(&mut stream)?;
            match stream::stream_frames(
                &mut stream,
                &ctx.buffer,
                &ctx.shutdown,
                ctx.cfg.wait_poll,
            ) {
                Ok(end) => log::info!("streaming client {} released: {:?}", peer, end),
                Err(err) => log::warn!("removed streaming client {}: {}", peer, err),
            }
            Ok(())
        }
        _ => http::write_error(&mut stream, 404),
    }
}
