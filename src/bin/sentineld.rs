//! sentineld - person-detecting camera daemon
//!
//! This daemon:
//! 1. Captures frames from the configured source (synthetic or V4L2)
//! 2. Runs person detection every N frames and plays an alert on arrival
//! 3. Annotates and JPEG-encodes every frame into a shared latest-frame slot
//! 4. Serves the live view over HTTP as an MJPEG stream

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use pi_sentinel::{
    alert, annotate::OverlayAnnotator, detect, host, ingest, Collaborators, DetectionLoop,
    JpegFrameEncoder, SentinelConfig, SharedFrameBuffer, StreamServer,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Person-detecting camera with a live MJPEG view")]
struct Args {
    /// JSON or TOML configuration file.
    #[arg(long, env = "SENTINEL_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:7123.
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Frame source: stub://<name> or a V4L2 device path.
    #[arg(long, value_name = "URI")]
    source: Option<String>,

    /// Detector backend name (stub, tract).
    #[arg(long, value_name = "NAME")]
    detector: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = SentinelConfig::load_from(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        cfg.server.addr = listen;
    }
    if let Some(source) = args.source {
        cfg.source.location = source;
    }
    if let Some(detector) = args.detector {
        cfg.detector.backend = detector;
    }
    cfg.validate()?;

    let hostname = host::hostname();
    let host_ip = host::resolve_host_ip(&hostname);
    log::info!("Hostname: {}", hostname);
    log::info!("Host IP: {}", host_ip);

    let mut annotator = OverlayAnnotator::new();
    match &cfg.font_path {
        Some(path) => annotator = annotator.with_font_file(path)?,
        None => log::warn!("no font configured; overlay text is disabled"),
    }
    let parts = Collaborators {
        source: ingest::open_source(&cfg.source)?,
        detector: detect::build_backend(&cfg.detector)?,
        annotator: Box::new(annotator),
        encoder: Box::new(JpegFrameEncoder::new(cfg.jpeg_quality)?),
        alert: alert::build_player(cfg.alert_command.as_deref())?,
    };

    let buffer = Arc::new(SharedFrameBuffer::new());
    let detection = DetectionLoop::new(cfg.pipeline.clone(), parts, buffer.clone())?.spawn()?;

    let server = match StreamServer::new(cfg.server.clone(), buffer.clone()).spawn() {
        Ok(server) => server,
        Err(err) => {
            buffer.close();
            detection.stop()?;
            return Err(err);
        }
    };
    log::info!(
        "Server running at http://{}:{}",
        host_ip,
        server.addr.port()
    );

    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    log::info!("sentineld waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");
    detection.stop()?;
    buffer.close();
    server.stop()?;
    log::info!("sentineld stopped");

    Ok(())
}
