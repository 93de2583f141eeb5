use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{DetectorSettings, BACKEND_NAMES};
use crate::ingest::SourceSettings;
use crate::pipeline::LoopSettings;
use crate::server::ServerConfig;

const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SentinelConfigFile {
    listen_addr: Option<String>,
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    stream: Option<StreamConfigFile>,
    jpeg_quality: Option<u8>,
    font_path: Option<PathBuf>,
    alert_command: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    location: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    max_results: Option<usize>,
    score_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    detection_interval: Option<u32>,
    frame_delay_ms: Option<u64>,
    greeting_secs: Option<u64>,
    mirror: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    wait_poll_ms: Option<u64>,
    write_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub server: ServerConfig,
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub pipeline: LoopSettings,
    pub jpeg_quality: u8,
    pub font_path: Option<PathBuf>,
    /// Program and arguments run on each person arrival.
    pub alert_command: Option<Vec<String>>,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            source: SourceSettings::default(),
            detector: DetectorSettings::default(),
            pipeline: LoopSettings::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            font_path: None,
            alert_command: None,
        }
    }
}

impl SentinelConfig {
    /// File named by `SENTINEL_CONFIG` (if any), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => SentinelConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Self {
        let mut cfg = Self::default();
        if let Some(addr) = file.listen_addr {
            cfg.server.addr = addr;
        }
        if let Some(source) = file.source {
            if let Some(location) = source.location {
                cfg.source.location = location;
            }
            cfg.source.width = source.width.unwrap_or(cfg.source.width);
            cfg.source.height = source.height.unwrap_or(cfg.source.height);
            cfg.source.target_fps = source.target_fps.unwrap_or(cfg.source.target_fps);
        }
        if let Some(detector) = file.detector {
            if let Some(backend) = detector.backend {
                cfg.detector.backend = backend;
            }
            cfg.detector.model_path = detector.model_path;
            cfg.detector.max_results = detector.max_results.unwrap_or(cfg.detector.max_results);
            cfg.detector.score_threshold = detector
                .score_threshold
                .unwrap_or(cfg.detector.score_threshold);
        }
        if let Some(pipeline) = file.pipeline {
            cfg.pipeline.detection_interval = pipeline
                .detection_interval
                .unwrap_or(cfg.pipeline.detection_interval);
            if let Some(ms) = pipeline.frame_delay_ms {
                cfg.pipeline.frame_delay = Duration::from_millis(ms);
            }
            if let Some(secs) = pipeline.greeting_secs {
                cfg.pipeline.greeting_duration = Duration::from_secs(secs);
            }
            cfg.pipeline.mirror = pipeline.mirror.unwrap_or(cfg.pipeline.mirror);
        }
        if let Some(stream) = file.stream {
            if let Some(ms) = stream.wait_poll_ms {
                cfg.server.wait_poll = Duration::from_millis(ms);
            }
            if let Some(secs) = stream.write_timeout_secs {
                // 0 disables the timeout.
                cfg.server.write_timeout = (secs > 0).then(|| Duration::from_secs(secs));
            }
        }
        cfg.jpeg_quality = file.jpeg_quality.unwrap_or(cfg.jpeg_quality);
        cfg.font_path = file.font_path;
        cfg.alert_command = file.alert_command.filter(|argv| !argv.is_empty());
        cfg
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("SENTINEL_LISTEN_ADDR") {
            self.server.addr = addr;
        }
        if let Some(source) = non_empty_env("SENTINEL_SOURCE") {
            self.source.location = source;
        }
        if let Some(detector) = non_empty_env("SENTINEL_DETECTOR") {
            self.detector.backend = detector;
        }
        if let Some(path) = non_empty_env("SENTINEL_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(interval) = non_empty_env("SENTINEL_DETECTION_INTERVAL") {
            self.pipeline.detection_interval = interval.trim().parse().map_err(|_| {
                anyhow!("SENTINEL_DETECTION_INTERVAL must be a positive integer")
            })?;
        }
        if let Some(delay) = non_empty_env("SENTINEL_FRAME_DELAY_MS") {
            let ms: u64 = delay.trim().parse().map_err(|_| {
                anyhow!("SENTINEL_FRAME_DELAY_MS must be an integer number of milliseconds")
            })?;
            self.pipeline.frame_delay = Duration::from_millis(ms);
        }
        if let Some(command) = non_empty_env("SENTINEL_ALERT_COMMAND") {
            let argv = split_whitespace(&command);
            if !argv.is_empty() {
                self.alert_command = Some(argv);
            }
        }
        if let Some(path) = non_empty_env("SENTINEL_FONT_PATH") {
            self.font_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Check cross-field constraints. Also run after CLI overrides.
    pub fn validate(&self) -> Result<()> {
        self.server
            .addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("invalid listen address '{}': {}", self.server.addr, e))?;
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!(
                "frame size must be non-zero, got {}x{}",
                self.source.width,
                self.source.height
            ));
        }
        if self.pipeline.detection_interval == 0 {
            return Err(anyhow!("detection_interval must be at least 1"));
        }
        if self.pipeline.frame_delay.is_zero() {
            return Err(anyhow!("frame_delay_ms must be at least 1"));
        }
        if self.server.wait_poll.is_zero() {
            return Err(anyhow!("wait_poll_ms must be at least 1"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be within 1..=100"));
        }
        if !(0.0..=1.0).contains(&self.detector.score_threshold) {
            return Err(anyhow!("score_threshold must be within 0..=1"));
        }
        if self.detector.max_results == 0 {
            return Err(anyhow!("max_results must be at least 1"));
        }
        if !BACKEND_NAMES.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {:?})",
                self.detector.backend,
                BACKEND_NAMES
            ));
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(anyhow!("detector 'tract' requires a model path"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_whitespace(value: &str) -> Vec<String> {
    value.split_whitespace().map(|entry| entry.to_string()).collect()
}
