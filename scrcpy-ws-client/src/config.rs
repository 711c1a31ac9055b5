//! Mirroring client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use scrcpy_ws_core::pipeline::{PipelineConfig, PixelFormat};
use scrcpy_ws_core::protocol::VideoSettings;

/// Top-level configuration for the mirroring client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    /// What the device is asked to encode.
    pub video: VideoConfig,
    /// External decoder supervision.
    pub decoder: DecoderConfig,
    pub stream: StreamConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// WebSocket endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Bridge URL, e.g. `ws://127.0.0.1:8000/?action=proxy-adb&remote=tcp:8886&udid=emulator-5554`.
    pub url: String,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Receive wait before re-checking the running flag, in milliseconds.
    pub recv_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub bitrate: u32,
    pub max_fps: u32,
    pub i_frame_interval: i8,
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// ffmpeg executable, looked up on `PATH` when not absolute.
    pub ffmpeg: PathBuf,
    pub threads: u32,
    /// `bgr24`, `rgb24` or `bgra`.
    pub pixel_format: String,
    pub read_timeout_ms: u64,
    pub max_failures: u32,
    pub restart_interval_secs: u64,
    pub terminate_grace_ms: u64,
    pub settle_ms: u64,
    pub max_launch_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Compaction threshold for the in-memory stream, in MiB.
    pub max_buffer_mb: usize,
    /// Raw Annex-B dump of every video payload. Empty to disable.
    pub record_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Last good frame written here as PPM on exit. Empty to disable.
    pub snapshot_path: String,
    /// Seconds between stats log lines.
    pub stats_interval_secs: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/?action=proxy-adb&remote=tcp%3A8886&udid=emulator-5554"
                .into(),
            connect_timeout_ms: 10_000,
            recv_timeout_ms: 1000,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            bitrate: 5_024_288,
            max_fps: 24,
            i_frame_interval: 5,
            width: 540,
            height: 960,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            threads: 4,
            pixel_format: "bgr24".into(),
            read_timeout_ms: 200,
            max_failures: 5,
            restart_interval_secs: 30,
            terminate_grace_ms: 1000,
            settle_ms: 200,
            max_launch_attempts: 3,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_buffer_mb: 5,
            record_path: String::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_path: String::new(),
            stats_interval_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    // ── Conversions into core types ──────────────────────────────

    pub fn video_settings(&self) -> VideoSettings {
        VideoSettings {
            bitrate: self.video.bitrate,
            max_fps: self.video.max_fps,
            i_frame_interval: self.video.i_frame_interval,
            width: self.video.width,
            height: self.video.height,
        }
    }

    /// Pipeline bounds. An unknown pixel format falls back to BGR24.
    pub fn pipeline(&self) -> PipelineConfig {
        let d = &self.decoder;
        let pixel_format = PixelFormat::from_name(&d.pixel_format).unwrap_or_else(|| {
            tracing::warn!("unknown pixel format {:?}; using bgr24", d.pixel_format);
            PixelFormat::Bgr24
        });
        PipelineConfig {
            pixel_format,
            read_timeout: Duration::from_millis(d.read_timeout_ms),
            max_failures: d.max_failures.max(1),
            restart_interval: Duration::from_secs(d.restart_interval_secs),
            terminate_grace: Duration::from_millis(d.terminate_grace_ms),
            settle_delay: Duration::from_millis(d.settle_ms),
            max_launch_attempts: d.max_launch_attempts.max(1),
            ..PipelineConfig::default()
        }
    }

    pub fn max_buffer_bytes(&self) -> usize {
        self.stream.max_buffer_mb.max(1) * 1024 * 1024
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.connect_timeout_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.recv_timeout_ms.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.output.stats_interval_secs.max(1))
    }

    pub fn record_path(&self) -> Option<PathBuf> {
        non_empty(&self.stream.record_path)
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        non_empty(&self.output.snapshot_path)
    }
}

fn non_empty(s: &str) -> Option<PathBuf> {
    let s = s.trim();
    (!s.is_empty()).then(|| PathBuf::from(s))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        assert!(text.contains("[connection]"));
        assert!(text.contains("bitrate = 5024288"));
        assert!(text.contains("restart_interval_secs = 30"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.video.width, 540);
        assert_eq!(parsed.decoder.max_failures, 5);
        assert_eq!(parsed.connection.recv_timeout_ms, 1000);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: ClientConfig = toml::from_str(
            r#"
            [video]
            max_fps = 60

            [decoder]
            pixel_format = "bgra"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.video.max_fps, 60);
        assert_eq!(parsed.video.bitrate, 5_024_288);
        assert_eq!(parsed.pipeline().pixel_format, PixelFormat::Bgra);
        assert_eq!(parsed.pipeline().read_timeout, Duration::from_millis(200));
    }

    #[test]
    fn unknown_pixel_format_falls_back() {
        let mut cfg = ClientConfig::default();
        cfg.decoder.pixel_format = "yuv420p".into();
        assert_eq!(cfg.pipeline().pixel_format, PixelFormat::Bgr24);
    }

    #[test]
    fn load_and_write_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrcpy-ws.toml");

        // missing file → defaults
        let cfg = ClientConfig::load(&path);
        assert!(cfg.record_path().is_none());

        ClientConfig::write_default(&path).unwrap();
        let cfg = ClientConfig::load(&path);
        assert_eq!(cfg.video_settings().height, 960);

        std::fs::write(&path, "[stream\nbroken").unwrap();
        let cfg = ClientConfig::load(&path);
        assert_eq!(cfg.max_buffer_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn optional_paths() {
        let mut cfg = ClientConfig::default();
        cfg.output.snapshot_path = "  last.ppm ".into();
        assert_eq!(cfg.snapshot_path(), Some(PathBuf::from("last.ppm")));
        assert!(cfg.record_path().is_none());
    }
}
