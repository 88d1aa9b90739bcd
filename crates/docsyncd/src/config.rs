//! Daemon configuration: command line, environment and TOML file

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_TCP_PORT: u16 = 4000;
pub const DEFAULT_WS_PORT: u16 = 4001;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_CHECKPOINT_SECS: u64 = 5;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// docsync Daemon - collaborative document sync server
#[derive(Parser, Debug)]
#[command(name = "docsyncd")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TCP port to listen on [default: 4000]
    #[arg(long, env = "DOCSYNC_TCP_PORT")]
    pub tcp_port: Option<u16>,

    /// WebSocket port to listen on [default: 4001]
    #[arg(long, env = "DOCSYNC_WS_PORT")]
    pub ws_port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "DOCSYNC_BIND")]
    pub bind: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "DOCSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long, env = "DOCSYNC_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Disable TCP server
    #[arg(long)]
    pub no_tcp: bool,

    /// Disable WebSocket server
    #[arg(long)]
    pub no_ws: bool,

    /// SQLite database path for persistence (default: in-memory only)
    #[arg(long, env = "DOCSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Seconds between checkpoints of edited documents [default: 5]
    #[arg(long, env = "DOCSYNC_CHECKPOINT_SECS")]
    pub checkpoint_secs: Option<u64>,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "DOCSYNC_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Contents of the `--config` file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
    pub metrics: MetricsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<String>,
    pub tcp_port: Option<u16>,
    pub ws_port: Option<u16>,
    pub tcp: Option<bool>,
    pub websocket: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub db: Option<PathBuf>,
    pub checkpoint_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsSection {
    pub port: Option<u16>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Effective daemon settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind: String,
    pub tcp_port: u16,
    pub ws_port: u16,
    pub tcp: bool,
    pub websocket: bool,
    pub db: Option<PathBuf>,
    pub checkpoint_interval: Duration,
    pub log_level: String,
    pub metrics_port: Option<u16>,
}

impl Settings {
    /// Flags and environment win over the file, the file wins over defaults
    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self> {
        let checkpoint_secs = args
            .checkpoint_secs
            .or(file.storage.checkpoint_secs)
            .unwrap_or(DEFAULT_CHECKPOINT_SECS);
        if checkpoint_secs == 0 {
            bail!("checkpoint interval must be at least one second");
        }

        let settings = Self {
            bind: args
                .bind
                .clone()
                .or(file.server.bind)
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            tcp_port: args.tcp_port.or(file.server.tcp_port).unwrap_or(DEFAULT_TCP_PORT),
            ws_port: args.ws_port.or(file.server.ws_port).unwrap_or(DEFAULT_WS_PORT),
            tcp: !args.no_tcp && file.server.tcp.unwrap_or(true),
            websocket: !args.no_ws && file.server.websocket.unwrap_or(true),
            db: args.db.clone().or(file.storage.db),
            checkpoint_interval: Duration::from_secs(checkpoint_secs),
            log_level: args
                .log_level
                .clone()
                .or(file.logging.level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            metrics_port: args.metrics_port.or(file.metrics.port),
        };

        if !settings.tcp && !settings.websocket {
            bail!("At least one transport must be enabled");
        }
        Ok(settings)
    }

    pub fn tcp_addr(&self) -> Result<SocketAddr> {
        socket_addr(&self.bind, self.tcp_port)
    }

    pub fn ws_addr(&self) -> Result<SocketAddr> {
        socket_addr(&self.bind, self.ws_port)
    }

    pub fn metrics_addr(&self) -> Option<Result<SocketAddr>> {
        self.metrics_port.map(|port| socket_addr(&self.bind, port))
    }
}

fn socket_addr(bind: &str, port: u16) -> Result<SocketAddr> {
    format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}", bind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["docsyncd"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&args(&[]), FileConfig::default()).unwrap();
        assert_eq!(settings.tcp_port, 4000);
        assert_eq!(settings.ws_port, 4001);
        assert_eq!(settings.checkpoint_interval, Duration::from_secs(5));
        assert!(settings.tcp && settings.websocket);
        assert_eq!(settings.db, None);
        assert!(settings.metrics_addr().is_none());
    }

    #[test]
    fn test_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
tcp_port = 5000
ws_port = 5001
websocket = false

[storage]
db = "docs.db"
checkpoint_secs = 30
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        let settings = Settings::resolve(&args(&["--tcp-port", "6000"]), config).unwrap();

        assert_eq!(settings.tcp_port, 6000);
        assert_eq!(settings.ws_port, 5001);
        assert!(!settings.websocket);
        assert_eq!(settings.db, Some(PathBuf::from("docs.db")));
        assert_eq!(settings.checkpoint_interval, Duration::from_secs(30));
        assert_eq!(settings.tcp_addr().unwrap(), "0.0.0.0:6000".parse().unwrap());
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = FileConfig::parse(include_str!("../config/docsyncd.toml")).unwrap();
        assert_eq!(config.server.tcp_port, Some(4000));
        assert_eq!(config.storage.db, None);
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(FileConfig::parse("[server]\nport = 1\n").is_err());
        let zero_interval = args(&["--checkpoint-secs", "0"]);
        assert!(Settings::resolve(&zero_interval, FileConfig::default()).is_err());
        assert!(Settings::resolve(&args(&["--no-tcp", "--no-ws"]), FileConfig::default()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileConfig::load(&dir.path().join("absent.toml")).is_err());
    }
}
