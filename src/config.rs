use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the widget server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Full URL of the engine's chat endpoint. When unset, the scripted
    /// in-process questionnaire is used instead.
    pub engine_url: Option<String>,
    pub engine_timeout: Duration,
    pub session_ttl: Duration,
    pub enable_cors: bool,
    /// Directory checked for page/script overrides before falling back to
    /// the embedded assets.
    pub assets_dir: PathBuf,
    /// Browser-side pause between the "computing" notice and the report.
    pub reveal_delay_ms: u64,
}

#[derive(Debug, Parser)]
#[command(name = "zakaut-gui", version, about = "Eligibility chat widget server")]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Socket address to listen on.
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// URL of the remote engine's chat endpoint.
    #[arg(long)]
    pub engine_url: Option<String>,
}

/// Optional TOML file shape; every key may be omitted.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind_addr: Option<SocketAddr>,
    engine_url: Option<String>,
    engine_timeout_ms: Option<u64>,
    session_ttl_secs: Option<u64>,
    enable_cors: Option<bool>,
    assets_dir: Option<PathBuf>,
    reveal_delay_ms: Option<u64>,
}

impl AppConfig {
    /// Layered load: defaults, then the config file, then environment
    /// variables, then CLI flags.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {path:?}"))?;
                toml::from_str::<FileConfig>(&raw)
                    .with_context(|| format!("parsing config file {path:?}"))?
            }
            None => FileConfig::default(),
        };

        let bind_addr: SocketAddr = match (&cli.bind, std::env::var("BIND_ADDR").ok()) {
            (Some(addr), _) => *addr,
            (None, Some(raw)) => raw.parse().context("failed to parse BIND_ADDR")?,
            (None, None) => file
                .bind_addr
                .unwrap_or_else(|| "0.0.0.0:8080".parse().expect("valid default bind addr")),
        };

        let engine_url = cli
            .engine_url
            .clone()
            .or_else(|| std::env::var("ENGINE_URL").ok())
            .or(file.engine_url);

        let engine_timeout = std::env::var("ENGINE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .or(file.engine_timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(10));

        let session_ttl = std::env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .or(file.session_ttl_secs)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(0));

        let enable_cors = std::env::var("ENABLE_CORS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .ok()
            .or(file.enable_cors)
            .unwrap_or(false);

        let assets_dir = std::env::var("ASSETS_DIR")
            .map(PathBuf::from)
            .ok()
            .or(file.assets_dir)
            .unwrap_or_else(|| PathBuf::from("assets"));

        let reveal_delay_ms = std::env::var("REVEAL_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .or(file.reveal_delay_ms)
            .unwrap_or(1500);

        Ok(Self {
            bind_addr,
            engine_url,
            engine_timeout,
            session_ttl,
            enable_cors,
            assets_dir,
            reveal_delay_ms,
        })
    }
}
