use anyhow::{anyhow, Context, Result};
use clap::Parser;
use indexmap::IndexMap;
use ledgrid_matrix_lib::{LedMatrix, MatrixRegistry, SharedStrip};
use log::{info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

mod config;
mod pins;
mod self_test;
mod strip;
mod web_server;

use config::{Config, LogLevel, DEFAULT_CONFIG_PATH};
use strip::Strip;

/// Drive LED block matrices over HTTP
#[derive(Parser, Debug)]
#[command(name = "ledgrid", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Address to listen on, overrides the config file
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log level, overrides the config file
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

/// Everything request handlers and shutdown need
pub struct State {
    pub registry: MatrixRegistry,
    pub strips: IndexMap<String, SharedStrip>,
}

impl State {
    /// Build strips, then the matrices on them.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut strips = IndexMap::new();
        for strip_config in &config.strips {
            if strips.contains_key(&strip_config.identifier) {
                warn!("Strip '{}' defined twice, keeping the first definition", strip_config.identifier);
                continue;
            }
            let strip = Strip::from_config(strip_config)
                .with_context(|| format!("Invalid strip '{}'", strip_config.identifier))?;
            strips.insert(strip_config.identifier.clone(), SharedStrip::new(strip));
        }

        let mut registry = MatrixRegistry::new();
        for matrix_config in &config.blocks {
            let strip = strips.get(&matrix_config.strip_name).ok_or_else(|| {
                anyhow!(
                    "Matrix '{}' uses unknown strip '{}'",
                    matrix_config.name,
                    matrix_config.strip_name
                )
            })?;
            let layout = matrix_config.layout(strip.led_count());
            let matrix = LedMatrix::new(
                matrix_config.name.clone(),
                matrix_config.rows,
                matrix_config.cols,
                layout,
                Some(strip.clone()),
            )?;
            registry.register(matrix);
        }

        info!("Configured {} strips and {} matrices", strips.len(), registry.len());
        Ok(Self { registry, strips })
    }

    /// Halt every matrix, then power down every strip.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        for strip in self.strips.values() {
            strip.power_off().await;
        }
    }
}

fn init_logging(level: LogLevel) {
    // RUST_LOG still supplies per-module directives
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level.as_level_filter())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    init_logging(args.log_level.unwrap_or(config.log_level));
    info!("Loaded config from {}", args.config.display());
    config.validate();

    let state = Arc::new(State::from_config(&config)?);

    let listen = args.listen.unwrap_or(config.listen);
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;
    info!("Web server listening on http://{listen}");

    tokio::select! {
        result = web_server::serve(listener, Arc::clone(&state)) => result?,
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
        }
    }

    state.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
