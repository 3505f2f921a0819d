//! Codepair - pairing-code console
//!
//! Hosts one pairing store, one session registry and a background reaper
//! in-process, and drives them from commands typed on stdin.

mod console;

use anyhow::{Context, Result};
use clap::Parser;
use codepair_auth::{PairingStore, Reaper, SessionRegistry};
use codepair_core::PairingConfig;
use console::{Command, Console, HELP};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Codepair - issue and redeem single-use pairing codes
#[derive(Parser, Debug)]
#[command(name = "codepair")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pairing code lifetime in seconds
    #[arg(long)]
    code_ttl: Option<u64>,

    /// Seconds between background sweeps
    #[arg(long)]
    reap_interval: Option<u64>,

    /// Only this source may issue codes (repeatable)
    #[arg(long = "allow-source")]
    allow_source: Vec<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Load the configuration file if given, then apply flag overrides
    fn pairing_config(&self) -> Result<PairingConfig> {
        let mut config = match &self.config {
            Some(path) => PairingConfig::from_json_file(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))?,
            None => PairingConfig::default(),
        };

        if let Some(secs) = self.code_ttl {
            config = config.with_code_ttl_secs(secs);
        }
        if let Some(secs) = self.reap_interval {
            config = config.with_reap_interval_secs(secs);
        }
        if !self.allow_source.is_empty() {
            config = config.with_allowed_sources(self.allow_source.iter().cloned());
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("Codepair v{}", env!("CARGO_PKG_VERSION"));

    let config = args.pairing_config()?;
    debug!("Configuration: {:?}", config);

    let store = PairingStore::new(config.clone());
    let sessions = SessionRegistry::new(&config);
    let reaper = Reaper::new(store.clone(), config.reap_interval())
        .with_sessions(sessions.clone())
        .spawn();

    match &config.allowed_sources {
        Some(sources) => info!("Issuance restricted to sources: {}", sources.join(", ")),
        None => info!("Issuance open to any source"),
    }

    let console = Console::new(store, sessions);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    stdout.write_all(format!("{}\n", HELP).as_bytes()).await?;
    stdout.flush().await?;

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
            line = lines.next_line() => line?,
        };

        // stdin closed
        let Some(line) = line else { break };

        let output = match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => console.execute(command).await,
            Err(message) => message,
        };

        if !output.is_empty() {
            stdout.write_all(format!("{}\n", output).as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    reaper.shutdown().await;
    info!("Goodbye!");
    Ok(())
}
