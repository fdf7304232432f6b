//! # Overstory - window actions playground
//!
//! Builds the configured outputs, loads the window actions on each and
//! replays a scenario of JSON steps against them. The final stacking state is
//! printed as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::fs::File;
use std::io::{self, BufReader};

use overstory::{OverstoryConfig, ScriptRunner};

#[derive(Parser)]
#[command(name = "overstory")]
#[command(about = "Keep-above, show-desktop and send-to-back window actions on a layered scene")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/overstory/overstory.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Scenario to replay, one JSON step per line. `-` reads stdin
    #[arg(short, long)]
    script: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configuration decides the log level, so report its errors after init
    let loaded = OverstoryConfig::load(&cli.config);
    let debug = cli.debug || loaded.as_ref().map(|c| c.general.debug).unwrap_or(false);
    let filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    info!("🚀 Starting Overstory {}", overstory::VERSION);

    let config = match loaded {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            info!("📝 Using default configuration");
            OverstoryConfig::default()
        }
    };

    if cli.dump_config {
        print!("{}", toml::to_string_pretty(&config).context("Failed to serialize configuration")?);
        return Ok(());
    }

    let mut runner = ScriptRunner::new(&config)?;

    let steps = match cli.script.as_deref() {
        None => 0,
        Some("-") => runner.run(io::stdin().lock())?,
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Failed to open script: {}", path))?;
            runner.run(BufReader::new(file))?
        }
    };
    info!("🎬 Replayed {} steps", steps);

    let snapshot = serde_json::to_string_pretty(&runner.snapshot()).context("Failed to serialize snapshot")?;
    println!("{}", snapshot);

    info!("👋 Overstory shutting down");
    Ok(())
}
