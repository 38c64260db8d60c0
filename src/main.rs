//! AIR Trust - runtime trust layer for AI agents
//!
//! Command-line access to the detectors, the consent gate, event log replay
//! and offline verification of exported audit ledgers.

use air_trust::{
    config::AirTrustConfig,
    consent::ConsentGate,
    crypto::SigningKey,
    injection::InjectionDetector,
    ledger::{AuditLedger, ExportRecord},
    patterns::Sensitivity,
    replay,
    vault::DataVault,
    TrustEngine,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "air-trust")]
#[command(version)]
#[command(about = "Runtime trust layer for AI agent tool and model calls")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "AIR_TRUST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan text for prompt injection
    Scan {
        /// Text to scan
        text: String,

        /// Override the configured sensitivity (low, medium, high)
        #[arg(long)]
        sensitivity: Option<Sensitivity>,
    },

    /// Tokenize secrets and PII in text
    Tokenize {
        /// Text to tokenize
        text: String,
    },

    /// Show the risk tier and consent decision for a tool
    CheckTool {
        /// Tool name
        name: String,

        /// Run to evaluate for
        #[arg(long, default_value = "cli")]
        run_id: String,
    },

    /// Drive the engine from a JSON-lines event log
    Replay {
        /// Event log path
        events: PathBuf,

        /// Write the exported ledger here
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Sign with a random key instead of the configured one
        #[arg(long)]
        ephemeral_key: bool,
    },

    /// Verify an exported ledger with the configured signing key
    Verify {
        /// Exported ledger (JSON array of records)
        export: PathBuf,

        /// Signature the first record links to, for rotated segments
        #[arg(long)]
        anchor: Option<String>,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("AIR_TRUST_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| format!("air_trust={}", level).into());

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = match &cli.config {
        Some(path) => AirTrustConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AirTrustConfig::default(),
    };

    match cli.command {
        Commands::Scan { text, sensitivity } => run_scan(config, &text, sensitivity)?,
        Commands::Tokenize { text } => run_tokenize(&config, &text)?,
        Commands::CheckTool { name, run_id } => run_check_tool(&config, &name, &run_id)?,
        Commands::Replay {
            events,
            out,
            ephemeral_key,
        } => run_replay(config, events, out, ephemeral_key).await?,
        Commands::Verify { export, anchor } => run_verify(&config, export, anchor).await?,
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

fn run_scan(
    mut config: AirTrustConfig,
    text: &str,
    sensitivity: Option<Sensitivity>,
) -> Result<()> {
    if let Some(sensitivity) = sensitivity {
        config.injection_detection.sensitivity = sensitivity;
    }
    let detector = InjectionDetector::new(&config.injection_detection)?;
    let result = detector.scan(text);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_tokenize(config: &AirTrustConfig, text: &str) -> Result<()> {
    let vault = DataVault::new(&config.vault)?;
    let result = vault.tokenize(text);
    println!("{}", result.text);
    println!();
    println!("{}", serde_json::to_string_pretty(&vault.stats())?);
    Ok(())
}

fn run_check_tool(config: &AirTrustConfig, name: &str, run_id: &str) -> Result<()> {
    let gate = ConsentGate::new(&config.consent_gate);
    let decision = gate.evaluate(name, run_id);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

async fn run_replay(
    config: AirTrustConfig,
    events: PathBuf,
    out: Option<PathBuf>,
    ephemeral_key: bool,
) -> Result<()> {
    let engine = if ephemeral_key {
        tracing::warn!("Signing with an ephemeral key; the export cannot be verified later");
        TrustEngine::with_key(config, SigningKey::generate())?
    } else {
        TrustEngine::new(config).context(
            "no signing key; set the variable named by audit_ledger.signing_key_env or pass --ephemeral-key",
        )?
    };

    let summary = replay::replay_file(&engine, &events)
        .await
        .with_context(|| format!("replaying {}", events.display()))?;

    let records = engine.export_audit()?;
    let export = serde_json::to_string_pretty(&records)?;
    match out {
        Some(path) => {
            tokio::fs::write(&path, export).await?;
            tracing::info!(path = %path.display(), entries = records.len(), "Ledger exported");
        }
        None => println!("{}", export),
    }

    let verification = engine.verify_chain();
    eprintln!(
        "{} events, {} proceeded, {} blocked, {} entries (chain valid: {})",
        summary.events,
        summary.proceeded,
        summary.blocked,
        summary.entries_appended,
        verification.valid
    );
    Ok(())
}

async fn run_verify(config: &AirTrustConfig, export: PathBuf, anchor: Option<String>) -> Result<()> {
    let key = SigningKey::from_env(&config.audit_ledger.signing_key_env)?;
    let content = tokio::fs::read_to_string(&export)
        .await
        .with_context(|| format!("reading {}", export.display()))?;
    let records: Vec<ExportRecord> = serde_json::from_str(&content)?;

    let ledger = match anchor {
        Some(anchor) => AuditLedger::import_with_anchor(key, &anchor, records)?,
        None => AuditLedger::import(key, records)?,
    };
    let verification = ledger.verify_chain();
    println!("{}", serde_json::to_string_pretty(&verification)?);

    if !verification.valid {
        anyhow::bail!(
            "audit chain broken at entry {}",
            verification
                .first_invalid_index
                .map(|i| i.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
    }
    Ok(())
}

fn show_config(config: Option<&AirTrustConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    println!("{}", config.to_toml_string()?);
    Ok(())
}
