//! Tokmeter
//!
//! Runs a program with its HTTP(S) traffic routed through an
//! interception proxy and reports the token usage and cost of the LLM
//! API calls it made

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tokmeter::config::{MonitorSettings, PricingTable};
use tokmeter::intercept::{allocate_port, HttpIntercept};
use tokmeter::services::{BeamClient, CostCalculator, MonitorSession, MonitoredCommand};
use tokmeter::utils::report;

/// Monitor a program's LLM API token usage and cost
#[derive(Parser, Debug)]
#[command(name = "tokmeter", version, about)]
struct Cli {
    /// Pricing table JSON file (defaults to the bundled table)
    #[arg(long, value_name = "FILE")]
    pricing: Option<PathBuf>,

    /// Write the usage summary as JSON to this file
    #[arg(long, value_name = "FILE")]
    json_out: Option<PathBuf>,

    /// Remote collector base URL for live usage beaming
    #[arg(long, value_name = "URL")]
    beam: Option<String>,

    /// Target API URL prefix to account (overrides TOKMETER_TARGET_URL)
    #[arg(long, value_name = "URL")]
    target_url: Option<String>,

    /// Program to monitor, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, value_name = "PROGRAM [ARGS]...")]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    let cli = Cli::parse();

    let mut settings = MonitorSettings::new().context("Failed to load settings")?;
    if let Some(target_url) = &cli.target_url {
        settings.target.url_prefix = target_url.clone();
    }

    let pricing =
        PricingTable::load(cli.pricing.as_deref()).context("Failed to load pricing table")?;
    info!("Pricing table loaded ({} models)", pricing.len());

    let (program, args) = match cli.command.split_first() {
        Some(parts) => parts,
        None => anyhow::bail!("No program to monitor was given"),
    };
    let command = MonitoredCommand {
        program: program.clone(),
        args: args.to_vec(),
    };

    // One explicit port allocation at session start
    let port = allocate_port(&settings.proxy.host, settings.proxy.port_start)
        .context("Failed to allocate a proxy port")?;
    let listen: SocketAddr = format!("{}:{}", settings.proxy.host, port)
        .parse()
        .context("Invalid proxy listen address")?;
    let intercept = HttpIntercept::new(
        listen,
        settings.target.url_prefix.clone(),
        settings.proxy.ca_cert_path.clone(),
    );

    let beam = match &cli.beam {
        Some(url) => Some(BeamClient::new(url, command.invocation())?),
        None => None,
    };

    let calculator = CostCalculator::new(pricing);

    // Operator interrupt is a cooperative signal; the session finishes
    // with whatever history it has collected
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping session");
            interrupt.cancel();
        }
    });

    info!("Monitoring token costs for: {}", command.invocation());
    let session = MonitorSession::new(
        settings,
        intercept,
        calculator.clone(),
        beam.clone(),
        cancel,
    );
    let conversation = session.run(&command).await?;

    match calculator.summarize(conversation.id, &conversation.round_trips)? {
        Some(summary) => {
            println!("{}", report::render_report(&command.invocation(), &summary));

            if let Some(path) = &cli.json_out {
                report::write_summary_json(path, &summary)?;
                info!("Usage summary written to {}", path.display());
            }

            if let Some(beam) = &beam {
                if let Err(e) = beam.send_summary(&summary).await {
                    warn!("{}", e);
                }
            }
        }
        None => println!("[tokmeter] No API calls detected."),
    }

    Ok(())
}

/// Initialize logging system
fn init_logging() {
    // Get log level from environment variable, default to info
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    // Check if JSON format should be used
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if log_format == "json" {
        // JSON format logs (production environment)
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .finish(),
        )
    } else {
        // Human readable format (development environment)
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .finish(),
        )
    };

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}
