#![deny(unsafe_code)]
#![deny(clippy::all)]
//! `attest` — offline verifier for signed audit logs.
//!
//! Reads a log of one-JSON-line audit events, recomputes every signature
//! with the provided key and checks the chain links. Exit codes are
//! scriptable: `0` verified clean, `2` at least one signature mismatch,
//! `3` signatures fine but the chain is broken.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use attest_audit::{SigningKey, VerifyOutcome, verify_file};

/// Attest — tamper-evident audit log tooling.
#[derive(Parser)]
#[command(name = "attest")]
#[command(author, version, about = "Tamper-evident audit log tooling")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Verify the signatures and chain links of a persisted log file.
    Verify {
        /// Log file to verify.
        #[arg(default_value = "audit.log")]
        file: PathBuf,

        /// Signing key the log was written with.
        #[arg(long, env = "AUDIT_KEY", default_value = "dev-secret-change-me", hide_env_values = true)]
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Failed to initialize logging: {e}");
    }

    match args.command {
        Command::Verify { file, key } => {
            let report = verify_file(&file, &SigningKey::from(key)).await?;

            println!("{}", format!("File:         {}", file.display()).bold());
            println!("Events:       {}", report.events);
            println!("HMAC OK:      {}", report.hmac_ok.to_string().green());
            let bad = report.hmac_bad.to_string();
            println!(
                "HMAC BAD:     {}",
                if report.hmac_bad > 0 { bad.red().bold() } else { bad.green() }
            );
            let breaks = report.chain_breaks.to_string();
            println!(
                "Chain breaks: {}",
                if report.chain_breaks > 0 { breaks.red().bold() } else { breaks.green() }
            );

            match report.outcome() {
                VerifyOutcome::Valid => {
                    println!("{}", "Log verified: every signature and chain link checks out".green().bold());
                },
                VerifyOutcome::SignatureMismatch => {
                    println!("{}", "TAMPERING DETECTED: signature mismatch".red().bold());
                    std::process::exit(2);
                },
                VerifyOutcome::ChainBroken => {
                    println!("{}", "TAMPERING DETECTED: chain broken (events deleted or reordered)".red().bold());
                    std::process::exit(3);
                },
            }
        },
    }

    Ok(())
}
