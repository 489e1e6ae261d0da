//! Director-based reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http::server ──▶ http::proxy ──▶ director chain ──────────────┐
//!                                    │           correlation                 │
//!                                    │           token exchange              │
//!                                    │           rate limit                  │
//!                                    │           router ─▶ upstream rewrite  │
//!                                    │                                       │
//!                                    │◀──────── cancelled? ◀─────────────────┘
//!                                    │
//!                    error response ◀┴▶ http::transport ──▶ Backend
//! ```
//!
//! Config reloads rebuild the chain and swap it in; the admin API can change
//! rate-limit groups and register extra directors at runtime.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "director-proxy", version)]
#[command(about = "Reverse proxy driven by a chain of request directors", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Watched for changes.
    #[arg(short, long, env = "DIRECTOR_PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    director_proxy::lifecycle::startup::run(args.config.as_deref()).await
}
