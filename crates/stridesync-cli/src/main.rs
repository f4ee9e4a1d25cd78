//! stridesync CLI - sync, inspect, and repair training data from a
//! terminal.
//!
//! The mobile apps drive the same `AppContext`; this binary exists for
//! headless use (cron-driven syncs, debugging a device that won't sync)
//! and as the reference wiring of the core library.

use std::io;

use anyhow::Result;
use stridesync_core::{AppContext, Config};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Set up logging with environment-based filter
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn print_usage() {
    eprintln!("Usage: stridesync <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  sync      Load cached data, force a refresh, drain pending uploads");
    eprintln!("  status    Show cache ages and pending upload count");
    eprintln!("  drain     Retry pending uploads");
    eprintln!("  clear     Clear all cached data and cancel background work");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let command = match args.get(1) {
        Some(c) => c.as_str(),
        None => {
            print_usage();
            return Ok(());
        }
    };

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    let ctx = AppContext::new(config)?;

    match command {
        "sync" => run_sync(&ctx).await,
        "status" => run_status(&ctx).await,
        "drain" => run_drain(&ctx).await,
        "clear" => run_clear(&ctx).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

async fn run_sync(ctx: &AppContext) -> Result<()> {
    info!("Starting sync");
    ctx.initialize_all().await?;

    if ctx.refresh_all().await {
        println!("Sync complete");
    } else {
        println!("Sync failed - serving cached data");
    }

    let status = ctx.status().await;
    println!(
        "activities: {} | profile: {} | pending uploads: {}",
        status.activity_cache_age, status.profile_cache_age, status.pending_uploads
    );
    Ok(())
}

async fn run_status(ctx: &AppContext) -> Result<()> {
    let status = ctx.status().await;
    println!("Activity cache:  {}", status.activity_cache_age);
    println!("Profile cache:   {}", status.profile_cache_age);
    println!("Pending uploads: {}", status.pending_uploads);
    println!(
        "Session:         {}",
        if ctx.session.is_valid() { "valid" } else { "expired" }
    );
    Ok(())
}

async fn run_drain(ctx: &AppContext) -> Result<()> {
    let report = ctx.activities.drain_uploads().await;
    println!(
        "Drained {}/{} pending uploads ({} dropped)",
        report.delivered, report.attempted, report.dropped
    );
    Ok(())
}

async fn run_clear(ctx: &AppContext) -> Result<()> {
    ctx.clear_all_data().await?;
    println!("All cached data cleared");
    Ok(())
}
