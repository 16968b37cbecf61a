//! CLI entry point for Snapshot.
//!
//! This binary provides the `snapshot` command: save images with an expiry,
//! list and delete them, and sweep expired ones once or continuously.

mod cli;
mod helpers;

use anyhow::{Context, Result, bail};
use clap::Parser;
use snapshot_store::{Clock, ExpirySweeper, FsImageManager};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::cli::{Cli, Commands, ExpiryArgs};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    helpers::init_tracing(&cli.log_level);

    let config = helpers::load_config(&cli)?;
    let mut images = FsImageManager::open(&config);
    let report = images.setup();
    if report.degraded {
        warn!("image store is unavailable; showing no images");
    }

    match cli.command {
        Commands::Save { path, expiry } => cmd_save(&mut images, &path, &expiry),
        Commands::List { json } => cmd_list(&images, json),
        Commands::Show { file_name, out } => cmd_show(&mut images, &file_name, &out),
        Commands::Delete { file_names } => cmd_delete(&mut images, &file_names),
        Commands::Expire => cmd_expire(&mut images),
        Commands::Watch => cmd_watch(images, config.sweep_interval()).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn cmd_save(
    images: &mut FsImageManager,
    path: &std::path::Path,
    expiry: &ExpiryArgs,
) -> Result<()> {
    let request = expiry.to_request()?;
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;

    let record = images
        .save_for(&bytes, &request)
        .context("failed to save image")?;

    println!("{}", record.file_name);
    println!("  {}", record.remaining_text(images.clock().now()));
    Ok(())
}

fn cmd_list(images: &FsImageManager, json: bool) -> Result<()> {
    let now = images.clock().now();
    if json {
        println!("{}", helpers::render_json(images.list(), now)?);
    } else {
        print!("{}", helpers::render_table(images.list(), now));
    }
    Ok(())
}

fn cmd_show(
    images: &mut FsImageManager,
    file_name: &str,
    out: &std::path::Path,
) -> Result<()> {
    let bytes = images
        .load_image(file_name)
        .with_context(|| format!("failed to read image {file_name}"))?;
    std::fs::write(out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;
    println!("{} bytes written to {}", bytes.len(), out.display());
    Ok(())
}

fn cmd_delete(images: &mut FsImageManager, file_names: &[String]) -> Result<()> {
    let mut unknown = Vec::new();
    for name in file_names {
        if !images.set_selected(name, true) {
            unknown.push(name.as_str());
        }
    }

    let report = images.delete_selected();
    for (name, err) in &report.failed {
        eprintln!("  failed: {name}: {err}");
    }
    for name in &unknown {
        eprintln!("  not found: {name}");
    }
    println!("Deleted {} image(s).", report.count());

    if !report.failed.is_empty() || !unknown.is_empty() {
        bail!(
            "{} image(s) could not be deleted",
            report.failed.len() + unknown.len()
        );
    }
    Ok(())
}

fn cmd_expire(images: &mut FsImageManager) -> Result<()> {
    let removed = images.expire_now();
    for name in &removed {
        println!("{name}");
    }
    println!("Removed {} expired image(s).", removed.len());
    Ok(())
}

async fn cmd_watch(images: FsImageManager, interval: std::time::Duration) -> Result<()> {
    let shared = Arc::new(Mutex::new(images));
    let sweeper = ExpirySweeper::start(Arc::clone(&shared), interval);
    info!(interval_secs = interval.as_secs(), "watching for expired images, Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("interrupt received, stopping sweeper");
    sweeper.stop().await.context("sweeper did not stop cleanly")?;

    if let Ok(mut images) = shared.lock() {
        images.teardown();
    }
    Ok(())
}
