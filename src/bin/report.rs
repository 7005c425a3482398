//! FleetStream activity report
//!
//! One-shot tool that summarizes recent vehicle activity from the
//! warehouse: update counts per vehicle over a time window, most active
//! vehicle first. The window defaults to 60 minutes and can be passed
//! in minutes as the first argument.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;

use fleetstream::config::Config;
use fleetstream::error::{Error, Result};
use fleetstream::logging;
use fleetstream::warehouse::{create_pool, PgPositionRepository, PositionRepository, Repository};

const DEFAULT_WINDOW_MINUTES: i64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_env()?);
    config.validate()?;

    logging::init_tracing(&config.server.log_level, &config.server.environment)?;

    let window_minutes = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<i64>()
            .map_err(|_| Error::config(format!("Invalid window '{}', expected minutes", arg)))?,
        None => DEFAULT_WINDOW_MINUTES,
    };

    info!(window_minutes, "Generating fleet activity report");

    let pool = create_pool(&config.warehouse).await?;
    let repository = PgPositionRepository::new(pool);

    let since = Utc::now() - Duration::minutes(window_minutes);
    let stats = repository.update_stats(since).await?;
    let total_rows = repository.count().await?;

    println!();
    println!("Fleet activity report (last {} minutes)", window_minutes);
    println!("========================================");

    if stats.is_empty() {
        println!("No position updates in the window");
        return Ok(());
    }

    let total_updates: i64 = stats.iter().map(|s| s.update_count).sum();
    let average = total_updates as f64 / stats.len() as f64;

    println!("Vehicles reporting:  {}", stats.len());
    println!("Updates in window:   {}", total_updates);
    println!("Average per vehicle: {:.1}", average);
    println!("Stored rows total:   {}", total_rows);
    println!();

    for entry in &stats {
        println!(
            "  {}  {:>5} updates  first {}  last {}",
            entry.vehicle_id,
            entry.update_count,
            entry.first_update.format("%H:%M:%S"),
            entry.last_update.format("%H:%M:%S"),
        );
    }

    // update_stats orders by activity, so the first entry leads
    if let Some(leader) = stats.first() {
        println!();
        println!(
            "Most active: {} ({} updates)",
            leader.vehicle_id, leader.update_count
        );
    }

    Ok(())
}
