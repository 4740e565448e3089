pub mod models {
    pub mod energy;
    pub mod forecast;
}

pub mod client;
pub mod config;
pub mod db {
    #[cfg(test)]
    pub mod memory;
    pub mod models;
    pub mod pg;
    pub mod store;
}
pub mod env_file;
pub mod schema;
pub mod utils;
pub mod services {
    pub mod aggregate;
    pub mod estimator;
    pub mod fake_data;
    pub mod forecast;
    pub mod progress;
    pub mod realtime;
    pub mod tracking;
}

use crate::client::ForecastClient;
use crate::config::Config;
use crate::db::pg::PgStore;
use crate::db::store::DeviceRegistry;
use crate::models::energy::UserId;
use crate::services::tracking::TrackingRegistry;
use crate::services::{fake_data, forecast, progress, realtime};
use crate::utils::year_month;
use chrono::Utc;
use clap::Parser;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info, warn};
use std::path::PathBuf;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(name = "energy-budget")]
#[command(version, about = "Household electricity usage tracking and budget forecasting")]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| format!("Applying database migrations failed: {}", e))?;
    if applied.is_empty() {
        info!("Database schema is up to date; no migrations were applied");
    } else {
        let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
        info!("Applied {} database migration(s): {}", applied.len(), names);
    }
    Ok(())
}

/// Current month progress and tomorrow's recommendation for one user.
/// Failures are logged; none of them stops the service.
fn report_user(store: &mut PgStore, forecaster: &ForecastClient, cfg: &Config, user: UserId) {
    let now = Utc::now();
    let (year, month) = year_month(now);
    match progress::get_progress(store, user, year, month) {
        Ok(p) => match (p.budget_amount, p.percent_used) {
            (Some(budget), Some(percent)) => info!(
                "User {}: {:04}-{:02} used {:.2} kWh, spent {:.2} of {:.2} {} ({:.1}%, {:?})",
                user,
                year,
                month,
                p.total_kwh,
                p.spent.unwrap_or_default(),
                budget,
                p.currency,
                percent,
                progress::alert_level_for(percent)
            ),
            (Some(budget), None) => info!(
                "User {}: {:04}-{:02} used {:.2} kWh against a budget of {:.2} {} (no price per kWh set)",
                user, year, month, p.total_kwh, budget, p.currency
            ),
            (None, _) => info!(
                "User {}: {:04}-{:02} used {:.2} kWh (no budget set)",
                user, year, month, p.total_kwh
            ),
        },
        Err(e) => warn!("User {}: budget progress unavailable: {}", user, e),
    }

    match forecast::daily_recommendation(store, forecaster, user, now, cfg.default_budget) {
        Ok(rec) => info!(
            "User {}: recommended usage for {} is {:.2} kWh{}",
            user,
            rec.date,
            rec.daily_recommendation_kwh,
            if rec.degraded { " (average of projected days)" } else { "" }
        ),
        Err(forecast::ForecastError::InsufficientHistory { lookback_days }) => {
            info!("User {}: no usage in the last {} days; skipping forecast", user, lookback_days)
        }
        Err(e) => warn!("User {}: {}", user, e),
    }
}

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (forecast_url={}, forecast_timeout={}s, default_budget={}, recompute={}s, persist={}s, max_persist_attempts={}, realtime_interval={}s, realtime_enabled={}, seed_days={})",
        cfg.forecast_url,
        cfg.forecast_timeout.as_secs(),
        cfg.default_budget,
        cfg.cadence.recompute.num_seconds(),
        cfg.cadence.persist.num_seconds(),
        cfg.cadence.max_persist_attempts,
        cfg.realtime_interval.as_secs(),
        cfg.realtime_enabled,
        cfg.seed_synthetic_days
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string()),
    );

    // 2) Connect DB
    let mut conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");

    // 3) Apply pending database migrations
    apply_database_migrations(&mut conn)?;
    let mut store = PgStore::new(conn);

    // 4) Discover users
    let users = store.list_users().map_err(|e| format!("listing users failed: {}", e))?;
    info!("Discovered {} user(s) with registered devices", users.len());

    // 5) Explicit synthetic seeding
    if let Some(days) = cfg.seed_synthetic_days {
        info!("Seeding synthetic history over {} day(s)", days);
        fake_data::run(&mut store, days, Utc::now().date_naive()).map_err(|e| format!("seeding failed: {}", e))?;
    }

    // 6) Startup report
    let forecaster = ForecastClient::new(cfg.forecast_url.clone(), cfg.forecast_timeout);
    for user in &users {
        report_user(&mut store, &forecaster, &cfg, *user);
    }

    // 7) Realtime loop (steady cadence)
    if cfg.realtime_enabled {
        info!(
            "Starting realtime loop: users={}, interval={}s",
            users.len(),
            cfg.realtime_interval.as_secs()
        );
        let mut registry = TrackingRegistry::new(cfg.cadence);
        realtime::run_loop(&mut store, &mut registry, cfg.realtime_interval)?;
    } else {
        info!("Realtime loop disabled via REALTIME_ENABLED={}", cfg.realtime_enabled);
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let loaded_env = match env_file::load(cli.env_file.as_deref()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} variable(s) applied)",
            origin,
            info.path.display(),
            info.applied
        );
    }

    info!(
        "energy-budget {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
