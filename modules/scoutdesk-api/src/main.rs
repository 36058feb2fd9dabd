use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scoutdesk_common::Config;
use scoutdesk_scout::scheduling::{Dispatcher, Scheduler};
use scoutdesk_scout::store::PgStore;
use scoutdesk_scout::workflows::ScoutDeps;

mod auth;
mod rest;

/// Runs whose heartbeat is older than this at startup belong to a dead process.
const RESUME_GRACE_MINUTES: i64 = 15;

pub struct AppState {
    pub scheduler: Scheduler,
    pub api_token: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("scoutdesk=info".parse()?))
        .init();

    let config = Config::from_env()?;
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    PgStore::new(pool.clone()).migrate().await?;

    let deps = Arc::new(ScoutDeps::from_config(pool, &config));

    let dispatcher = Arc::new(Dispatcher::new(
        deps.clone(),
        config.queue_batch_size,
        Duration::from_secs(config.queue_visibility_secs),
    ));
    let stale_before = Utc::now() - chrono::Duration::minutes(RESUME_GRACE_MINUTES);
    match dispatcher.resume_incomplete(stale_before).await {
        Ok(resumed) => info!(resumed = resumed.len(), "Incomplete scout runs resumed"),
        Err(e) => warn!(error = %e, "Could not list incomplete scout runs"),
    }

    let idle = Duration::from_secs(config.queue_poll_secs);
    tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.run_forever(idle).await }
    });

    let cron = Scheduler::new(deps.store.clone(), deps.queue.clone(), config.run_all_batch_size);
    tokio::spawn(cron_loop(cron, Duration::from_secs(config.cron_interval_secs)));

    let state = Arc::new(AppState {
        scheduler: Scheduler::new(deps.store.clone(), deps.queue.clone(), config.run_all_batch_size),
        api_token: config.scout_api_token.clone(),
    });
    let app = rest::router(state);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Scoutdesk starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Tick the scheduler every `period`, starting immediately.
async fn cron_loop(scheduler: Scheduler, period: Duration) {
    info!(period_secs = period.as_secs(), "Starting scout cron loop");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = scheduler.tick(Utc::now()).await {
            warn!(error = %e, "Cron tick failed");
        }
    }
}
