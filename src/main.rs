mod aggregate;
mod config;
mod decode_table;
mod fetch_sheet;
mod normalize;
mod sheet_name;
mod state;
mod store;

use miette::{Context, IntoDiagnostic};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use self::{
  aggregate::Aggregator,
  config::Config,
  fetch_sheet::{SheetFetcher, SheetSource},
  store::{MemoryStore, ScheduleStore, firebase::FirebaseStore},
};

#[tokio::main]
async fn main() -> miette::Result<()> {
  tracing_subscriber::registry()
    .with(fmt::layer())
    .with(EnvFilter::from_default_env())
    .init();

  let config =
    Config::from_env().context("failed to gather config from env")?;
  info!(?config, "loaded config");

  let catalog = sheet_name::catalog(config.catalog_start, config.catalog_end)
    .context("failed to build sheet catalog")?;
  let fetcher =
    SheetFetcher::new(&config.sheets_base_url, config.request_timeout)?;

  match &config.firebase_database_url {
    Some(database_url) => {
      let store = FirebaseStore::new(
        database_url,
        &config.schedule_key,
        config.firebase_auth_token.clone(),
        config.request_timeout,
      )?;
      let aggregator = Aggregator::new(fetcher, store, config.fetch_delay);
      drive(&config, &catalog, &aggregator).await?;
    }
    None => {
      warn!("`FIREBASE_DATABASE_URL` is not set, doing a dry run");
      let store = MemoryStore::new(&config.schedule_key);
      let aggregator = Aggregator::new(fetcher, store, config.fetch_delay);
      drive(&config, &catalog, &aggregator).await?;
      if let Some(aggregate) = aggregator
        .store()
        .read_aggregate(&config.schedule_key)
        .await?
      {
        let json = serde_json::to_string_pretty(&aggregate)
          .into_diagnostic()
          .context("failed to serialize aggregate")?;
        println!("{json}");
      }
    }
  }

  Ok(())
}

/// Runs ingestion once, or on every tick of `INGEST_INTERVAL_SECS` until
/// interrupted.
async fn drive<S: SheetSource, P: ScheduleStore>(
  config: &Config,
  catalog: &[String],
  aggregator: &Aggregator<S, P>,
) -> miette::Result<()> {
  let Some(interval) = config.ingest_interval else {
    aggregator
      .aggregate_all(&config.sheet_id, catalog)
      .await
      .context("failed to ingest sheet catalog")?;
    return Ok(());
  };

  info!(?interval, "ingesting periodically");
  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  loop {
    tokio::select! {
      _ = ticker.tick() => {}
      _ = tokio::signal::ctrl_c() => {
        info!("interrupted, stopping");
        return Ok(());
      }
    }

    if let Err(e) = aggregator.aggregate_all(&config.sheet_id, catalog).await {
      // a malformed catalog will not fix itself between ticks
      error!(error = ?e, "ingestion run failed");
      return Err(e).context("failed to ingest sheet catalog");
    }
  }
}
