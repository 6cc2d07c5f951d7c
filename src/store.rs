pub mod firebase;

use std::{
  collections::BTreeMap,
  future::Future,
  sync::{Mutex, MutexGuard},
};

use tracing::debug;

use crate::normalize::model::AggregateSchedule;

/// Where the aggregate schedule lives between ingestion runs.
pub trait ScheduleStore {
  /// Replaces the stored aggregate as a whole.
  fn write_aggregate(
    &self,
    aggregate: &AggregateSchedule,
  ) -> impl Future<Output = miette::Result<()>> + Send;

  fn read_aggregate(
    &self,
    key: &str,
  ) -> impl Future<Output = miette::Result<Option<AggregateSchedule>>> + Send;
}

/// Keeps aggregates in process memory. Used for dry runs.
#[derive(Debug)]
pub struct MemoryStore {
  key:        String,
  aggregates: Mutex<BTreeMap<String, AggregateSchedule>>,
}

impl MemoryStore {
  pub fn new(key: &str) -> Self {
    Self {
      key:        key.to_owned(),
      aggregates: Mutex::new(BTreeMap::new()),
    }
  }

  fn lock(
    &self,
  ) -> miette::Result<MutexGuard<'_, BTreeMap<String, AggregateSchedule>>> {
    self
      .aggregates
      .lock()
      .map_err(|_| miette::miette!("memory store lock was poisoned"))
  }
}

impl ScheduleStore for MemoryStore {
  async fn write_aggregate(
    &self,
    aggregate: &AggregateSchedule,
  ) -> miette::Result<()> {
    self.lock()?.insert(self.key.clone(), aggregate.clone());
    debug!(
      key = self.key,
      sheets = aggregate.len(),
      "stored aggregate in memory"
    );
    Ok(())
  }

  async fn read_aggregate(
    &self,
    key: &str,
  ) -> miette::Result<Option<AggregateSchedule>> {
    Ok(self.lock()?.get(key).cloned())
  }
}
