use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::{
  decode_table::{DecodedTable, FormatError, decode},
  fetch_sheet::{FetchError, SheetSource},
  normalize::{
    model::{AggregateSchedule, NormalizedSchedule},
    normalize,
  },
  sheet_name::{SheetIdentity, SheetNameError, parse_sheet_name},
  state::IngestState,
  store::ScheduleStore,
};

/// Why a single sheet was left out of an aggregate.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SheetError {
  #[error(transparent)]
  #[diagnostic(transparent)]
  Fetch(#[from] FetchError),
  #[error(transparent)]
  #[diagnostic(transparent)]
  Format(#[from] FormatError),
}

/// Resolves every catalog entry up front, so a malformed catalog fails
/// before any request is made.
pub fn resolve_catalog(
  catalog: &[String],
) -> Result<Vec<(String, SheetIdentity)>, SheetNameError> {
  catalog
    .iter()
    .map(|name| parse_sheet_name(name).map(|identity| (name.clone(), identity)))
    .collect()
}

/// Walks a sheet catalog and mirrors it into a [`ScheduleStore`].
#[derive(Debug)]
pub struct Aggregator<S, P> {
  source:      S,
  store:       P,
  fetch_delay: Duration,
}

impl<S: SheetSource, P: ScheduleStore> Aggregator<S, P> {
  pub fn new(source: S, store: P, fetch_delay: Duration) -> Self {
    Self {
      source,
      store,
      fetch_delay,
    }
  }

  pub fn store(&self) -> &P {
    &self.store
  }

  /// Fetches, decodes and normalizes every sheet of `catalog` in order, then
  /// writes the result with a single bulk write.
  ///
  /// Sheets that fail to fetch or decode are logged and omitted. Only an
  /// unparseable catalog entry fails the run.
  #[instrument(skip(self, catalog), fields(catalog_len = catalog.len()))]
  pub async fn aggregate_all(
    &self,
    sheet_id: &str,
    catalog: &[String],
  ) -> Result<AggregateSchedule, SheetNameError> {
    let mut state = IngestState::Start {
      catalog: catalog.to_vec(),
    };
    while !state.completed() {
      state = state.step(self, sheet_id).await?;
    }

    let IngestState::Persisted { aggregate } = state else {
      unreachable!("completed ingest state is always persisted")
    };
    info!(sheets = aggregate.len(), "ingestion run completed");
    Ok(aggregate)
  }

  async fn ingest_sheet(
    &self,
    sheet_id: &str,
    sheet_name: &str,
    identity: SheetIdentity,
  ) -> Result<(DecodedTable, NormalizedSchedule), SheetError> {
    let payload = self.source.fetch(sheet_id, sheet_name).await?;
    let table = decode(&payload)?;
    let schedule = normalize(sheet_name, &table, identity);
    Ok((table, schedule))
  }

  /// Processes resolved sheets strictly one after another, pausing between
  /// requests.
  pub(crate) async fn collect(
    &self,
    sheet_id: &str,
    sheets: &[(String, SheetIdentity)],
  ) -> AggregateSchedule {
    let mut aggregate = AggregateSchedule::new();
    let mut seen_tables: Vec<(&str, DecodedTable)> = Vec::new();
    let mut omitted = Vec::new();
    let mut empty = Vec::new();

    for (index, (sheet_name, identity)) in sheets.iter().enumerate() {
      if index > 0 {
        tokio::time::sleep(self.fetch_delay).await;
      }

      let (table, schedule) =
        match self.ingest_sheet(sheet_id, sheet_name, *identity).await {
          Ok(ingested) => ingested,
          Err(e) => {
            warn!(sheet_name, error = ?e, "omitting sheet from aggregate");
            omitted.push(sheet_name.as_str());
            continue;
          }
        };

      if schedule.entry_count() == 0 {
        warn!(
          sheet_name,
          "sheet has no shifts, check that the tab exists under this name"
        );
        empty.push(sheet_name.as_str());
      }
      // Google serves the first tab when the requested one does not exist
      if !table.rows.is_empty() {
        if let Some((other, _)) = seen_tables.iter().find(|(_, t)| *t == table)
        {
          warn!(
            sheet_name,
            identical_to = other,
            "sheet content is identical to another sheet, the tab may be \
             missing"
          );
        }
        seen_tables.push((sheet_name.as_str(), table));
      }

      debug!(
        sheet_name,
        entries = schedule.entry_count(),
        "ingested sheet"
      );
      aggregate.insert(sheet_name.clone(), schedule);
    }

    info!(
      ingested = aggregate.len(),
      ?omitted,
      ?empty,
      "finished walking sheet catalog"
    );
    aggregate
  }

  /// Writes the aggregate. Failures are logged, not returned.
  pub(crate) async fn persist(&self, aggregate: &AggregateSchedule) {
    match self.store.write_aggregate(aggregate).await {
      Ok(()) => info!(sheets = aggregate.len(), "persisted aggregate"),
      Err(e) => error!(error = ?e, "failed to persist aggregate"),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::HashMap, sync::Mutex};

  use chrono::NaiveDate;
  use pretty_assertions::assert_eq;
  use reqwest::StatusCode;

  use super::*;
  use crate::store::MemoryStore;

  fn gviz_payload(rows: &[(&str, f64)]) -> String {
    let rows = rows
      .iter()
      .map(|(name, hours)| {
        format!(r#"{{"c":[{{"v":"{name}"}},{{"v":{hours}}}]}}"#)
      })
      .collect::<Vec<_>>()
      .join(",");
    format!(
      "/*O_o*/\ngoogle.visualization.Query.setResponse({{\"status\":\"ok\",\
       \"table\":{{\"cols\":[{{\"label\":\"\"}},{{\"label\":\"1\"}}],\
       \"rows\":[{rows}]}}}});"
    )
  }

  #[derive(Default)]
  struct FakeSource {
    payloads: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
  }

  impl FakeSource {
    fn with(mut self, sheet_name: &str, payload: String) -> Self {
      self.payloads.insert(sheet_name.to_owned(), payload);
      self
    }

    fn requests(&self) -> Vec<String> {
      self.requests.lock().unwrap().clone()
    }
  }

  impl SheetSource for FakeSource {
    async fn fetch(
      &self,
      sheet_id: &str,
      sheet_name: &str,
    ) -> Result<String, FetchError> {
      assert_eq!(sheet_id, "sheet-id");
      self.requests.lock().unwrap().push(sheet_name.to_owned());
      self
        .payloads
        .get(sheet_name)
        .cloned()
        .ok_or(FetchError::Status {
          sheet_name: sheet_name.to_owned(),
          status:     StatusCode::INTERNAL_SERVER_ERROR,
        })
    }
  }

  struct FailingStore;

  impl ScheduleStore for FailingStore {
    async fn write_aggregate(
      &self,
      _aggregate: &AggregateSchedule,
    ) -> miette::Result<()> {
      miette::bail!("store is down")
    }

    async fn read_aggregate(
      &self,
      _key: &str,
    ) -> miette::Result<Option<AggregateSchedule>> {
      miette::bail!("store is down")
    }
  }

  fn in_memory(source: FakeSource) -> Aggregator<FakeSource, MemoryStore> {
    let store = MemoryStore::new("schedule");
    Aggregator::new(source, store, Duration::from_secs(1))
  }

  fn catalog(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
  }

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[tokio::test(start_paused = true)]
  async fn failed_fetch_omits_only_that_sheet() {
    let source = FakeSource::default()
      .with("Январь 24", gviz_payload(&[("Alice", 8.0)]))
      .with("Март 24", gviz_payload(&[("Bob", 6.0)]));
    let aggregator = in_memory(source);

    let aggregate = aggregator
      .aggregate_all("sheet-id", &catalog(&[
        "Январь 24",
        "Февраль 24",
        "Март 24",
      ]))
      .await
      .unwrap();

    // catalog order, not the alphabetical order of the names
    assert_eq!(aggregate.keys().collect::<Vec<_>>(), vec![
      "Январь 24",
      "Март 24"
    ]);
    assert_eq!(
      aggregate["Январь 24"].schedule_by_date[&date(2024, 1, 1)]["Alice"].hours,
      8.0
    );
    assert_eq!(
      aggregate["Март 24"].schedule_by_date[&date(2024, 3, 1)]["Bob"].hours,
      6.0
    );
    assert_eq!(aggregator.source.requests(), vec![
      "Январь 24",
      "Февраль 24",
      "Март 24"
    ]);

    let stored = aggregator.store().read_aggregate("schedule").await.unwrap();
    assert_eq!(stored, Some(aggregate));
  }

  #[tokio::test(start_paused = true)]
  async fn undecodable_payload_is_omitted() {
    let source = FakeSource::default()
      .with("Январь 24", "<html>sign in</html>".to_owned())
      .with("Февраль 24", gviz_payload(&[("Alice", 8.0)]));
    let aggregator = in_memory(source);

    let aggregate = aggregator
      .aggregate_all("sheet-id", &catalog(&["Январь 24", "Февраль 24"]))
      .await
      .unwrap();

    assert_eq!(aggregate.keys().collect::<Vec<_>>(), vec!["Февраль 24"]);
  }

  #[tokio::test(start_paused = true)]
  async fn unknown_month_fails_before_fetching() {
    let source = FakeSource::default().with("Январь 24", gviz_payload(&[]));
    let aggregator = in_memory(source);

    let err = aggregator
      .aggregate_all("sheet-id", &catalog(&["Январь 24", "Foo 23"]))
      .await
      .unwrap_err();

    assert!(matches!(err, SheetNameError::UnknownMonth { .. }));
    assert!(aggregator.source.requests().is_empty());
    assert_eq!(
      aggregator.store().read_aggregate("schedule").await.unwrap(),
      None
    );
  }

  #[tokio::test(start_paused = true)]
  async fn sheets_are_spaced_by_fetch_delay() {
    let source = FakeSource::default()
      .with("Январь 24", gviz_payload(&[("Alice", 8.0)]))
      .with("Февраль 24", gviz_payload(&[("Alice", 7.0)]))
      .with("Март 24", gviz_payload(&[("Alice", 6.0)]));
    let aggregator = in_memory(source);

    let start = tokio::time::Instant::now();
    aggregator
      .aggregate_all("sheet-id", &catalog(&[
        "Январь 24",
        "Февраль 24",
        "Март 24",
      ]))
      .await
      .unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
  }

  #[tokio::test(start_paused = true)]
  async fn store_failure_still_returns_aggregate() {
    let source =
      FakeSource::default().with("Январь 24", gviz_payload(&[("Alice", 8.0)]));
    let aggregator =
      Aggregator::new(source, FailingStore, Duration::from_secs(1));

    let aggregate = aggregator
      .aggregate_all("sheet-id", &catalog(&["Январь 24"]))
      .await
      .unwrap();

    assert_eq!(aggregate.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn empty_catalog_writes_empty_aggregate() {
    let aggregator = Aggregator::new(
      FakeSource::default(),
      MemoryStore::new("schedule"),
      Duration::from_secs(1),
    );

    let aggregate = aggregator.aggregate_all("sheet-id", &[]).await.unwrap();

    assert!(aggregate.is_empty());
    assert_eq!(
      aggregator.store().read_aggregate("schedule").await.unwrap(),
      Some(AggregateSchedule::new())
    );
  }

  #[test]
  fn resolves_catalog_in_order() {
    let resolved =
      resolve_catalog(&catalog(&["Декабрь 23", "Январь 24"])).unwrap();
    assert_eq!(resolved, vec![
      ("Декабрь 23".to_owned(), SheetIdentity::new(2023, 12).unwrap()),
      ("Январь 24".to_owned(), SheetIdentity::new(2024, 1).unwrap()),
    ]);
  }
}
