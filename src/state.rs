use kinded::Kinded;
use tracing::info;

use crate::{
  aggregate::{Aggregator, resolve_catalog},
  fetch_sheet::SheetSource,
  normalize::model::AggregateSchedule,
  sheet_name::{SheetIdentity, SheetNameError},
  store::ScheduleStore,
};

/// Progress of a single ingestion run.
#[derive(Debug, Kinded)]
#[kinded(kind = IngestStep)]
pub enum IngestState {
  Start {
    catalog: Vec<String>,
  },
  ResolvedCatalog {
    sheets: Vec<(String, SheetIdentity)>,
  },
  Aggregated {
    aggregate: AggregateSchedule,
  },
  Persisted {
    aggregate: AggregateSchedule,
  },
}

impl IngestState {
  pub fn completed(&self) -> bool {
    matches!(self, Self::Persisted { .. })
  }

  pub async fn step<S: SheetSource, P: ScheduleStore>(
    self,
    aggregator: &Aggregator<S, P>,
    sheet_id: &str,
  ) -> Result<Self, SheetNameError> {
    let old_state_step = self.kind();
    let new_state = match self {
      IngestState::Start { catalog } => IngestState::ResolvedCatalog {
        sheets: resolve_catalog(&catalog)?,
      },
      IngestState::ResolvedCatalog { sheets } => IngestState::Aggregated {
        aggregate: aggregator.collect(sheet_id, &sheets).await,
      },
      IngestState::Aggregated { aggregate } => {
        // a failed write is logged by the aggregator and does not fail the
        // run
        aggregator.persist(&aggregate).await;
        IngestState::Persisted { aggregate }
      }
      s @ IngestState::Persisted { .. } => s,
    };

    info!(
      old_state = ?old_state_step,
      new_state = ?(new_state.kind()),
      "successfully transitioned state"
    );
    Ok(new_state)
  }
}
