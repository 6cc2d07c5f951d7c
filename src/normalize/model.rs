use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One employee's worked hours on one date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftEntry {
  pub employee_name: String,
  /// Always positive.
  pub hours:         f64,
  /// `hours >= 1`; a raw `1` is a checkbox-style "worked" marker.
  pub is_shift:      bool,
}

impl ShiftEntry {
  /// Returns `None` for an empty name or a value that is not a positive
  /// finite number.
  pub fn new(employee_name: &str, hours: f64) -> Option<Self> {
    if employee_name.is_empty() || !hours.is_finite() || hours <= 0.0 {
      return None;
    }
    Some(Self {
      employee_name: employee_name.to_owned(),
      hours,
      is_shift: hours >= 1.0,
    })
  }
}

/// Shifts on one date, keyed by employee name.
pub type DaySchedule = BTreeMap<String, ShiftEntry>;

/// How a sheet's header row maps columns to days of the month.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaderConvention {
  /// Header labels carry the day number; unlabeled columns fall back to
  /// their position.
  DayLabels,
  /// No header label is a day number; column `n` is day `n`.
  Positional,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSchedule {
  pub sheet_name:        String,
  /// Employee names in row order, duplicates included.
  ///
  /// The realtime database drops empty arrays and objects, so both
  /// collections may be missing from a stored sheet.
  #[serde(default)]
  pub employees:         Vec<String>,
  #[serde(default)]
  pub schedule_by_date:  BTreeMap<NaiveDate, DaySchedule>,
  pub parsed_at:         DateTime<Utc>,
  pub header_convention: HeaderConvention,
}

impl NormalizedSchedule {
  /// Total number of shift entries across all dates.
  pub fn entry_count(&self) -> usize {
    self.schedule_by_date.values().map(BTreeMap::len).sum()
  }
}

/// Every ingested month, keyed by sheet name, in catalog order.
pub type AggregateSchedule = IndexMap<String, NormalizedSchedule>;

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn stored_sheet_without_shifts_deserializes() {
    let json = r#"{
      "Декабрь 26": {
        "sheetName": "Декабрь 26",
        "parsedAt": "2026-12-01T00:00:00Z",
        "headerConvention": "positional"
      }
    }"#;

    let aggregate: AggregateSchedule = serde_json::from_str(json).unwrap();

    let schedule = &aggregate["Декабрь 26"];
    assert!(schedule.employees.is_empty());
    assert!(schedule.schedule_by_date.is_empty());
    assert_eq!(schedule.header_convention, HeaderConvention::Positional);
    assert_eq!(schedule.entry_count(), 0);
  }
}
