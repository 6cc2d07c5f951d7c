pub mod model;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument, trace, warn};

use self::model::{
  DaySchedule, HeaderConvention, NormalizedSchedule, ShiftEntry,
};
use crate::{
  decode_table::{DecodedTable, RawCell},
  sheet_name::SheetIdentity,
};

fn parse_day_label(label: &str) -> Option<u32> {
  label
    .trim()
    .parse::<u32>()
    .ok()
    .filter(|d| (1..=31).contains(d))
}

/// Day of month for each data column (header index 1 onward).
fn day_columns(headers: &[String]) -> (HeaderConvention, Vec<u32>) {
  let labeled = headers
    .iter()
    .skip(1)
    .any(|label| parse_day_label(label).is_some());
  let convention = if labeled {
    HeaderConvention::DayLabels
  } else {
    HeaderConvention::Positional
  };

  let days = headers
    .iter()
    .enumerate()
    .skip(1)
    .map(|(position, label)| match parse_day_label(label) {
      Some(day) => day,
      None => {
        if convention == HeaderConvention::DayLabels {
          warn!(
            position,
            label, "header label is not a day number, using column position"
          );
        }
        position as u32
      }
    })
    .collect();

  (convention, days)
}

/// Turns a decoded monthly sheet into a date -> employee -> shift mapping.
///
/// Never fails: rows without a name, cells without a positive value and
/// columns that do not map to a real date in `identity`'s month are skipped.
#[instrument(
  skip(table),
  fields(rows = table.rows.len(), columns = table.width(), %identity)
)]
pub fn normalize(
  sheet_name: &str,
  table: &DecodedTable,
  identity: SheetIdentity,
) -> NormalizedSchedule {
  let parsed_at = Utc::now();
  let (header_convention, days) = day_columns(&table.headers);
  if header_convention == HeaderConvention::Positional {
    info!("sheet has no day-number headers, mapping days by column position");
  }

  let mut employees = Vec::new();
  let mut schedule_by_date: BTreeMap<NaiveDate, DaySchedule> = BTreeMap::new();

  for (row_index, row) in table.rows.iter().enumerate() {
    let Some(name) = row.first().and_then(RawCell::as_text) else {
      trace!(row_index, "skipping row without employee name");
      continue;
    };
    employees.push(name.to_owned());

    let mut row_dates = BTreeSet::new();
    let data_cells = row.iter().enumerate().skip(1);
    for (&day, (column, cell)) in days.iter().zip(data_cells) {
      let Some(hours) = cell.as_number() else {
        continue;
      };
      let Some(entry) = ShiftEntry::new(name, hours) else {
        trace!(row_index, day, hours, "skipping non-positive cell");
        continue;
      };
      let Some(date) =
        NaiveDate::from_ymd_opt(identity.year, identity.month, day)
      else {
        trace!(row_index, day, "skipping day outside of month");
        continue;
      };

      trace!(%date, employee = name, hours, "parsed shift");
      let previous = schedule_by_date
        .entry(date)
        .or_default()
        .insert(name.to_owned(), entry);
      let same_row = !row_dates.insert(date);
      match previous {
        Some(previous) if same_row => debug!(
          %date,
          employee = name,
          column,
          previous_hours = previous.hours,
          "two columns map to the same date, keeping later column"
        ),
        Some(previous) => debug!(
          %date,
          employee = name,
          row_index,
          previous_hours = previous.hours,
          "employee listed twice on the same date, keeping later row"
        ),
        None => {}
      }
    }
  }

  let schedule = NormalizedSchedule {
    sheet_name: sheet_name.to_owned(),
    employees,
    schedule_by_date,
    parsed_at,
    header_convention,
  };
  debug!(
    employees = schedule.employees.len(),
    dates = schedule.schedule_by_date.len(),
    entries = schedule.entry_count(),
    "normalized sheet"
  );

  schedule
}
