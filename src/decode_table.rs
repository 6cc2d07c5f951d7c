pub mod model;

use tracing::{debug, instrument, trace, warn};

use self::model::{GvizCell, GvizResponse, GvizStatus};

const WRAPPER_PREFIX: &str = "google.visualization.Query.setResponse(";
const WRAPPER_SUFFIX: &str = ")";

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum FormatError {
  #[error("payload is missing the `{marker}` wrapper marker")]
  #[diagnostic(
    code(decode_table::missing_wrapper),
    help("the sheet may not be shared publicly, or the endpoint changed")
  )]
  MissingWrapper { marker: &'static str },
  #[error("failed to parse gviz payload at `{path}`")]
  #[diagnostic(code(decode_table::payload))]
  Payload {
    path:   String,
    #[source]
    source: serde_json::Error,
  },
  #[error("gviz query failed: {}", messages.join("; "))]
  #[diagnostic(code(decode_table::query_error))]
  QueryError { messages: Vec<String> },
  #[error("gviz payload has no table")]
  #[diagnostic(code(decode_table::missing_table))]
  MissingTable,
}

/// A single spreadsheet cell.
#[derive(Clone, Debug, PartialEq)]
pub enum RawCell {
  Number(f64),
  Text(String),
  Empty,
}

impl RawCell {
  /// The numeric reading of the cell. Text holding a number (with either a
  /// `.` or a `,` decimal separator) counts as that number.
  pub fn as_number(&self) -> Option<f64> {
    match self {
      RawCell::Number(n) => Some(*n),
      RawCell::Text(t) => t.trim().replace(',', ".").parse::<f64>().ok(),
      RawCell::Empty => None,
    }
  }

  /// The trimmed text of the cell, if it is non-empty text.
  pub fn as_text(&self) -> Option<&str> {
    match self {
      RawCell::Text(t) => Some(t.trim()).filter(|t| !t.is_empty()),
      _ => None,
    }
  }

  fn from_gviz(cell: Option<&GvizCell>) -> RawCell {
    let Some(value) = cell.and_then(|c| c.v.as_ref()) else {
      return RawCell::Empty;
    };
    match value {
      serde_json::Value::Number(n) => {
        n.as_f64().map(RawCell::Number).unwrap_or(RawCell::Empty)
      }
      serde_json::Value::String(s) => RawCell::Text(s.clone()),
      // checkbox cells
      serde_json::Value::Bool(b) => RawCell::Number(if *b { 1.0 } else { 0.0 }),
      serde_json::Value::Null => RawCell::Empty,
      v => {
        trace!(value = ?v, "ignoring structured cell value");
        RawCell::Empty
      }
    }
  }
}

/// Header labels plus data rows, all rows as wide as the header.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedTable {
  pub headers: Vec<String>,
  pub rows:    Vec<Vec<RawCell>>,
}

impl DecodedTable {
  /// Builds a table, padding short rows with [`RawCell::Empty`] and
  /// truncating long ones to the header width.
  pub fn new(headers: Vec<String>, rows: Vec<Vec<RawCell>>) -> Self {
    let width = headers.len();
    let rows = rows
      .into_iter()
      .enumerate()
      .map(|(row_index, mut row)| {
        if row.len() > width {
          warn!(
            row_index,
            row_width = row.len(),
            width,
            "truncating row wider than header"
          );
        }
        row.resize(width, RawCell::Empty);
        row
      })
      .collect();
    Self { headers, rows }
  }

  pub fn width(&self) -> usize {
    self.headers.len()
  }
}

/// Locates the JSON literal between the gviz wrapper markers.
fn strip_wrapper(payload: &str) -> Result<&str, FormatError> {
  let start = payload
    .find(WRAPPER_PREFIX)
    .ok_or(FormatError::MissingWrapper {
      marker: WRAPPER_PREFIX,
    })?
    + WRAPPER_PREFIX.len();
  let rest = payload[start..].trim_end();
  let rest = rest.strip_suffix(';').unwrap_or(rest).trim_end();
  rest
    .strip_suffix(WRAPPER_SUFFIX)
    .ok_or(FormatError::MissingWrapper {
      marker: WRAPPER_SUFFIX,
    })
}

#[instrument(skip(payload), fields(payload_len = payload.len()))]
pub fn decode(payload: &str) -> Result<DecodedTable, FormatError> {
  let inner = strip_wrapper(payload)?;

  let jd = &mut serde_json::Deserializer::from_str(inner);
  let response: GvizResponse = serde_path_to_error::deserialize(jd)
    .map_err(|e| FormatError::Payload {
      path:   e.path().to_string(),
      source: e.into_inner(),
    })?;

  match response.status {
    GvizStatus::Error => {
      return Err(FormatError::QueryError {
        messages: response.errors.iter().map(|m| m.describe()).collect(),
      });
    }
    GvizStatus::Warning => {
      let messages: Vec<_> =
        response.errors.iter().map(|m| m.describe()).collect();
      warn!(?messages, "gviz query returned warnings");
    }
    GvizStatus::Ok => {}
  }

  let table = response.table.ok_or(FormatError::MissingTable)?;

  let headers = table
    .cols
    .iter()
    .map(|c| c.label.clone().unwrap_or_default().trim().to_owned())
    .collect::<Vec<_>>();
  let rows = table
    .rows
    .iter()
    .map(|r| {
      r.c
        .iter()
        .map(|c| RawCell::from_gviz(c.as_ref()))
        .collect::<Vec<_>>()
    })
    .collect::<Vec<_>>();

  debug!(
    columns = headers.len(),
    rows = rows.len(),
    "decoded gviz table"
  );

  Ok(DecodedTable::new(headers, rows))
}
