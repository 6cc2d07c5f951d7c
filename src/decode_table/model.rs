use serde::Deserialize;

/// Body of a `google.visualization.Query.setResponse(...)` call.
#[derive(Clone, Debug, Deserialize)]
pub struct GvizResponse {
  #[serde(default)]
  pub status: GvizStatus,
  /// Present when `status` is `error`.
  #[serde(default)]
  pub errors: Vec<GvizMessage>,
  pub table:  Option<GvizTable>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GvizStatus {
  #[default]
  Ok,
  Warning,
  Error,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GvizMessage {
  #[serde(default)]
  pub reason:           Option<String>,
  #[serde(default)]
  pub message:          Option<String>,
  #[serde(default)]
  pub detailed_message: Option<String>,
}

impl GvizMessage {
  pub fn describe(&self) -> String {
    self
      .detailed_message
      .as_deref()
      .or(self.message.as_deref())
      .or(self.reason.as_deref())
      .unwrap_or("unspecified error")
      .to_owned()
  }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GvizTable {
  #[serde(default)]
  pub cols: Vec<GvizColumn>,
  #[serde(default)]
  pub rows: Vec<GvizRow>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GvizColumn {
  /// Header text of the column. Google leaves this empty when it could not
  /// detect a header row.
  #[serde(default)]
  pub label: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GvizRow {
  /// Cells in column order; an entirely blank cell is `null`.
  #[serde(default)]
  pub c: Vec<Option<GvizCell>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GvizCell {
  #[serde(default)]
  pub v: Option<serde_json::Value>,
}
