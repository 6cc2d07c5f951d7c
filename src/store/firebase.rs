use std::time::Duration;

use miette::{Context, IntoDiagnostic};
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use tracing::{debug, error, instrument, trace};

use super::ScheduleStore;
use crate::{normalize::model::AggregateSchedule, sheet_name::parse_sheet_name};

/// Characters the Realtime Database refuses in keys, plus the escape
/// character itself.
const ESCAPED_KEY_CHARS: [char; 7] = ['%', '.', '$', '#', '[', ']', '/'];

/// Stores the aggregate in a Firebase Realtime Database over its REST API.
#[derive(Clone, Debug)]
pub struct FirebaseStore {
  client:       reqwest::Client,
  database_url: String,
  key:          String,
  auth_token:   Option<String>,
}

impl FirebaseStore {
  pub fn new(
    database_url: &str,
    key: &str,
    auth_token: Option<String>,
    timeout: Duration,
  ) -> miette::Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .into_diagnostic()
      .context("failed to build HTTP client for firebase store")?;

    Ok(Self {
      client,
      database_url: database_url.trim_end_matches('/').to_owned(),
      key: key.trim_matches('/').to_owned(),
      auth_token,
    })
  }

  fn node_url(&self, key: &str) -> String {
    format!(
      "{base}/{key}.json",
      base = self.database_url,
      key = key.trim_matches('/')
    )
  }

  fn authorize(
    &self,
    req: reqwest::RequestBuilder,
  ) -> reqwest::RequestBuilder {
    match &self.auth_token {
      Some(token) => req.query(&[("auth", token)]),
      None => req,
    }
  }
}

/// Percent-escapes the characters a database key cannot hold, leaving
/// everything else (Cyrillic included) readable.
fn escape_key(key: &str) -> String {
  let mut escaped = String::with_capacity(key.len());
  for c in key.chars() {
    if ESCAPED_KEY_CHARS.contains(&c) || c.is_ascii_control() {
      escaped.push_str(&format!("%{:02X}", c as u32));
    } else {
      escaped.push(c);
    }
  }
  escaped
}

fn unescape_key(key: &str) -> miette::Result<String> {
  percent_decode_str(key)
    .decode_utf8()
    .map(|k| k.into_owned())
    .into_diagnostic()
    .context(format!("stored key {key:?} is not valid escaped UTF-8"))
}

/// Rewrites the sheet-name keys and the per-day employee-name keys of a
/// serialized aggregate. Values are left alone.
fn rewrite_keys(
  aggregate: Value,
  rewrite: impl Fn(&str) -> miette::Result<String>,
) -> miette::Result<Value> {
  let Value::Object(sheets) = aggregate else {
    return Ok(aggregate);
  };

  let mut rewritten = Map::with_capacity(sheets.len());
  for (sheet_name, mut schedule) in sheets {
    if let Some(Value::Object(days)) = schedule.get_mut("scheduleByDate") {
      for day in days.values_mut() {
        if let Value::Object(entries) = day {
          let mut renamed = Map::with_capacity(entries.len());
          for (employee, entry) in std::mem::take(entries) {
            renamed.insert(rewrite(&employee)?, entry);
          }
          *entries = renamed;
        }
      }
    }
    rewritten.insert(rewrite(&sheet_name)?, schedule);
  }
  Ok(Value::Object(rewritten))
}

impl ScheduleStore for FirebaseStore {
  #[instrument(
    skip(self, aggregate),
    fields(key = self.key, sheets = aggregate.len())
  )]
  async fn write_aggregate(
    &self,
    aggregate: &AggregateSchedule,
  ) -> miette::Result<()> {
    let body = serde_json::to_value(aggregate)
      .into_diagnostic()
      .context("failed to serialize aggregate")?;
    let body = rewrite_keys(body, |key| Ok(escape_key(key)))?;

    let req = self
      .authorize(self.client.put(self.node_url(&self.key)))
      .json(&body);

    trace!("sending firebase request to replace aggregate");
    let resp = req
      .send()
      .await
      .into_diagnostic()
      .context("failed to send request to write aggregate")?;

    // extract error before consuming body
    let server_error = resp
      .error_for_status_ref()
      .map(|_| ())
      .into_diagnostic()
      .context("got server error response from aggregate write request");
    let payload = resp.text().await.into_diagnostic().context(
      "failed to consume body of response from aggregate write request",
    )?;

    // now bubble error
    if let Err(e) = server_error {
      error!(payload, "got error response from aggregate write request");
      return Err(e);
    }
    debug!(
      content_length = payload.len(),
      "wrote aggregate to firebase"
    );

    Ok(())
  }

  #[instrument(skip(self))]
  async fn read_aggregate(
    &self,
    key: &str,
  ) -> miette::Result<Option<AggregateSchedule>> {
    let req = self.authorize(self.client.get(self.node_url(key)));

    trace!("sending firebase request to read aggregate");
    let resp = req
      .send()
      .await
      .into_diagnostic()
      .context("failed to send request to read aggregate")?
      .error_for_status()
      .into_diagnostic()
      .context("got server error response from aggregate read request")?;
    let payload = resp
      .text()
      .await
      .into_diagnostic()
      .context("failed to read aggregate response body")?;

    let aggregate = parse_stored_aggregate(&payload).inspect_err(|_| {
      error!(payload, "failed to parse stored aggregate");
    })?;
    debug!(
      sheets = aggregate.as_ref().map(|a| a.len()),
      "read aggregate from firebase"
    );

    Ok(aggregate)
  }
}

/// Parses a stored aggregate, restoring escaped keys and chronological
/// sheet order (the database returns keys sorted as strings).
fn parse_stored_aggregate(
  payload: &str,
) -> miette::Result<Option<AggregateSchedule>> {
  let jd = &mut serde_json::Deserializer::from_str(payload);
  let stored: Value = serde_path_to_error::deserialize(jd)
    .into_diagnostic()
    .context("stored aggregate is not JSON")?;
  if stored.is_null() {
    return Ok(None);
  }

  let stored = rewrite_keys(stored, unescape_key)?;
  let mut aggregate: AggregateSchedule =
    serde_path_to_error::deserialize(stored)
      .into_diagnostic()
      .context("failed to parse stored aggregate")?;
  aggregate.sort_by(|a, _, b, _| {
    parse_sheet_name(a).ok().cmp(&parse_sheet_name(b).ok())
  });
  Ok(Some(aggregate))
}
