use std::{future::Future, time::Duration};

use miette::{Context, IntoDiagnostic};
use reqwest::StatusCode;
use tracing::{debug, instrument, trace};

pub const GOOGLE_SHEETS_BASE_URL: &str =
  "https://docs.google.com/spreadsheets/d";

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum FetchError {
  #[error("failed to request sheet {sheet_name:?}")]
  #[diagnostic(code(fetch_sheet::transport))]
  Transport {
    sheet_name: String,
    #[source]
    source:     reqwest::Error,
  },
  #[error("got {status} response for sheet {sheet_name:?}")]
  #[diagnostic(code(fetch_sheet::status))]
  Status {
    sheet_name: String,
    status:     StatusCode,
  },
}

/// Something that can produce the raw gviz payload of a sheet.
pub trait SheetSource {
  fn fetch(
    &self,
    sheet_id: &str,
    sheet_name: &str,
  ) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Fetches sheets through the Google Visualization query endpoint.
#[derive(Clone, Debug)]
pub struct SheetFetcher {
  client:   reqwest::Client,
  base_url: String,
}

impl SheetFetcher {
  pub fn new(base_url: &str, timeout: Duration) -> miette::Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
      ))
      .build()
      .into_diagnostic()
      .context("failed to build HTTP client for sheet fetcher")?;

    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_owned(),
    })
  }

  fn build_request(
    &self,
    sheet_id: &str,
    sheet_name: &str,
  ) -> reqwest::Result<reqwest::Request> {
    let url = format!("{base}/{sheet_id}/gviz/tq", base = self.base_url);
    self
      .client
      .get(url)
      .query(&[("tqx", "out:json"), ("sheet", sheet_name)])
      .build()
  }
}

impl SheetSource for SheetFetcher {
  #[instrument(skip(self))]
  async fn fetch(
    &self,
    sheet_id: &str,
    sheet_name: &str,
  ) -> Result<String, FetchError> {
    let transport = |source| FetchError::Transport {
      sheet_name: sheet_name.to_owned(),
      source,
    };

    let req = self.build_request(sheet_id, sheet_name).map_err(transport)?;
    trace!(url = %req.url(), "requesting gviz sheet export");
    let resp = self.client.execute(req).await.map_err(transport)?;

    let status = resp.status();
    if !status.is_success() {
      return Err(FetchError::Status {
        sheet_name: sheet_name.to_owned(),
        status,
      });
    }

    let body = resp.text().await.map_err(transport)?;
    debug!(content_length = body.len(), "received gviz sheet export");

    Ok(body)
  }
}
