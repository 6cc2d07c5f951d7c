use std::{fmt, str::FromStr, time::Duration};

use miette::{Context, IntoDiagnostic, miette};

use crate::{
  fetch_sheet::GOOGLE_SHEETS_BASE_URL,
  sheet_name::{NAMEABLE_YEARS, SheetIdentity},
};

const DEFAULT_SCHEDULE_KEY: &str = "schedule";
const DEFAULT_CATALOG_START: SheetIdentity = SheetIdentity {
  year:  2024,
  month: 1,
};
const DEFAULT_CATALOG_END: SheetIdentity = SheetIdentity {
  year:  2026,
  month: 12,
};
const DEFAULT_FETCH_DELAY_MS: u64 = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct Config {
  pub sheet_id:              String,
  pub sheets_base_url:       String,
  /// Unset means a dry run: nothing is written anywhere.
  pub firebase_database_url: Option<String>,
  pub firebase_auth_token:   Option<String>,
  pub schedule_key:          String,
  pub catalog_start:         SheetIdentity,
  pub catalog_end:           SheetIdentity,
  pub fetch_delay:           Duration,
  pub request_timeout:       Duration,
  /// Set means ingest periodically instead of once.
  pub ingest_interval:       Option<Duration>,
}

impl fmt::Debug for Config {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Config")
      .field("sheet_id", &self.sheet_id)
      .field("sheets_base_url", &self.sheets_base_url)
      .field("firebase_database_url", &self.firebase_database_url)
      .field(
        "firebase_auth_token",
        &self.firebase_auth_token.as_ref().map(|_| "<redacted>"),
      )
      .field("schedule_key", &self.schedule_key)
      .field("catalog_start", &self.catalog_start)
      .field("catalog_end", &self.catalog_end)
      .field("fetch_delay", &self.fetch_delay)
      .field("request_timeout", &self.request_timeout)
      .field("ingest_interval", &self.ingest_interval)
      .finish()
  }
}

fn parse_year_month(value: &str) -> miette::Result<SheetIdentity> {
  let (year, month) = value
    .trim()
    .split_once('-')
    .ok_or(miette!("expected `YYYY-MM`, got {value:?}"))?;
  let year = year
    .parse::<i32>()
    .into_diagnostic()
    .context(format!("failed to parse year of {value:?}"))?;
  let month = month
    .parse::<u32>()
    .into_diagnostic()
    .context(format!("failed to parse month of {value:?}"))?;
  miette::ensure!(
    NAMEABLE_YEARS.contains(&year),
    "year of {value:?} is outside {}..={}, which sheet names cannot express",
    NAMEABLE_YEARS.start(),
    NAMEABLE_YEARS.end()
  );
  SheetIdentity::new(year, month)
    .ok_or(miette!("month out of range in {value:?}"))
}

fn parse_var<T>(name: &str, value: Option<String>) -> miette::Result<Option<T>>
where
  T: FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  value
    .map(|v| {
      v.trim()
        .parse::<T>()
        .into_diagnostic()
        .context(format!("failed to parse `{name}` env var, got {v:?}"))
    })
    .transpose()
}

impl Config {
  pub fn from_env() -> miette::Result<Self> {
    Self::from_vars(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
  }

  pub fn from_vars(
    var: impl Fn(&str) -> Option<String>,
  ) -> miette::Result<Self> {
    let sheet_id =
      var("SHEET_ID").ok_or(miette!("missing `SHEET_ID` env var"))?;
    let sheets_base_url = var("SHEETS_BASE_URL")
      .unwrap_or_else(|| GOOGLE_SHEETS_BASE_URL.to_owned());

    let firebase_database_url = var("FIREBASE_DATABASE_URL");
    let firebase_auth_token = var("FIREBASE_AUTH_TOKEN");
    let schedule_key =
      var("SCHEDULE_KEY").unwrap_or_else(|| DEFAULT_SCHEDULE_KEY.to_owned());

    let catalog_start = var("CATALOG_START")
      .map(|v| parse_year_month(&v))
      .transpose()
      .context("failed to parse `CATALOG_START` env var")?
      .unwrap_or(DEFAULT_CATALOG_START);
    let catalog_end = var("CATALOG_END")
      .map(|v| parse_year_month(&v))
      .transpose()
      .context("failed to parse `CATALOG_END` env var")?
      .unwrap_or(DEFAULT_CATALOG_END);
    miette::ensure!(
      catalog_start <= catalog_end,
      "`CATALOG_START` ({catalog_start}) is after `CATALOG_END` ({catalog_end})"
    );

    let fetch_delay = Duration::from_millis(
      parse_var("FETCH_DELAY_MS", var("FETCH_DELAY_MS"))?
        .unwrap_or(DEFAULT_FETCH_DELAY_MS),
    );
    let request_timeout = Duration::from_secs(
      parse_var("REQUEST_TIMEOUT_SECS", var("REQUEST_TIMEOUT_SECS"))?
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
    );
    let ingest_interval =
      parse_var::<u64>("INGEST_INTERVAL_SECS", var("INGEST_INTERVAL_SECS"))?
        .map(Duration::from_secs);
    if let Some(interval) = ingest_interval {
      miette::ensure!(
        !interval.is_zero(),
        "`INGEST_INTERVAL_SECS` must be greater than zero"
      );
    }

    Ok(Self {
      sheet_id,
      sheets_base_url,
      firebase_database_url,
      firebase_auth_token,
      schedule_key,
      catalog_start,
      catalog_end,
      fetch_delay,
      request_timeout,
      ingest_interval,
    })
  }
}
