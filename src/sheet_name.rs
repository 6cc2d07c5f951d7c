use std::{fmt, ops::RangeInclusive};

use serde::{Deserialize, Serialize};

/// Tab names in the schedule spreadsheet use these, capitalized.
const MONTH_NAMES: [&str; 12] = [
  "Январь",
  "Февраль",
  "Март",
  "Апрель",
  "Май",
  "Июнь",
  "Июль",
  "Август",
  "Сентябрь",
  "Октябрь",
  "Ноябрь",
  "Декабрь",
];

const CENTURY_BASE: i32 = 2000;

/// Years a two-digit tab name can express.
pub const NAMEABLE_YEARS: RangeInclusive<i32> =
  CENTURY_BASE..=CENTURY_BASE + 99;

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SheetNameError {
  #[error("unknown month name {month:?} in sheet name {sheet_name:?}")]
  #[diagnostic(code(sheet_name::unknown_month))]
  UnknownMonth { sheet_name: String, month: String },
  #[error("malformed sheet name {sheet_name:?}: {reason}")]
  #[diagnostic(
    code(sheet_name::malformed),
    help("sheet names look like \"Март 24\" or \"Март 2024\"")
  )]
  Malformed {
    sheet_name: String,
    reason:     &'static str,
  },
  #[error("no sheet name for {identity}, two-digit years cover 2000-2099")]
  #[diagnostic(code(sheet_name::unnameable))]
  Unnameable { identity: SheetIdentity },
}

/// The calendar month a sheet covers.
#[derive(
  Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
pub struct SheetIdentity {
  pub year:  i32,
  pub month: u32,
}

impl SheetIdentity {
  pub fn new(year: i32, month: u32) -> Option<Self> {
    (1..=12).contains(&month).then_some(Self { year, month })
  }

  /// The month after this one.
  pub fn succ(self) -> Self {
    if self.month == 12 {
      Self {
        year:  self.year + 1,
        month: 1,
      }
    } else {
      Self {
        year:  self.year,
        month: self.month + 1,
      }
    }
  }
}

impl fmt::Display for SheetIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:04}-{:02}", self.year, self.month)
  }
}

pub fn parse_sheet_name(
  sheet_name: &str,
) -> Result<SheetIdentity, SheetNameError> {
  let malformed = |reason| SheetNameError::Malformed {
    sheet_name: sheet_name.to_owned(),
    reason,
  };

  let mut tokens = sheet_name.split_whitespace();
  let month_token = tokens.next().ok_or(malformed("sheet name is empty"))?;
  let year_token = tokens.next().ok_or(malformed("missing year"))?;
  if tokens.next().is_some() {
    return Err(malformed("expected exactly a month and a year"));
  }

  let month_token_lower = month_token.to_lowercase();
  let month = MONTH_NAMES
    .iter()
    .position(|m| m.to_lowercase() == month_token_lower)
    .ok_or_else(|| SheetNameError::UnknownMonth {
      sheet_name: sheet_name.to_owned(),
      month:      month_token.to_owned(),
    })?;

  if !year_token.chars().all(|c| c.is_ascii_digit()) {
    return Err(malformed("year is not a number"));
  }
  let year = match year_token.len() {
    1 | 2 => year_token
      .parse::<i32>()
      .map(|y| CENTURY_BASE + y)
      .map_err(|_| malformed("year is not a number"))?,
    4 => year_token
      .parse::<i32>()
      .map_err(|_| malformed("year is not a number"))?,
    _ => return Err(malformed("year must have 2 or 4 digits")),
  };

  Ok(SheetIdentity {
    year,
    month: month as u32 + 1,
  })
}

/// Formats the tab name for a month, e.g. 2024-03 -> `"Март 24"`.
///
/// Fails for years outside [`NAMEABLE_YEARS`], whose names would resolve to
/// a different year.
pub fn format_sheet_name(
  identity: SheetIdentity,
) -> Result<String, SheetNameError> {
  let name = identity
    .month
    .checked_sub(1)
    .and_then(|index| MONTH_NAMES.get(index as usize))
    .filter(|_| NAMEABLE_YEARS.contains(&identity.year))
    .ok_or(SheetNameError::Unnameable { identity })?;
  Ok(format!("{name} {:02}", identity.year - CENTURY_BASE))
}

/// Every sheet name from `from` to `to` inclusive, oldest first.
pub fn catalog(
  from: SheetIdentity,
  to: SheetIdentity,
) -> Result<Vec<String>, SheetNameError> {
  let mut names = Vec::new();
  let mut current = from;
  while current <= to {
    names.push(format_sheet_name(current)?);
    current = current.succ();
  }
  Ok(names)
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use proptest::prelude::*;

  use super::*;

  #[test]
  fn parses_two_digit_year() {
    let identity = parse_sheet_name("Март 24").unwrap();
    assert_eq!(identity, SheetIdentity {
      year:  2024,
      month: 3,
    });
  }

  #[test]
  fn parses_four_digit_year_and_ignores_case() {
    let identity = parse_sheet_name("  ДЕКАБРЬ   2023 ").unwrap();
    assert_eq!(identity, SheetIdentity {
      year:  2023,
      month: 12,
    });
  }

  #[test]
  fn unknown_month_is_an_error() {
    let err = parse_sheet_name("Foo 23").unwrap_err();
    assert!(matches!(
      err,
      SheetNameError::UnknownMonth { ref month, .. } if month == "Foo"
    ));
  }

  #[test]
  fn malformed_names_are_errors() {
    for name in ["", "Март", "Март 24 extra", "Март 2x", "Март 123"] {
      assert!(
        matches!(
          parse_sheet_name(name),
          Err(SheetNameError::Malformed { .. })
        ),
        "expected {name:?} to be malformed"
      );
    }
  }

  fn month(year: i32, month: u32) -> SheetIdentity {
    SheetIdentity::new(year, month).unwrap()
  }

  #[test]
  fn formats_with_padded_year() {
    assert_eq!(format_sheet_name(month(2024, 3)).unwrap(), "Март 24");
    assert_eq!(format_sheet_name(month(2005, 1)).unwrap(), "Январь 05");
  }

  #[test]
  fn formats_only_nameable_years() {
    assert_eq!(format_sheet_name(month(2000, 1)).unwrap(), "Январь 00");
    assert_eq!(format_sheet_name(month(2099, 12)).unwrap(), "Декабрь 99");
    for identity in [month(1999, 12), month(2100, 1)] {
      assert!(matches!(
        format_sheet_name(identity),
        Err(SheetNameError::Unnameable { identity: i }) if i == identity
      ));
    }
  }

  #[test]
  fn formatting_an_invalid_month_is_an_error() {
    let identity = SheetIdentity {
      year:  2024,
      month: 13,
    };
    assert!(format_sheet_name(identity).is_err());
    assert!(
      format_sheet_name(SheetIdentity {
        year:  2024,
        month: 0,
      })
      .is_err()
    );
  }

  #[test]
  fn catalog_outside_nameable_years_is_an_error() {
    assert!(catalog(month(1999, 12), month(2000, 2)).is_err());
    assert!(catalog(month(2099, 11), month(2100, 1)).is_err());
    assert_eq!(catalog(month(2099, 11), month(2099, 12)).unwrap(), vec![
      "Ноябрь 99",
      "Декабрь 99"
    ]);
  }

  #[test]
  fn catalog_crosses_year_boundary() {
    let names = catalog(month(2023, 11), month(2024, 2)).unwrap();
    assert_eq!(names, vec![
      "Ноябрь 23",
      "Декабрь 23",
      "Январь 24",
      "Февраль 24"
    ]);
  }

  #[test]
  fn catalog_is_empty_when_reversed() {
    let names = catalog(month(2024, 2), month(2024, 1)).unwrap();
    assert!(names.is_empty());
  }

  proptest! {
    #[test]
    fn format_then_parse_round_trips(
      year in 2000i32..2100,
      month in 1u32..=12
    ) {
      let identity = SheetIdentity { year, month };
      let name = format_sheet_name(identity).unwrap();
      prop_assert_eq!(parse_sheet_name(&name).unwrap(), identity);
    }
  }
}
