//! Validated identifier newtypes for the resource API.
//!
//! All three identifiers appear in request paths, so they are validated at
//! construction and never built from raw strings elsewhere. `Nino` is
//! additionally masked in every textual representation; the full value is
//! only reachable through [`Nino::as_str`], which the gateway uses for URL
//! assembly.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::MtdError;

/// Official NINO pattern. The first two letters exclude D, F, I, Q, U, V;
/// the second letter additionally excludes O. Suffix is restricted to A-D.
static NINO_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-CEGHJ-PR-TW-Z][A-CEGHJ-NPR-TW-Z]\d{6}[A-D]$").expect("valid NINO regex")
});

/// Administrative prefixes that are never issued.
const DISALLOWED_NINO_PREFIXES: [&str; 7] = ["BG", "GB", "KN", "NK", "NT", "TN", "ZZ"];

static BUSINESS_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^XAIS\d{11}$").expect("valid business id regex"));

/// A validated National Insurance Number.
///
/// Textual representations (`Display`, `Debug`) mask the value to the first
/// two characters plus the final letter (`AA****A`). The masking scheme is
/// a display convention with low entropy, not an anonymization guarantee.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nino(String);

impl Nino {
    /// Parse and validate a NINO.
    ///
    /// # Errors
    /// Returns `MtdError::InvalidInput` when the value does not match the
    /// official pattern or carries a disallowed prefix. The rejected value
    /// is masked in the error text.
    pub fn parse(value: &str) -> Result<Self, MtdError> {
        let candidate = value.trim().to_ascii_uppercase();

        if !NINO_PATTERN.is_match(&candidate) {
            return Err(MtdError::InvalidInput(format!(
                "NINO {} does not match the required format",
                mask_identifier(&candidate)
            )));
        }

        if DISALLOWED_NINO_PREFIXES.contains(&&candidate[..2]) {
            return Err(MtdError::InvalidInput(format!(
                "NINO prefix {} is not issued",
                &candidate[..2]
            )));
        }

        Ok(Self(candidate))
    }

    /// Full unmasked value, for request-path assembly only.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Masked rendering used in diagnostics: first two characters, four
    /// asterisks, final character.
    #[must_use]
    pub fn masked(&self) -> String {
        mask_identifier(&self.0)
    }
}

impl fmt::Display for Nino {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl fmt::Debug for Nino {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nino({})", self.masked())
    }
}

impl TryFrom<String> for Nino {
    type Error = MtdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Nino> for String {
    fn from(nino: Nino) -> Self {
        nino.0
    }
}

fn mask_identifier(value: &str) -> String {
    if value.len() < 3 {
        return "****".to_string();
    }
    let head: String = value.chars().take(2).collect();
    let tail = value.chars().next_back().map(String::from).unwrap_or_default();
    format!("{head}****{tail}")
}

/// A validated self-employment business identifier (`XAIS` + 11 digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BusinessId(String);

impl BusinessId {
    /// Parse and validate a business identifier.
    ///
    /// # Errors
    /// Returns `MtdError::InvalidInput` when the value is malformed.
    pub fn parse(value: &str) -> Result<Self, MtdError> {
        let candidate = value.trim().to_ascii_uppercase();
        if !BUSINESS_ID_PATTERN.is_match(&candidate) {
            return Err(MtdError::InvalidInput(format!(
                "business id {candidate} is not XAIS followed by 11 digits"
            )));
        }
        Ok(Self(candidate))
    }

    /// Full identifier value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusinessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BusinessId {
    type Error = MtdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BusinessId> for String {
    fn from(id: BusinessId) -> Self {
        id.0
    }
}

/// A UK tax year in `YYYY-YY` form (6 April to 5 April).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxYear {
    start_year: i32,
}

impl TaxYear {
    /// Construct from the starting calendar year, e.g. `2025` for 2025-26.
    #[must_use]
    pub fn starting(start_year: i32) -> Self {
        Self { start_year }
    }

    /// Parse the `YYYY-YY` form, rejecting non-contiguous year pairs.
    ///
    /// # Errors
    /// Returns `MtdError::InvalidInput` for malformed or non-contiguous
    /// values.
    pub fn parse(value: &str) -> Result<Self, MtdError> {
        let malformed =
            || MtdError::InvalidInput(format!("tax year {value} is not in YYYY-YY form"));

        let (start, end) = value.split_once('-').ok_or_else(malformed)?;
        if start.len() != 4 || end.len() != 2 {
            return Err(malformed());
        }

        let start_year: i32 = start.parse().map_err(|_| malformed())?;
        let end_suffix: i32 = end.parse().map_err(|_| malformed())?;

        if (start_year + 1) % 100 != end_suffix {
            return Err(MtdError::InvalidInput(format!(
                "tax year {value} does not span consecutive years"
            )));
        }

        Ok(Self { start_year })
    }

    /// Calendar year in which the tax year begins.
    #[must_use]
    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    /// Calendar year in which the tax year ends.
    #[must_use]
    pub fn end_year(&self) -> i32 {
        self.start_year + 1
    }
}

impl fmt::Display for TaxYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.start_year, (self.start_year + 1) % 100)
    }
}

impl TryFrom<String> for TaxYear {
    type Error = MtdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaxYear> for String {
    fn from(year: TaxYear) -> Self {
        year.to_string()
    }
}
