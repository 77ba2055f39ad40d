//! Invoice status canonicalization
//!
//! Source documents arrive with a free-form status vocabulary ("processed",
//! "uploaded", "Validated", ...). Everything stored and filtered on uses the
//! closed [`InvoiceStatus`] set; values outside the lookup table are kept,
//! upper-cased, as [`InvoiceStatus::Unrecognized`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical invoice status
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvoiceStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Source value not in the lookup table, upper-cased verbatim
    Unrecognized(String),
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Unrecognized(s) => s.as_str(),
        }
    }

    /// True for the four canonical values
    pub fn is_canonical(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// Statuses that still represent money going out (used by the outflow forecast)
    pub fn is_payable(&self) -> bool {
        matches!(self, Self::Completed | Self::Pending | Self::Processing)
    }

    /// Rebuild a status from its stored text
    ///
    /// Stored values are already canonical, so this only recognizes the
    /// upper-case names and keeps everything else as-is.
    pub fn from_stored(s: &str) -> Self {
        match s {
            "PENDING" => Self::Pending,
            "PROCESSING" => Self::Processing,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for InvoiceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InvoiceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(canonicalize(&s))
    }
}

/// Map a raw source status onto the canonical set
///
/// Lookup is case-insensitive but otherwise exact. Never fails: anything
/// else, surrounding whitespace included, comes back as `Unrecognized`
/// holding the upper-cased input.
pub fn canonicalize(raw: &str) -> InvoiceStatus {
    let key = raw.to_lowercase();
    match key.as_str() {
        "processed" | "validated" | "completed" => InvoiceStatus::Completed,
        "processing" => InvoiceStatus::Processing,
        "pending" | "uploaded" => InvoiceStatus::Pending,
        "failed" => InvoiceStatus::Failed,
        _ => InvoiceStatus::Unrecognized(raw.to_uppercase()),
    }
}
