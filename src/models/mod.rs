use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::errors::LogoError;

/// Fixed pixel dimensions for each logo size tier. This set is closed;
/// there are no dynamic sizes.
pub const ALL_SIZES: [LogoSize; 5] = [
    LogoSize::Xs,
    LogoSize::S,
    LogoSize::M,
    LogoSize::L,
    LogoSize::Xl,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogoSize {
    Xs,
    S,
    M,
    L,
    Xl,
}

impl LogoSize {
    pub fn pixels(&self) -> u32 {
        match self {
            LogoSize::Xs => 16,
            LogoSize::S => 32,
            LogoSize::M => 64,
            LogoSize::L => 128,
            LogoSize::Xl => 256,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogoSize::Xs => "xs",
            LogoSize::S => "s",
            LogoSize::M => "m",
            LogoSize::L => "l",
            LogoSize::Xl => "xl",
        }
    }
}

impl std::str::FromStr for LogoSize {
    type Err = LogoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xs" => Ok(LogoSize::Xs),
            "s" => Ok(LogoSize::S),
            "m" => Ok(LogoSize::M),
            "l" => Ok(LogoSize::L),
            "xl" => Ok(LogoSize::Xl),
            other => Err(LogoError::invalid_size(other)),
        }
    }
}

impl std::fmt::Display for LogoSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "logo_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LogoStatus {
    Pending,
    Processed,
    Failed,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Logo {
    pub id: i64,
    pub symbol: String,
    pub company_name: String,
    pub source: String, // provenance, e.g. "github:org/repo" or "llm:anthropic"
    pub original_url: String,
    pub has_xs: bool,
    pub has_s: bool,
    pub has_m: bool,
    pub has_l: bool,
    pub has_xl: bool,
    pub status: LogoStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Logo {
    /// Build a fresh pending record for a newly acquired symbol. The id is
    /// assigned by the metadata store on insert.
    pub fn new_pending(symbol: &str, company_name: &str, source: &str, original_url: &str) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            symbol: symbol.to_uppercase(),
            company_name: company_name.to_string(),
            source: source.to_string(),
            original_url: original_url.to_string(),
            has_xs: false,
            has_s: false,
            has_m: false,
            has_l: false,
            has_xl: false,
            status: LogoStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_size(&self, size: LogoSize) -> bool {
        match size {
            LogoSize::Xs => self.has_xs,
            LogoSize::S => self.has_s,
            LogoSize::M => self.has_m,
            LogoSize::L => self.has_l,
            LogoSize::Xl => self.has_xl,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LlmCall {
    pub id: i64,
    pub symbol: String,
    pub provider: String,
    pub model: String,
    pub result_url: Option<String>,
    pub success: bool,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate record counts surfaced by the stats route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoStats {
    pub total: i64,
    pub processed: i64,
    pub pending: i64,
    pub failed: i64,
}
