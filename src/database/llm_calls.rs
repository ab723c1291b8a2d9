use chrono::{DateTime, Utc};
use sqlx::Row;

use super::Database;
use crate::errors::LogoError;
use crate::models::LlmCall;

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, LogoError> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    Err(LogoError::internal(format!(
        "failed to parse datetime: {s}"
    )))
}

impl Database {
    /// Append one audit row per LLM attempt, successful or not.
    pub async fn record_llm_call(&self, call: &LlmCall) -> Result<i64, LogoError> {
        let result = sqlx::query(
            "INSERT INTO llm_calls
             (symbol, provider, model, result_url, success, duration_ms, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(call.symbol.to_uppercase())
        .bind(&call.provider)
        .bind(&call.model)
        .bind(&call.result_url)
        .bind(call.success)
        .bind(call.duration_ms)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list_llm_calls(&self, symbol: &str) -> Result<Vec<LlmCall>, LogoError> {
        let rows = sqlx::query(
            "SELECT id, symbol, provider, model, result_url, success, duration_ms, created_at
             FROM llm_calls WHERE symbol = ? ORDER BY id",
        )
        .bind(symbol.to_uppercase())
        .fetch_all(&self.pool)
        .await?;

        let mut calls = Vec::new();
        for row in rows {
            let created_at: String = row.get("created_at");
            calls.push(LlmCall {
                id: row.get("id"),
                symbol: row.get("symbol"),
                provider: row.get("provider"),
                model: row.get("model"),
                result_url: row.get("result_url"),
                success: row.get("success"),
                duration_ms: row.get("duration_ms"),
                created_at: parse_datetime(&created_at)?,
            });
        }

        Ok(calls)
    }
}
