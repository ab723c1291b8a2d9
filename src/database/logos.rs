use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::Database;
use crate::errors::LogoError;
use crate::models::{Logo, LogoSize, LogoStatus};

// Helper function to parse datetime from either RFC3339 or SQLite format
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, LogoError> {
    // Try RFC3339 first
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (YYYY-MM-DD HH:MM:SS)
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    Err(LogoError::internal(format!(
        "failed to parse datetime: {s}"
    )))
}

fn status_as_str(status: &LogoStatus) -> &'static str {
    match status {
        LogoStatus::Pending => "pending",
        LogoStatus::Processed => "processed",
        LogoStatus::Failed => "failed",
        LogoStatus::NotFound => "not_found",
    }
}

fn status_from_str(s: &str) -> Result<LogoStatus, LogoError> {
    match s {
        "pending" => Ok(LogoStatus::Pending),
        "processed" => Ok(LogoStatus::Processed),
        "failed" => Ok(LogoStatus::Failed),
        "not_found" => Ok(LogoStatus::NotFound),
        other => Err(LogoError::internal(format!("unknown logo status: {other}"))),
    }
}

fn map_logo_row(row: &SqliteRow) -> Result<Logo, LogoError> {
    let status_str: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Logo {
        id: row.get("id"),
        symbol: row.get("symbol"),
        company_name: row.get("company_name"),
        source: row.get("source"),
        original_url: row.get("original_url"),
        has_xs: row.get("has_xs"),
        has_s: row.get("has_s"),
        has_m: row.get("has_m"),
        has_l: row.get("has_l"),
        has_xl: row.get("has_xl"),
        status: status_from_str(&status_str)?,
        error_message: row.get("error_message"),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl Database {
    pub async fn get_logo(&self, symbol: &str) -> Result<Option<Logo>, LogoError> {
        let symbol = symbol.to_uppercase();
        let row = sqlx::query(
            "SELECT id, symbol, company_name, source, original_url,
             has_xs, has_s, has_m, has_l, has_xl,
             status, error_message, created_at, updated_at
             FROM logos WHERE symbol = ?",
        )
        .bind(&symbol)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_logo_row).transpose()
    }

    pub async fn create_logo(&self, logo: &Logo) -> Result<i64, LogoError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO logos
             (symbol, company_name, source, original_url,
              has_xs, has_s, has_m, has_l, has_xl,
              status, error_message, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(logo.symbol.to_uppercase())
        .bind(&logo.company_name)
        .bind(&logo.source)
        .bind(&logo.original_url)
        .bind(logo.has_xs)
        .bind(logo.has_s)
        .bind(logo.has_m)
        .bind(logo.has_l)
        .bind(logo.has_xl)
        .bind(status_as_str(&logo.status))
        .bind(&logo.error_message)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!("Created logo record for '{}'", logo.symbol);
        Ok(result.last_insert_rowid())
    }

    /// Full-record replace. Symbol and creation time are immutable; callers
    /// pass the already-mutated record.
    pub async fn update_logo(&self, logo: &Logo) -> Result<(), LogoError> {
        sqlx::query(
            "UPDATE logos SET company_name = ?, source = ?, original_url = ?,
             has_xs = ?, has_s = ?, has_m = ?, has_l = ?, has_xl = ?,
             status = ?, error_message = ?, updated_at = ?
             WHERE symbol = ?",
        )
        .bind(&logo.company_name)
        .bind(&logo.source)
        .bind(&logo.original_url)
        .bind(logo.has_xs)
        .bind(logo.has_s)
        .bind(logo.has_m)
        .bind(logo.has_l)
        .bind(logo.has_xl)
        .bind(status_as_str(&logo.status))
        .bind(&logo.error_message)
        .bind(Utc::now().to_rfc3339())
        .bind(logo.symbol.to_uppercase())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark one rendered size as available. Flags only ever go from 0 to 1;
    /// a re-render of an existing size is a no-op here.
    pub async fn set_size_available(
        &self,
        symbol: &str,
        size: LogoSize,
    ) -> Result<(), LogoError> {
        let column = match size {
            LogoSize::Xs => "has_xs",
            LogoSize::S => "has_s",
            LogoSize::M => "has_m",
            LogoSize::L => "has_l",
            LogoSize::Xl => "has_xl",
        };

        let sql = format!("UPDATE logos SET {column} = 1, updated_at = ? WHERE symbol = ?");
        sqlx::query(&sql)
            .bind(Utc::now().to_rfc3339())
            .bind(symbol.to_uppercase())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn set_logo_status(
        &self,
        symbol: &str,
        status: LogoStatus,
        error_message: Option<&str>,
    ) -> Result<(), LogoError> {
        // An empty message clears the column the same as None
        sqlx::query(
            "UPDATE logos SET status = ?, error_message = ?, updated_at = ? WHERE symbol = ?",
        )
        .bind(status_as_str(&status))
        .bind(error_message.filter(|m| !m.is_empty()))
        .bind(Utc::now().to_rfc3339())
        .bind(symbol.to_uppercase())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Oldest-first slice of records still awaiting acquisition.
    pub async fn list_pending(&self, limit: i64) -> Result<Vec<Logo>, LogoError> {
        let rows = sqlx::query(
            "SELECT id, symbol, company_name, source, original_url,
             has_xs, has_s, has_m, has_l, has_xl,
             status, error_message, created_at, updated_at
             FROM logos WHERE status = 'pending'
             ORDER BY created_at ASC, id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_logo_row).collect()
    }

    pub async fn count_logos(&self) -> Result<i64, LogoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logos")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_logos_by_status(&self, status: LogoStatus) -> Result<i64, LogoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logos WHERE status = ?")
            .bind(status_as_str(&status))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
