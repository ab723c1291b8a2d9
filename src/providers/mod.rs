//! Logo acquisition providers.
//!
//! A provider knows how to find raw logo bytes for a symbol. Providers are
//! tried in configured order with first-success-wins semantics; bulk import
//! is only meaningful for sources cheap enough to enumerate.

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::errors::{LogoError, MAX_DOWNLOAD_BYTES};

pub mod github;
pub mod llm;

/// Cap on the error strings accumulated during a bulk import, so a run over
/// tens of thousands of files cannot balloon the stats payload.
pub const MAX_IMPORT_ERRORS: usize = 50;

/// A successfully acquired logo, not yet normalized or persisted.
#[derive(Debug, Clone)]
pub struct LogoResult {
    pub symbol: String,
    pub company_name: String,
    pub image_data: Vec<u8>,
    pub source: String,
    pub original_url: String,
}

/// How the sink handled one acquired logo. `AlreadyProcessed` is a success
/// that counts as skipped in import accounting, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored,
    AlreadyProcessed,
}

/// Receiver for acquired logos during bulk import; the orchestrator's
/// ingestion routine implements this.
#[async_trait]
pub trait LogoSink: Send + Sync {
    async fn ingest(&self, result: LogoResult) -> Result<IngestOutcome, LogoError>;
}

#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl ImportStats {
    pub(crate) fn push_error(&mut self, message: String) {
        if self.errors.len() < MAX_IMPORT_ERRORS {
            self.errors.push(message);
        }
    }
}

/// One source of logo bytes (repository mirror, LLM search).
#[async_trait]
pub trait LogoProvider: Send + Sync {
    /// Fetch a single logo. A miss is reported as `NotFound`, which drives
    /// the fallback chain rather than failing the lookup.
    async fn get_logo(
        &self,
        symbol: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<LogoResult, LogoError>;

    /// Stream every logo this source offers into the sink. Providers
    /// without an enumerable catalog return an error.
    async fn bulk_import(
        &self,
        sink: &dyn LogoSink,
        cancellation_token: &CancellationToken,
    ) -> Result<ImportStats, LogoError>;

    fn name(&self) -> &str;
}

/// Download a file with the global byte cap applied while streaming, so an
/// unexpectedly large response never lands fully in memory. Cancellation
/// aborts the transfer mid-stream.
pub(crate) async fn download_limited(
    client: &reqwest::Client,
    url: &str,
    cancellation_token: &CancellationToken,
) -> Result<Vec<u8>, LogoError> {
    let download = async {
        let response = client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LogoError::external_service(
                "download",
                format!("HTTP {status} for {url}"),
            ));
        }

        let mut data = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if data.len() + chunk.len() > MAX_DOWNLOAD_BYTES {
                return Err(LogoError::DownloadTooLarge {
                    url: url.to_string(),
                    max_bytes: MAX_DOWNLOAD_BYTES,
                });
            }
            data.extend_from_slice(&chunk);
        }

        Ok(data)
    };

    tokio::select! {
        result = download => result,
        _ = cancellation_token.cancelled() => Err(LogoError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_errors_are_bounded() {
        let mut stats = ImportStats::default();
        for i in 0..(MAX_IMPORT_ERRORS + 20) {
            stats.push_error(format!("error {i}"));
        }
        assert_eq!(stats.errors.len(), MAX_IMPORT_ERRORS);
    }
}
