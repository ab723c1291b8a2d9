//! Logo acquisition and serving orchestration.
//!
//! Ties the layers together: metadata store and blob store form the cache,
//! the ordered provider chain fills misses, and the image normalizer turns
//! whatever a provider hands back into the canonical PNG set. Bulk imports
//! funnel through the same ingestion routine as on-demand lookups.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::errors::LogoError;
use crate::models::{Logo, LogoSize, LogoStats, LogoStatus};
use crate::processing::ImageProcessor;
use crate::providers::{ImportStats, IngestOutcome, LogoProvider, LogoResult, LogoSink};
use crate::storage::LogoStorage;

#[derive(Clone)]
pub struct LogoService {
    database: Database,
    storage: LogoStorage,
    processor: ImageProcessor,
    providers: Vec<Arc<dyn LogoProvider>>,
}

impl LogoService {
    pub fn new(
        database: Database,
        storage: LogoStorage,
        processor: ImageProcessor,
        providers: Vec<Arc<dyn LogoProvider>>,
    ) -> Self {
        Self {
            database,
            storage,
            processor,
            providers,
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Return the rendered PNG for a symbol at one size, acquiring and
    /// normalizing the logo first if it is not already cached.
    pub async fn get_logo(
        &self,
        symbol: &str,
        size: LogoSize,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<u8>, LogoError> {
        let symbol = symbol.to_uppercase();

        if let Some(data) = self.from_cache(&symbol, size).await {
            return Ok(data);
        }

        let result = self.acquire(&symbol, cancellation_token).await?;

        match self.process_and_store(&result).await {
            Ok(_) => {}
            // Sizes that did render stay servable even when the record
            // as a whole is marked failed
            Err(LogoError::ProcessingFailed { .. }) => {}
            Err(e) => return Err(e),
        }

        self.storage.read_logo(&symbol, size).await
    }

    /// Cache hit requires a processed record, the size flag set, and a
    /// readable blob. Anything else, including lookup errors, is a miss.
    async fn from_cache(&self, symbol: &str, size: LogoSize) -> Option<Vec<u8>> {
        let record = match self.database.get_logo(symbol).await {
            Ok(record) => record?,
            Err(e) => {
                debug!("Cache lookup for '{}' failed: {}", symbol, e);
                return None;
            }
        };

        if record.status != LogoStatus::Processed || !record.has_size(size) {
            return None;
        }

        match self.storage.read_logo(symbol, size).await {
            Ok(data) => {
                debug!("Serving '{}' size {} from cache", symbol, size);
                Some(data)
            }
            Err(e) => {
                debug!("Cached blob for '{}' size {} unreadable: {}", symbol, size, e);
                None
            }
        }
    }

    /// Walk the provider chain in configured order, first success wins.
    /// Misses and provider failures both fall through to the next layer;
    /// only cancellation aborts the walk.
    async fn acquire(
        &self,
        symbol: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<LogoResult, LogoError> {
        for provider in &self.providers {
            match provider.get_logo(symbol, cancellation_token).await {
                Ok(result) => {
                    info!(
                        "Acquired logo for '{}' from provider '{}'",
                        symbol,
                        provider.name()
                    );
                    return Ok(result);
                }
                Err(LogoError::Cancelled) => return Err(LogoError::Cancelled),
                Err(e) if e.is_not_found() => {
                    debug!("Provider '{}' has no logo for '{}'", provider.name(), symbol);
                }
                Err(e) => {
                    warn!("Provider '{}' failed for '{}': {}", provider.name(), symbol, e);
                }
            }
        }

        Err(LogoError::NoProviderFound {
            symbol: symbol.to_string(),
        })
    }

    /// Shared ingestion routine for on-demand misses and bulk imports.
    ///
    /// Already-processed symbols are a typed no-op. Otherwise the record is
    /// upserted, every size is rendered and written, and the final status
    /// reflects whether all sizes made it. Size flags are only ever set,
    /// never cleared, so reprocessing can add sizes but not remove them.
    pub async fn process_and_store(&self, result: &LogoResult) -> Result<IngestOutcome, LogoError> {
        let symbol = result.symbol.to_uppercase();

        match self.database.get_logo(&symbol).await? {
            Some(existing) if existing.status == LogoStatus::Processed => {
                debug!("Logo for '{}' already processed, skipping", symbol);
                return Ok(IngestOutcome::AlreadyProcessed);
            }
            Some(mut existing) => {
                // Retry of a pending or failed record: refresh provenance
                // before reprocessing
                if !result.company_name.is_empty() {
                    existing.company_name = result.company_name.clone();
                }
                existing.source = result.source.clone();
                existing.original_url = result.original_url.clone();
                self.database.update_logo(&existing).await?;
            }
            None => {
                let logo = Logo::new_pending(
                    &symbol,
                    &result.company_name,
                    &result.source,
                    &result.original_url,
                );
                self.database.create_logo(&logo).await?;
            }
        }

        let outcome = self.processor.normalize_all(&result.image_data);
        let mut failures = outcome.failures;

        for (size, png) in &outcome.rendered {
            match self.storage.write_logo(&symbol, *size, png).await {
                Ok(_) => self.database.set_size_available(&symbol, *size).await?,
                Err(e) => failures.push(format!("{size} write: {e}")),
            }
        }

        if failures.is_empty() {
            self.database
                .set_logo_status(&symbol, LogoStatus::Processed, None)
                .await?;
            info!("Processed logo for '{}' from {}", symbol, result.source);
            Ok(IngestOutcome::Stored)
        } else {
            let summary = failures.join("; ");
            self.database
                .set_logo_status(&symbol, LogoStatus::Failed, Some(&summary))
                .await?;
            Err(LogoError::processing_failed(&symbol, summary))
        }
    }

    /// Flatten a rendered PNG onto an opaque background color.
    pub fn apply_background(&self, png_data: &[u8], color: &str) -> Result<Vec<u8>, LogoError> {
        self.processor.apply_background(png_data, color)
    }

    pub async fn stats(&self) -> Result<LogoStats, LogoError> {
        Ok(LogoStats {
            total: self.database.count_logos().await?,
            processed: self
                .database
                .count_logos_by_status(LogoStatus::Processed)
                .await?,
            pending: self
                .database
                .count_logos_by_status(LogoStatus::Pending)
                .await?,
            failed: self
                .database
                .count_logos_by_status(LogoStatus::Failed)
                .await?,
        })
    }

    /// Run a bulk import, feeding every candidate through the shared
    /// ingestion routine. Both recognized sources ("all" and "github")
    /// resolve to the repository mirrors; the LLM layer has no catalog
    /// to enumerate.
    pub async fn import(
        &self,
        source: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<ImportStats, LogoError> {
        if source != "all" && source != "github" {
            return Err(LogoError::internal(format!(
                "unknown import source '{source}'"
            )));
        }

        let provider = self
            .providers
            .iter()
            .find(|p| p.name() == "github")
            .ok_or_else(|| LogoError::internal("no github provider configured"))?;

        info!("Starting bulk import from provider '{}'", provider.name());
        let stats = provider.bulk_import(self, cancellation_token).await?;
        info!(
            "Bulk import finished: {} total, {} imported, {} skipped, {} failed",
            stats.total, stats.imported, stats.skipped, stats.failed
        );
        Ok(stats)
    }
}

#[async_trait::async_trait]
impl LogoSink for LogoService {
    async fn ingest(&self, result: LogoResult) -> Result<IngestOutcome, LogoError> {
        self.process_and_store(&result).await
    }
}
