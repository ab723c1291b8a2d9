use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{download_limited, ImportStats, LogoProvider, LogoResult, LogoSink};
use crate::database::Database;
use crate::errors::LogoError;
use crate::llm::LlmClient;
use crate::models::LlmCall;
use crate::ratelimit::RateLimiter;

/// Paid acquisition layer: asks LLM backends to web-search for an official
/// logo URL, then downloads it. Backends run in configured order behind one
/// strictly paced rate limiter, and every attempt leaves an audit row for
/// cost tracking.
pub struct LlmSearchProvider {
    clients: Vec<Box<dyn LlmClient>>,
    limiter: RateLimiter,
    database: Database,
    client: reqwest::Client,
}

impl LlmSearchProvider {
    pub fn new(clients: Vec<Box<dyn LlmClient>>, rate_per_minute: u32, database: Database) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("logo-service/1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            clients,
            limiter: RateLimiter::per_minute(rate_per_minute),
            database,
            client,
        }
    }

    async fn try_backend(
        &self,
        backend: &dyn LlmClient,
        symbol: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<LogoResult, LogoError> {
        let start = Instant::now();
        let search = backend
            .find_logo_url(symbol, "", cancellation_token)
            .await;
        let duration_ms = start.elapsed().as_millis() as i64;

        self.record_call(backend, symbol, &search, duration_ms).await;

        let search = search?;

        let image_data =
            download_limited(&self.client, &search.logo_url, cancellation_token).await?;

        info!(
            "LLM backend {} found logo for {} at {} ({}ms, confidence {})",
            backend.provider_name(),
            symbol,
            search.logo_url,
            duration_ms,
            search.confidence
        );

        Ok(LogoResult {
            symbol: symbol.to_uppercase(),
            company_name: search.company_name,
            image_data,
            source: format!("llm:{}", backend.provider_name()),
            original_url: search.logo_url,
        })
    }

    /// Audit failures are logged and swallowed; cost tracking must never
    /// block the acquisition path.
    async fn record_call(
        &self,
        backend: &dyn LlmClient,
        symbol: &str,
        search: &Result<crate::llm::LogoSearchResult, LogoError>,
        duration_ms: i64,
    ) {
        let call = LlmCall {
            id: 0,
            symbol: symbol.to_uppercase(),
            provider: backend.provider_name().to_string(),
            model: backend.model_name().to_string(),
            result_url: search.as_ref().ok().map(|s| s.logo_url.clone()),
            success: search.is_ok(),
            duration_ms: Some(duration_ms),
            created_at: chrono::Utc::now(),
        };

        if let Err(e) = self.database.record_llm_call(&call).await {
            error!("Failed to record LLM call for {}: {}", symbol, e);
        }
    }
}

#[async_trait]
impl LogoProvider for LlmSearchProvider {
    async fn get_logo(
        &self,
        symbol: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<LogoResult, LogoError> {
        if self.clients.is_empty() {
            return Err(LogoError::internal("no LLM backends configured"));
        }

        let mut last_err = LogoError::internal("no LLM backends attempted");

        for (i, backend) in self.clients.iter().enumerate() {
            // Blocks until the shared budget admits another paid call
            self.limiter.wait(cancellation_token).await?;

            match self
                .try_backend(backend.as_ref(), symbol, cancellation_token)
                .await
            {
                Ok(result) => return Ok(result),
                Err(LogoError::Cancelled) => return Err(LogoError::Cancelled),
                Err(e) => {
                    if i < self.clients.len() - 1 {
                        warn!(
                            "LLM backend {} failed for {}, trying next: {}",
                            backend.provider_name(),
                            symbol,
                            e
                        );
                    }
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    /// Enumerating every ticker through a paid search is never worth it;
    /// this provider only serves on-demand misses.
    async fn bulk_import(
        &self,
        _sink: &dyn LogoSink,
        _cancellation_token: &CancellationToken,
    ) -> Result<ImportStats, LogoError> {
        Err(LogoError::internal(
            "LLM provider does not support bulk import",
        ))
    }

    fn name(&self) -> &str {
        "llm"
    }
}
