use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{download_limited, ImportStats, IngestOutcome, LogoProvider, LogoResult, LogoSink};
use crate::errors::LogoError;

const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_RAW_URL: &str = "https://raw.githubusercontent.com";

/// Icons directory used by the community ticker-logo repositories.
const ICONS_PATH: &str = "ticker_icons/";

/// Mirrors community GitHub repositories that store one PNG per ticker at
/// `ticker_icons/{SYMBOL}.png`, for example davidepalazzo/ticker-logos and
/// nvstly/icons. This is the free acquisition layer tried before any LLM.
pub struct GithubProvider {
    repos: Vec<String>,
    client: reqwest::Client,
    api_base: String,
    raw_base: String,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

impl GithubProvider {
    pub fn new(repos: Vec<String>) -> Self {
        Self::with_base_urls(
            repos,
            GITHUB_API_URL.to_string(),
            GITHUB_RAW_URL.to_string(),
        )
    }

    pub fn with_base_urls(repos: Vec<String>, api_base: String, raw_base: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("logo-service/1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            repos,
            client,
            api_base,
            raw_base,
        }
    }

    /// List every file in a repo with one Git Trees API call instead of
    /// paginated directory listings.
    async fn fetch_tree(&self, repo: &str) -> Result<Vec<TreeEntry>, LogoError> {
        let url = format!(
            "{}/repos/{}/git/trees/main?recursive=1",
            self.api_base, repo
        );

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LogoError::external_service(
                "github",
                format!("tree listing returned HTTP {status}: {body}"),
            ));
        }

        let tree: TreeResponse = response.json().await?;

        if tree.truncated {
            warn!("GitHub tree response for {repo} was truncated; some files may be missing");
        }

        Ok(tree.tree)
    }

    async fn import_from_repo(
        &self,
        repo: &str,
        sink: &dyn LogoSink,
        cancellation_token: &CancellationToken,
        stats: &mut ImportStats,
    ) -> Result<(), LogoError> {
        let entries = self.fetch_tree(repo).await?;

        for entry in entries {
            if entry.entry_type != "blob"
                || !entry.path.starts_with(ICONS_PATH)
                || !entry.path.ends_with(".png")
            {
                continue;
            }

            // "ticker_icons/AAPL.png" -> "AAPL"
            let filename = entry.path.rsplit('/').next().unwrap_or(&entry.path);
            let symbol = filename
                .strip_suffix(".png")
                .unwrap_or(filename)
                .to_uppercase();

            stats.total += 1;

            if cancellation_token.is_cancelled() {
                return Err(LogoError::Cancelled);
            }

            let raw_url = format!("{}/{}/main/{}", self.raw_base, repo, entry.path);
            let data = match download_limited(&self.client, &raw_url, cancellation_token).await {
                Ok(data) => data,
                Err(LogoError::Cancelled) => return Err(LogoError::Cancelled),
                Err(e) => {
                    stats.failed += 1;
                    stats.push_error(format!("{symbol}: download failed: {e}"));
                    continue;
                }
            };

            let result = LogoResult {
                symbol: symbol.clone(),
                company_name: String::new(),
                image_data: data,
                source: format!("github:{repo}"),
                original_url: raw_url,
            };

            match sink.ingest(result).await {
                Ok(IngestOutcome::Stored) => {
                    stats.imported += 1;
                    if stats.imported % 100 == 0 {
                        info!(
                            "Import progress for {}: {} imported, {} seen",
                            repo, stats.imported, stats.total
                        );
                    }
                }
                Ok(IngestOutcome::AlreadyProcessed) => {
                    stats.skipped += 1;
                }
                Err(e) => {
                    stats.failed += 1;
                    stats.push_error(format!("{symbol}: {e}"));
                }
            }
        }

        info!(
            "Repo import complete for {}: {} total, {} imported, {} skipped, {} failed",
            repo, stats.total, stats.imported, stats.skipped, stats.failed
        );
        Ok(())
    }
}

#[async_trait]
impl LogoProvider for GithubProvider {
    async fn get_logo(
        &self,
        symbol: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<LogoResult, LogoError> {
        let symbol = symbol.to_uppercase();

        for repo in &self.repos {
            let raw_url = format!("{}/{}/main/{}{}.png", self.raw_base, repo, ICONS_PATH, symbol);

            match download_limited(&self.client, &raw_url, cancellation_token).await {
                Ok(data) => {
                    return Ok(LogoResult {
                        symbol,
                        company_name: String::new(),
                        image_data: data,
                        source: format!("github:{repo}"),
                        original_url: raw_url,
                    });
                }
                Err(LogoError::Cancelled) => return Err(LogoError::Cancelled),
                Err(e) => {
                    debug!("Logo for {} not in {}: {}", symbol, repo, e);
                }
            }
        }

        Err(LogoError::not_found(format!(
            "logo for {symbol} in any GitHub repo"
        )))
    }

    /// Walk every configured repo and feed each candidate PNG to the sink.
    /// A repo that fails to list is recorded and the rest still run;
    /// cancellation stops the walk but keeps the stats gathered so far.
    async fn bulk_import(
        &self,
        sink: &dyn LogoSink,
        cancellation_token: &CancellationToken,
    ) -> Result<ImportStats, LogoError> {
        let mut stats = ImportStats::default();

        for repo in &self.repos {
            info!("Importing logos from GitHub repo {}", repo);

            match self
                .import_from_repo(repo, sink, cancellation_token, &mut stats)
                .await
            {
                Ok(()) => {}
                Err(LogoError::Cancelled) => {
                    warn!("Import cancelled during {}", repo);
                    stats.push_error(format!("{repo}: import cancelled"));
                    break;
                }
                Err(e) => {
                    error!("Repo import failed for {}: {}", repo, e);
                    stats.push_error(format!("{repo}: {e}"));
                }
            }
        }

        Ok(stats)
    }

    fn name(&self) -> &str {
        "github"
    }
}
