//! LLM-backed logo search.
//!
//! Each backend drives the same bounded agentic loop: prompt the model with
//! the ticker, let it search the web, and wait for it to call the
//! `submit_logo_url` tool with a direct image URL. Backends differ only in
//! how requests and responses are marshaled to their API.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::errors::LogoError;

pub mod anthropic;
pub mod openai;

/// Turn cap for the agentic loop. A model that has not submitted after
/// this many exchanges is not going to.
pub const MAX_TURNS: usize = 5;

/// Name of the structured-output tool every backend exposes to its model.
pub const SUBMIT_TOOL_NAME: &str = "submit_logo_url";

/// Structured result parsed from the model's submit tool call. Fields other
/// than the URL are hints the model may omit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoSearchResult {
    #[serde(default)]
    pub logo_url: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub confidence: String,
}

/// One LLM backend capable of web-searching for a logo URL.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn find_logo_url(
        &self,
        symbol: &str,
        company_name: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<LogoSearchResult, LogoError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// User prompt shared by all backends.
pub(crate) fn build_prompt(symbol: &str, company_name: &str) -> String {
    let hint = if company_name.is_empty() {
        String::new()
    } else {
        format!(" (company name: {company_name})")
    };

    format!(
        r#"Find the official company logo for stock ticker symbol "{symbol}"{hint}.

Search the web to find a high-quality logo image. Prefer:
1. Official company website logos
2. Wikipedia commons logos (often high-quality SVG/PNG)
3. Well-known financial data sites

Requirements for the logo URL:
- Must be a DIRECT link to an image file (ending in .png, .svg, .jpg, or similar)
- Must be a high-resolution version (at least 200x200 pixels)
- Must be the company's primary/official logo (not a product logo or icon variant)
- The URL must be publicly accessible (no authentication required)

Once you find the best logo, call the submit_logo_url tool with the URL and details.
If you cannot find a suitable logo, explain why in your response."#
    )
}
