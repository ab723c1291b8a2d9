use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{build_prompt, LlmClient, LogoSearchResult, MAX_TURNS, SUBMIT_TOOL_NAME};
use crate::errors::LogoError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude backend. Uses the built-in `web_search` server tool for the
/// searching itself, so the loop here only has to relay tool results for
/// the submit tool and keep the conversation going.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, ANTHROPIC_API_URL.to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("logo-service/1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key,
            model,
            base_url,
        }
    }

    async fn post_messages(&self, body: &Value) -> Result<Value, LogoError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LogoError::external_service(
                "anthropic",
                format!("HTTP {status}: {detail}"),
            ));
        }

        Ok(response.json().await?)
    }

    fn tools(&self) -> Value {
        json!([
            {
                "type": "web_search_20250305",
                "name": "web_search"
            },
            {
                "name": SUBMIT_TOOL_NAME,
                "description": "Submit the logo URL you found. Call this tool once you have found the best logo URL.",
                "input_schema": {
                    "type": "object",
                    "properties": {
                        "logo_url": {
                            "type": "string",
                            "description": "Direct URL to the logo image (PNG, SVG, or JPG). Must be a direct image URL, not a webpage."
                        },
                        "company_name": {
                            "type": "string",
                            "description": "The official company name for this stock ticker."
                        },
                        "source": {
                            "type": "string",
                            "description": "The website where the logo was found (e.g., 'wikipedia.org', 'company.com')."
                        },
                        "confidence": {
                            "type": "string",
                            "enum": ["high", "medium", "low"],
                            "description": "How confident you are this is the correct official logo."
                        }
                    }
                }
            }
        ])
    }
}

fn is_tool_use(block: &Value, name: &str) -> bool {
    block.get("type").and_then(Value::as_str) == Some("tool_use")
        && block.get("name").and_then(Value::as_str) == Some(name)
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn find_logo_url(
        &self,
        symbol: &str,
        company_name: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<LogoSearchResult, LogoError> {
        let prompt = build_prompt(symbol, company_name);
        let tools = self.tools();

        let mut messages = vec![json!({"role": "user", "content": prompt})];

        for turn in 0..MAX_TURNS {
            let body = json!({
                "model": self.model,
                "max_tokens": 1024,
                "messages": messages,
                "tools": tools,
            });

            let response = tokio::select! {
                resp = self.post_messages(&body) => resp?,
                _ = cancellation_token.cancelled() => return Err(LogoError::Cancelled),
            };

            let content = response
                .get("content")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            // A submit call anywhere in the turn ends the loop
            for block in &content {
                if is_tool_use(block, SUBMIT_TOOL_NAME) {
                    let input = block.get("input").cloned().unwrap_or(Value::Null);
                    let result: LogoSearchResult =
                        serde_json::from_value(input).map_err(|e| {
                            LogoError::external_service(
                                "anthropic",
                                format!("malformed tool input: {e}"),
                            )
                        })?;

                    if result.logo_url.is_empty() {
                        return Err(LogoError::no_logo_found(
                            self.provider_name(),
                            symbol,
                            "submitted an empty logo URL",
                        ));
                    }

                    debug!(
                        "Claude submitted logo for {} on turn {}: {}",
                        symbol,
                        turn + 1,
                        result.logo_url
                    );
                    return Ok(result);
                }
            }

            let stop_reason = response
                .get("stop_reason")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if stop_reason == "end_turn" {
                return Err(LogoError::no_logo_found(
                    self.provider_name(),
                    symbol,
                    "model ended the turn without submitting a logo",
                ));
            }

            // Carry the assistant turn forward. Web search runs server-side
            // and needs no tool result from us; anything else gets an
            // acknowledgement so the model keeps going.
            messages.push(json!({"role": "assistant", "content": content}));

            let mut tool_results = Vec::new();
            for block in &content {
                if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                    continue;
                }
                let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                if name == "web_search" {
                    continue;
                }
                let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                tool_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": id,
                    "content": "Received, please continue searching."
                }));
            }
            if !tool_results.is_empty() {
                messages.push(json!({"role": "user", "content": tool_results}));
            }
        }

        Err(LogoError::ExceededMaxTurns {
            symbol: symbol.to_string(),
            max_turns: MAX_TURNS,
        })
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
