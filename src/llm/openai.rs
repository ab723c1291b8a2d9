use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{build_prompt, LlmClient, LogoSearchResult, MAX_TURNS, SUBMIT_TOOL_NAME};
use crate::errors::LogoError;

const OPENAI_API_URL: &str = "https://api.openai.com";

const SYSTEM_PROMPT: &str = r#"You are a logo finder assistant. Search the web to find official company logos for stock tickers.
Return the direct image URL via the submit_logo_url function. Prefer high-resolution PNG/SVG from official sources."#;

/// OpenAI backend, used as a fallback behind Claude. Plain chat completions
/// with function calling; no server-side search tool exists here, so the
/// model answers from what it already knows.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, OPENAI_API_URL.to_string())
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

    async fn post_chat(&self, body: &Value) -> Result<Value, LogoError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LogoError::external_service(
                "openai",
                format!("HTTP {status}: {detail}"),
            ));
        }

        Ok(response.json().await?)
    }

    fn tools(&self) -> Value {
        json!([
            {
                "type": "function",
                "function": {
                    "name": SUBMIT_TOOL_NAME,
                    "description": "Submit the logo URL found for the stock ticker. Call this once you have found the best logo URL.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "logo_url": {
                                "type": "string",
                                "description": "Direct URL to the logo image (PNG, SVG, or JPG)."
                            },
                            "company_name": {
                                "type": "string",
                                "description": "The official company name."
                            },
                            "source": {
                                "type": "string",
                                "description": "Website where the logo was found."
                            },
                            "confidence": {
                                "type": "string",
                                "enum": ["high", "medium", "low"],
                                "description": "Confidence level."
                            }
                        },
                        "required": ["logo_url", "company_name", "confidence"]
                    }
                }
            }
        ])
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn find_logo_url(
        &self,
        symbol: &str,
        company_name: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<LogoSearchResult, LogoError> {
        let prompt = build_prompt(symbol, company_name);
        let tools = self.tools();

        let mut messages = vec![
            json!({"role": "system", "content": SYSTEM_PROMPT}),
            json!({"role": "user", "content": prompt}),
        ];

        for turn in 0..MAX_TURNS {
            let body = json!({
                "model": self.model,
                "messages": messages,
                "tools": tools,
            });

            let response = tokio::select! {
                resp = self.post_chat(&body) => resp?,
                _ = cancellation_token.cancelled() => return Err(LogoError::Cancelled),
            };

            let Some(choice) = response
                .get("choices")
                .and_then(Value::as_array)
                .and_then(|choices| choices.first())
            else {
                return Err(LogoError::external_service(
                    "openai",
                    "response contained no choices",
                ));
            };

            let tool_calls = choice
                .pointer("/message/tool_calls")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            if !tool_calls.is_empty() {
                let assistant_message = choice
                    .get("message")
                    .cloned()
                    .unwrap_or_else(|| json!({"role": "assistant"}));
                messages.push(assistant_message);

                for call in &tool_calls {
                    let name = call
                        .pointer("/function/name")
                        .and_then(Value::as_str)
                        .unwrap_or_default();

                    if name == SUBMIT_TOOL_NAME {
                        // Arguments arrive as a JSON-encoded string
                        let arguments = call
                            .pointer("/function/arguments")
                            .and_then(Value::as_str)
                            .unwrap_or("{}");
                        let result: LogoSearchResult = serde_json::from_str(arguments)
                            .map_err(|e| {
                                LogoError::external_service(
                                    "openai",
                                    format!("malformed tool arguments: {e}"),
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
                            "OpenAI submitted logo for {} on turn {}: {}",
                            symbol,
                            turn + 1,
                            result.logo_url
                        );
                        return Ok(result);
                    }

                    let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
                    messages.push(json!({
                        "role": "tool",
                        "content": "Received. Please continue and call submit_logo_url with the logo URL.",
                        "tool_call_id": id
                    }));
                }
                continue;
            }

            let finish_reason = choice
                .get("finish_reason")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if finish_reason == "stop" {
                return Err(LogoError::no_logo_found(
                    self.provider_name(),
                    symbol,
                    "model stopped without submitting a logo",
                ));
            }
        }

        Err(LogoError::ExceededMaxTurns {
            symbol: symbol.to_string(),
            max_turns: MAX_TURNS,
        })
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
