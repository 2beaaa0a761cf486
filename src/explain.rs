//! Explanation providers.
//!
//! An [`Explainer`] turns an [`ErrorReport`] into an [`ExplanationResult`].
//! Providers return errors for transport or API failures; the pipeline
//! replaces any error with [`ExplanationResult::fallback`], so a failure
//! here never reaches the caller.
//!
//! # Providers
//!
//! | Provider | Config value | Network |
//! |----------|--------------|---------|
//! | [`GeminiExplainer`] | `"gemini"` | `POST {base}/v1beta/models/{model}:generateContent` |
//! | [`DisabledExplainer`] | `"disabled"` | none; always the fallback |
//!
//! # Response Parsing
//!
//! The model is asked for a JSON object. [`parse_explanation`] strips a
//! surrounding Markdown code fence, then reads `explanation`,
//! `suggestedFix` and `possibleCauses`. Text that is not a JSON object
//! becomes the explanation verbatim.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use console_whisperer_core::models::{ErrorReport, ExplanationResult};

use crate::config::ExplainerConfig;

/// Placeholder explanation when the model's JSON lacks one.
pub const MISSING_EXPLANATION: &str = "No explanation available";

const PROMPT_TEMPLATE: &str = r#"Explain this JavaScript error in plain English and suggest a fix.
Error: "{{errorMessage}}"
Context: "{{errorContext}}"
URL: "{{errorUrl}}"

Please format your response as JSON with the following structure:
{
  "explanation": "A clear explanation of what the error means in plain English",
  "suggestedFix": "Code or steps to fix the error",
  "possibleCauses": ["List of possible causes"]
}"#;

#[async_trait]
pub trait Explainer: Send + Sync {
    fn name(&self) -> &str;

    async fn explain(&self, report: &ErrorReport) -> Result<ExplanationResult>;
}

/// Create the explainer selected by `[explainer] provider`.
pub fn create_explainer(config: &ExplainerConfig) -> Result<Arc<dyn Explainer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledExplainer)),
        "gemini" => Ok(Arc::new(GeminiExplainer::new(config)?)),
        other => bail!("Unknown explainer provider: '{}'", other),
    }
}

/// Fill the prompt template from a report.
pub fn format_prompt(report: &ErrorReport) -> String {
    fn or_default<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
        value.filter(|v| !v.is_empty()).unwrap_or(default)
    }

    PROMPT_TEMPLATE
        .replace(
            "{{errorMessage}}",
            or_default(Some(report.message.as_str()), "Unknown error"),
        )
        .replace(
            "{{errorContext}}",
            or_default(report.stack.as_deref(), "No stack trace available"),
        )
        .replace(
            "{{errorUrl}}",
            or_default(report.url.as_deref(), "Unknown URL"),
        )
}

/// Parse raw model text into an explanation.
pub fn parse_explanation(raw: &str) -> ExplanationResult {
    let body = strip_code_fence(raw);

    let parsed = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => {
            tracing::warn!("explanation response is not a JSON object; using raw text");
            return ExplanationResult {
                explanation: raw.to_string(),
                suggested_fix: None,
                possible_causes: Vec::new(),
            };
        }
    };

    let explanation = parsed
        .get("explanation")
        .and_then(|e| e.as_str())
        .filter(|e| !e.is_empty())
        .unwrap_or(MISSING_EXPLANATION)
        .to_string();
    let suggested_fix = parsed
        .get("suggestedFix")
        .and_then(|f| f.as_str())
        .filter(|f| !f.is_empty())
        .map(str::to_string);
    let possible_causes = parsed
        .get("possibleCauses")
        .and_then(|c| c.as_array())
        .map(|causes| {
            causes
                .iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    ExplanationResult {
        explanation,
        suggested_fix,
        possible_causes,
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    match inner.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => inner.trim(),
    }
}

// ============ Disabled Provider ============

/// Provider that never calls out and always yields the fallback.
pub struct DisabledExplainer;

#[async_trait]
impl Explainer for DisabledExplainer {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn explain(&self, _report: &ErrorReport) -> Result<ExplanationResult> {
        Ok(ExplanationResult::fallback())
    }
}

// ============ Gemini Provider ============

/// Google Gemini `generateContent` client.
///
/// The API key is read from the environment variable named by
/// `[explainer] api_key_env` on every call, so a missing key surfaces as a
/// per-request failure rather than a startup error.
pub struct GeminiExplainer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key_env: String,
    generation_config: Value,
    max_retries: u32,
}

impl GeminiExplainer {
    pub fn new(config: &ExplainerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            generation_config: json!({
                "temperature": config.temperature,
                "topP": config.top_p,
                "topK": config.top_k,
                "maxOutputTokens": config.max_output_tokens,
                "responseMimeType": "text/plain",
            }),
            max_retries: config.max_retries,
        })
    }

    /// Send `prompt` with retry/backoff and return the generated text.
    ///
    /// Retry strategy:
    /// - HTTP 429 or 5xx → retry with exponential backoff
    /// - HTTP 4xx (not 429) → fail immediately
    /// - Network error → retry
    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("{} not set", self.api_key_env))?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": self.generation_config,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying Gemini request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .query(&[("key", api_key.as_str())])
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        return parse_gemini_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!("Gemini API error {}: {}", status, body_text));
                        continue;
                    }

                    bail!("Gemini API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Gemini request failed after retries")))
    }
}

#[async_trait]
impl Explainer for GeminiExplainer {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn explain(&self, report: &ErrorReport) -> Result<ExplanationResult> {
        let prompt = format_prompt(report);
        let text = self.generate(&prompt).await?;
        tracing::debug!(len = text.len(), "received Gemini response");
        Ok(parse_explanation(&text))
    }
}

/// Concatenate `candidates[0].content.parts[].text`.
fn parse_gemini_response(json: &Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidate parts"))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        bail!("Invalid Gemini response: empty text");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prompt_substitutes_fields() {
        let report = ErrorReport {
            message: "TypeError: x is undefined".into(),
            stack: Some("at run (app.js:1:2)".into()),
            url: Some("https://example.com".into()),
            ..Default::default()
        };
        let prompt = format_prompt(&report);
        assert!(prompt.contains(r#"Error: "TypeError: x is undefined""#));
        assert!(prompt.contains(r#"Context: "at run (app.js:1:2)""#));
        assert!(prompt.contains(r#"URL: "https://example.com""#));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_format_prompt_defaults() {
        let prompt = format_prompt(&ErrorReport::default());
        assert!(prompt.contains(r#"Error: "Unknown error""#));
        assert!(prompt.contains(r#"Context: "No stack trace available""#));
        assert!(prompt.contains(r#"URL: "Unknown URL""#));
    }

    #[test]
    fn test_parse_json_response() {
        let raw = r#"{"explanation":"x is undefined","suggestedFix":"define x","possibleCauses":["typo","load order"]}"#;
        let result = parse_explanation(raw);
        assert_eq!(result.explanation, "x is undefined");
        assert_eq!(result.suggested_fix.as_deref(), Some("define x"));
        assert_eq!(result.possible_causes, vec!["typo", "load order"]);
    }

    #[test]
    fn test_parse_fenced_json_response() {
        let raw = "```json\n{\"explanation\":\"fenced\",\"possibleCauses\":[]}\n```\n";
        let result = parse_explanation(raw);
        assert_eq!(result.explanation, "fenced");
        assert!(result.suggested_fix.is_none());
        assert!(result.possible_causes.is_empty());
    }

    #[test]
    fn test_parse_json_with_missing_fields() {
        let result = parse_explanation(r#"{"suggestedFix":""}"#);
        assert_eq!(result.explanation, MISSING_EXPLANATION);
        assert!(result.suggested_fix.is_none());
        assert!(result.possible_causes.is_empty());
    }

    #[test]
    fn test_parse_plain_text_response() {
        let raw = "This error means the variable was never assigned.";
        let result = parse_explanation(raw);
        assert_eq!(result.explanation, raw);
        assert!(result.suggested_fix.is_none());
        assert!(result.possible_causes.is_empty());
    }

    #[test]
    fn test_parse_gemini_response_concatenates_parts() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"explanation\":" }, { "text": "\"ok\"}" }] }
            }]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), r#"{"explanation":"ok"}"#);
        assert!(parse_gemini_response(&json!({ "candidates": [] })).is_err());
    }

    #[tokio::test]
    async fn test_disabled_returns_fallback() {
        let explainer = create_explainer(&ExplainerConfig {
            provider: "disabled".into(),
            ..Default::default()
        })
        .unwrap();
        let result = explainer
            .explain(&ErrorReport::from_message("boom"))
            .await
            .unwrap();
        assert_eq!(result, ExplanationResult::fallback());
    }

    #[tokio::test]
    async fn test_gemini_without_key_fails_at_call_time() {
        let explainer = GeminiExplainer::new(&ExplainerConfig {
            api_key_env: "WHISPERER_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..Default::default()
        })
        .unwrap();
        let err = explainer
            .explain(&ErrorReport::from_message("boom"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not set"));
    }
}
