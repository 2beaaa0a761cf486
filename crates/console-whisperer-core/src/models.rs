//! Core data models used throughout Console Whisperer.
//!
//! These types represent the error reports, explanations, links, and cached
//! responses that flow between the browser extension, the pipeline, and the
//! cache. Field names serialize in camelCase to match the extension's JSON.

use serde::{Deserialize, Serialize};

/// How the error was captured in the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Global `window.onerror` handler.
    #[serde(rename = "window.onerror")]
    WindowOnError,
    /// A call to `console.error`.
    #[serde(rename = "console.error")]
    ConsoleError,
    /// An `unhandledrejection` event.
    #[serde(rename = "unhandledrejection")]
    UnhandledRejection,
    #[default]
    #[serde(rename = "other", other)]
    Other,
}

/// A single parsed stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub function_name: String,
    pub file_name: String,
    pub line_number: u32,
    pub column_number: u32,
}

/// One observed runtime error, as sent by the extension.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    #[serde(rename = "type", default)]
    pub kind: ErrorKind,
    #[serde(default)]
    pub message: String,
    /// Rejection reason; stands in for `message` on unhandled rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Derived from `stack`; never authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_stack: Option<Vec<StackFrame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Capture time, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Script URL reported by `window.onerror`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ErrorReport {
    /// Convenience constructor for a report carrying only a message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// First parsed stack frame, if any.
    pub fn top_frame(&self) -> Option<&StackFrame> {
        self.parsed_stack.as_ref().and_then(|frames| frames.first())
    }
}

/// Output of the explanation step. Always fully populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationResult {
    pub explanation: String,
    pub suggested_fix: Option<String>,
    #[serde(default)]
    pub possible_causes: Vec<String>,
}

/// Apology returned when no explanation could be produced.
pub const FALLBACK_EXPLANATION: &str =
    "We couldn't generate an explanation for this error. Please try again later.";

impl ExplanationResult {
    /// The fixed result used whenever the explanation provider fails.
    pub fn fallback() -> Self {
        Self {
            explanation: FALLBACK_EXPLANATION.to_string(),
            suggested_fix: None,
            possible_causes: Vec::new(),
        }
    }
}

/// Where a help link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    StackOverflow,
    GitHub,
    /// Submitted manually through the link endpoint.
    User,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSource::StackOverflow => "stackoverflow",
            LinkSource::GitHub => "github",
            LinkSource::User => "user",
        }
    }
}

/// A candidate help resource, before ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub title: String,
    pub source: LinkSource,
    pub votes: u64,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
}

/// The caller-visible shape of a link: ranking inputs are stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedLink {
    pub url: String,
    pub title: String,
    pub source: LinkSource,
}

impl From<Link> for RankedLink {
    fn from(link: Link) -> Self {
        Self {
            url: link.url,
            title: link.title,
            source: link.source,
        }
    }
}

/// Broad category of a JavaScript error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Runtime,
    Network,
    Promise,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub severity: Severity,
}

/// Combined explanation + links payload for one error.
///
/// This is both the HTTP response for a submitted error and the record the
/// cache stores. `id` is `0` until the cache assigns one on insertion; ids
/// start at `1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResponse {
    pub original_error: ErrorReport,
    pub explanation: String,
    pub suggested_fix: Option<String>,
    pub possible_causes: Vec<String>,
    pub links: Vec<RankedLink>,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub id: u64,
    pub classification: Classification,
    #[serde(default)]
    pub similar_to_known: bool,
}

impl CombinedResponse {
    pub fn summary(&self) -> RecentErrorSummary {
        RecentErrorSummary {
            id: self.id,
            message: self.original_error.message.clone(),
            url: self.original_error.url.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Lightweight entry of the recent-errors index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentErrorSummary {
    pub id: u64,
    pub message: String,
    pub url: Option<String>,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_report_deserializes_extension_payload() {
        let json = serde_json::json!({
            "type": "window.onerror",
            "message": "Uncaught TypeError: x is undefined",
            "source": "https://example.com/app.js",
            "lineno": 10,
            "colno": 4,
            "stack": "TypeError: x is undefined\n    at run (https://example.com/app.js:10:4)",
            "timestamp": 1_700_000_000_000i64,
            "url": "https://example.com/",
            "userAgent": "Mozilla/5.0"
        });
        let report: ErrorReport = serde_json::from_value(json).unwrap();
        assert_eq!(report.kind, ErrorKind::WindowOnError);
        assert_eq!(report.lineno, Some(10));
        assert_eq!(report.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert!(report.parsed_stack.is_none());
    }

    #[test]
    fn test_unknown_kind_maps_to_other() {
        let report: ErrorReport =
            serde_json::from_value(serde_json::json!({ "type": "resource", "message": "x" }))
                .unwrap();
        assert_eq!(report.kind, ErrorKind::Other);
    }

    #[test]
    fn test_ranked_link_omits_ranking_fields() {
        let link = Link {
            url: "https://stackoverflow.com/q/1".into(),
            title: "TypeError".into(),
            source: LinkSource::StackOverflow,
            votes: 12,
            timestamp: 0,
        };
        let value = serde_json::to_value(RankedLink::from(link)).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["source"], "stackoverflow");
        assert!(!obj.contains_key("votes"));
    }

    #[test]
    fn test_classification_wire_values() {
        let value = serde_json::to_value(Classification {
            category: ErrorCategory::Promise,
            severity: Severity::High,
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({ "category": "promise", "severity": "high" }));

        assert!(serde_json::from_str::<ErrorCategory>("\"dom\"").is_err());
        assert!(serde_json::from_str::<Severity>("\"critical\"").is_err());
        assert!(Severity::Low < Severity::Medium && Severity::Medium < Severity::High);
    }

    #[test]
    fn test_fallback_is_fully_populated() {
        let fallback = ExplanationResult::fallback();
        assert_eq!(fallback.explanation, FALLBACK_EXPLANATION);
        assert!(fallback.suggested_fix.is_none());
        assert!(fallback.possible_causes.is_empty());
        let value = serde_json::to_value(&fallback).unwrap();
        assert!(value["suggestedFix"].is_null());
    }
}
