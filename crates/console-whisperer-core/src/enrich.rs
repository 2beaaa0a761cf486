//! Error report enrichment: message cleaning, stack parsing, and
//! classification.
//!
//! The extension normally enriches reports before sending them, but the
//! backend applies the same steps so that fingerprints and similarity
//! checks see identical input regardless of the sender.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{
    Classification, ErrorCategory, ErrorKind, ErrorReport, Severity, StackFrame,
};

static LEADING_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Uncaught |Exception: )").expect("valid prefix regex"));

static STACK_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"at\s+(?:(.+?)\s+\()?(?:(.+?):(\d+):(\d+))\)?").expect("valid stack regex")
});

/// Known message patterns, checked in order; first match wins.
static MESSAGE_PATTERNS: Lazy<Vec<(Regex, ErrorCategory, Severity)>> = Lazy::new(|| {
    [
        (
            r"(?i)Cannot read propert(?:y|ies) of (undefined|null)",
            ErrorCategory::Runtime,
            Severity::Medium,
        ),
        (r"(?i)is not a function", ErrorCategory::Runtime, Severity::Medium),
        (r"(?i)Unexpected token", ErrorCategory::Syntax, Severity::High),
        (r"(?i)Uncaught SyntaxError", ErrorCategory::Syntax, Severity::High),
        (r"(?i)Failed to fetch", ErrorCategory::Network, Severity::Medium),
        (r"(?i)NetworkError", ErrorCategory::Network, Severity::Medium),
        (r"(?i)is not defined", ErrorCategory::Runtime, Severity::Medium),
    ]
    .into_iter()
    .map(|(pattern, category, severity)| {
        (
            Regex::new(pattern).expect("valid classification regex"),
            category,
            severity,
        )
    })
    .collect()
});

/// Strip a leading `"Uncaught "` / `"Exception: "` and trim whitespace.
pub fn clean_message(message: &str) -> String {
    LEADING_PREFIX.replace(message, "").trim().to_string()
}

/// Extract frames from a raw JavaScript stack trace.
///
/// Returns `None` when no line looks like a frame.
pub fn parse_stack(stack: &str) -> Option<Vec<StackFrame>> {
    let frames: Vec<StackFrame> = stack
        .lines()
        .filter_map(|line| {
            let caps = STACK_LINE.captures(line.trim())?;
            Some(StackFrame {
                function_name: caps
                    .get(1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| "anonymous".to_string()),
                file_name: caps.get(2)?.as_str().to_string(),
                line_number: caps.get(3)?.as_str().parse().ok()?,
                column_number: caps.get(4)?.as_str().parse().ok()?,
            })
        })
        .collect();

    if frames.is_empty() {
        None
    } else {
        Some(frames)
    }
}

/// Assign a category and severity to an error message.
pub fn classify(kind: ErrorKind, message: &str) -> Classification {
    for (pattern, category, severity) in MESSAGE_PATTERNS.iter() {
        if pattern.is_match(message) {
            return Classification {
                category: *category,
                severity: *severity,
            };
        }
    }

    if let Some(category) = category_from_error_name(&clean_message(message)) {
        return Classification {
            category,
            severity: Severity::Medium,
        };
    }

    if kind == ErrorKind::UnhandledRejection {
        return Classification {
            category: ErrorCategory::Promise,
            severity: Severity::Medium,
        };
    }

    Classification {
        category: ErrorCategory::Unknown,
        severity: Severity::Low,
    }
}

fn category_from_error_name(message: &str) -> Option<ErrorCategory> {
    let name = message
        .split(|c: char| c == ':' || c.is_whitespace())
        .next()?;
    match name {
        "SyntaxError" => Some(ErrorCategory::Syntax),
        "TypeError" | "ReferenceError" | "RangeError" | "URIError" | "EvalError"
        | "InternalError" => Some(ErrorCategory::Runtime),
        _ => None,
    }
}

impl ErrorReport {
    /// Normalize the report in place.
    ///
    /// Falls back to `reason` when `message` is empty, cleans the message,
    /// and parses `stack` into frames unless frames were already supplied.
    pub fn enrich(&mut self) {
        if self.message.trim().is_empty() {
            if let Some(reason) = &self.reason {
                self.message = reason.clone();
            }
        }
        self.message = clean_message(&self.message);

        if self.parsed_stack.is_none() {
            if let Some(stack) = &self.stack {
                self.parsed_stack = parse_stack(stack);
            }
        }
    }

    /// Builder-style variant of [`enrich`](ErrorReport::enrich).
    pub fn enriched(mut self) -> Self {
        self.enrich();
        self
    }

    pub fn classification(&self) -> Classification {
        classify(self.kind, &self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_message_strips_prefixes() {
        assert_eq!(clean_message("Uncaught TypeError: boom "), "TypeError: boom");
        assert_eq!(clean_message("Exception: bad"), "bad");
        assert_eq!(clean_message("  plain  "), "plain");
    }

    #[test]
    fn test_clean_message_strips_only_one_prefix() {
        assert_eq!(
            clean_message("Uncaught Exception: nested"),
            "Exception: nested"
        );
    }

    #[test]
    fn test_parse_stack_named_and_anonymous_frames() {
        let stack = "TypeError: x is undefined\n    at render (https://example.com/app.js:10:15)\n    at https://example.com/vendor.js:200:3";
        let frames = parse_stack(stack).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].function_name, "render");
        assert_eq!(frames[0].file_name, "https://example.com/app.js");
        assert_eq!(frames[0].line_number, 10);
        assert_eq!(frames[0].column_number, 15);
        assert_eq!(frames[1].function_name, "anonymous");
        assert_eq!(frames[1].file_name, "https://example.com/vendor.js");
        assert_eq!(frames[1].line_number, 200);
    }

    #[test]
    fn test_parse_stack_without_frames() {
        assert!(parse_stack("just a message").is_none());
        assert!(parse_stack("").is_none());
    }

    #[test]
    fn test_classify_known_patterns() {
        let c = classify(
            ErrorKind::WindowOnError,
            "Cannot read properties of undefined (reading 'foo')",
        );
        assert_eq!(c.category, ErrorCategory::Runtime);
        assert_eq!(c.severity, Severity::Medium);

        let c = classify(ErrorKind::ConsoleError, "Unexpected token '<'");
        assert_eq!(c.category, ErrorCategory::Syntax);
        assert_eq!(c.severity, Severity::High);

        let c = classify(ErrorKind::Other, "TypeError: Failed to fetch");
        assert_eq!(c.category, ErrorCategory::Network);
    }

    #[test]
    fn test_classify_by_error_name() {
        let c = classify(ErrorKind::Other, "RangeError: Maximum call stack size exceeded");
        assert_eq!(c.category, ErrorCategory::Runtime);
        let c = classify(ErrorKind::Other, "Uncaught SyntaxError: missing )");
        assert_eq!(c.category, ErrorCategory::Syntax);
        assert_eq!(c.severity, Severity::High);
    }

    #[test]
    fn test_classify_rejection_and_unknown() {
        let c = classify(ErrorKind::UnhandledRejection, "timeout while loading");
        assert_eq!(c.category, ErrorCategory::Promise);
        let c = classify(ErrorKind::ConsoleError, "something odd happened");
        assert_eq!(c.category, ErrorCategory::Unknown);
        assert_eq!(c.severity, Severity::Low);
    }

    #[test]
    fn test_enrich_uses_reason_and_parses_stack() {
        let mut report = ErrorReport {
            kind: ErrorKind::UnhandledRejection,
            reason: Some("Uncaught Error: rejected".into()),
            stack: Some("Error: rejected\n    at load (app.js:3:9)".into()),
            ..Default::default()
        };
        report.enrich();
        assert_eq!(report.message, "Error: rejected");
        let top = report.top_frame().unwrap();
        assert_eq!(top.file_name, "app.js");
        assert_eq!(top.line_number, 3);
    }

    #[test]
    fn test_enrich_keeps_supplied_frames() {
        let frame = StackFrame {
            function_name: "f".into(),
            file_name: "given.js".into(),
            line_number: 1,
            column_number: 1,
        };
        let report = ErrorReport {
            message: "x".into(),
            stack: Some("at g (other.js:9:9)".into()),
            parsed_stack: Some(vec![frame.clone()]),
            ..Default::default()
        }
        .enriched();
        assert_eq!(report.parsed_stack, Some(vec![frame]));
    }
}
