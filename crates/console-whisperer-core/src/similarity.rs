//! Heuristic duplicate detection over recently seen errors.
//!
//! Two reports match when their cleaned messages are equal, or when both
//! carry parsed stacks whose first frames point into the same file within
//! [`LINE_PROXIMITY`] lines. Missed duplicates are expected when stacks are
//! absent or line numbers drift; unrelated errors from the same few lines of
//! one file will be reported as similar.

use crate::models::ErrorReport;

/// Maximum line distance between first frames that still counts as a match.
pub const LINE_PROXIMITY: u32 = 5;

/// Whether two reports likely describe the same fault.
pub fn is_similar(candidate: &ErrorReport, known: &ErrorReport) -> bool {
    if candidate.message == known.message {
        return true;
    }

    match (candidate.top_frame(), known.top_frame()) {
        (Some(a), Some(b)) => {
            a.file_name == b.file_name && a.line_number.abs_diff(b.line_number) <= LINE_PROXIMITY
        }
        _ => false,
    }
}

/// Whether `candidate` matches any of the `recent` reports.
pub fn is_similar_to_known<'a, I>(candidate: &ErrorReport, recent: I) -> bool
where
    I: IntoIterator<Item = &'a ErrorReport>,
{
    recent.into_iter().any(|known| is_similar(candidate, known))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StackFrame;

    fn report(message: &str, frame: Option<(&str, u32)>) -> ErrorReport {
        ErrorReport {
            message: message.to_string(),
            parsed_stack: frame.map(|(file, line)| {
                vec![StackFrame {
                    function_name: "anonymous".into(),
                    file_name: file.into(),
                    line_number: line,
                    column_number: 1,
                }]
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_equal_messages_match_regardless_of_stack() {
        let a = report("TypeError: boom", Some(("a.js", 1)));
        let b = report("TypeError: boom", Some(("b.js", 900)));
        let c = report("TypeError: boom", None);
        assert!(is_similar_to_known(&a, [&b]));
        assert!(is_similar_to_known(&a, [&c]));
    }

    #[test]
    fn test_nearby_frames_match() {
        let candidate = report("first", Some(("app.js", 10)));
        let near = report("second", Some(("app.js", 14)));
        let boundary = report("third", Some(("app.js", 15)));
        assert!(is_similar_to_known(&candidate, [&near]));
        assert!(is_similar_to_known(&candidate, [&boundary]));
    }

    #[test]
    fn test_distant_frames_do_not_match() {
        let candidate = report("first", Some(("app.js", 10)));
        let far = report("second", Some(("app.js", 16)));
        let below = report("second", Some(("app.js", 4)));
        assert!(!is_similar_to_known(&candidate, [&far]));
        assert!(!is_similar_to_known(&candidate, [&below]));
    }

    #[test]
    fn test_different_files_do_not_match() {
        let candidate = report("first", Some(("app.js", 10)));
        let other = report("second", Some(("vendor.js", 10)));
        assert!(!is_similar_to_known(&candidate, [&other]));
    }

    #[test]
    fn test_missing_stack_cannot_match_by_frame() {
        let candidate = report("first", None);
        let known = report("second", Some(("app.js", 10)));
        assert!(!is_similar_to_known(&candidate, [&known]));
    }

    #[test]
    fn test_empty_recent_list() {
        let candidate = report("first", Some(("app.js", 10)));
        assert!(!is_similar_to_known(&candidate, std::iter::empty()));
    }

    #[test]
    fn test_any_entry_in_list_matches() {
        let candidate = report("first", Some(("app.js", 10)));
        let recent = vec![
            report("x", None),
            report("y", Some(("other.js", 10))),
            report("z", Some(("app.js", 12))),
        ];
        assert!(is_similar_to_known(&candidate, &recent));
    }
}
