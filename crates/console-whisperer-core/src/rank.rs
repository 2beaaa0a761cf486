//! Link relevance scoring and ranking.
//!
//! # Scoring Algorithm
//!
//! For every candidate link:
//!
//! 1. `title = overlap(title, message) × 2`, where `overlap` is the share of
//!    distinct lowercase words in common, scaled to `[0, 10]`.
//! 2. `votes = min(votes / 10, 5)`.
//! 3. `recency = max(0, 5 − min(age_days / 30, 5))`, decaying to zero over
//!    150 days.
//! 4. `relevance = title + votes + recency` (at most 30).
//!
//! Links are then sorted by relevance (descending, stable, so ties keep
//! source order) and truncated; the ranking inputs are dropped from the
//! output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

use crate::enrich::clean_message;
use crate::models::{Link, RankedLink};

/// Default number of links returned by [`rank_links`].
pub const MAX_LINKS: usize = 5;

const MS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

static STACK_FRAGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"at\s+.*?:\d+:\d+").expect("valid stack fragment regex"));

/// Per-link scoring breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub title_score: f64,
    pub vote_score: f64,
    pub recency_score: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.title_score + self.vote_score + self.recency_score
    }
}

/// Turn an error message into a plain search query.
///
/// Drops `at file:line:col` fragments and a leading `"Uncaught "` /
/// `"Exception: "`, then trims.
pub fn build_query(message: &str) -> String {
    let without_frames = STACK_FRAGMENT.replace_all(message, "");
    clean_message(&without_frames)
}

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Word-overlap score in `[0, 10]`.
///
/// `matching / max(|words(a)|, |words(b)|) × 10`, case-insensitive, split on
/// runs of non-word characters.
pub fn word_overlap_score(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let words_a = words(a);
    let words_b = words(b);
    let total = words_a.len().max(words_b.len());
    if total == 0 {
        return 0.0;
    }
    let matching = words_a.intersection(&words_b).count();
    matching as f64 / total as f64 * 10.0
}

/// Score one link against the error message at time `now_ms`.
pub fn score_link(link: &Link, message: &str, now_ms: i64) -> ScoreBreakdown {
    let title_score = word_overlap_score(&link.title, message) * 2.0;
    let vote_score = (link.votes as f64 / 10.0).min(5.0);
    // Future timestamps count as brand new.
    let age_days = (now_ms.saturating_sub(link.timestamp) as f64 / MS_PER_DAY).max(0.0);
    let recency_score = (5.0 - (age_days / 30.0).min(5.0)).max(0.0);

    ScoreBreakdown {
        title_score,
        vote_score,
        recency_score,
    }
}

/// Rank candidate links for an error message and keep the top `limit`.
pub fn rank_links(links: Vec<Link>, message: &str, now_ms: i64, limit: usize) -> Vec<RankedLink> {
    let mut scored: Vec<(f64, Link)> = links
        .into_iter()
        .map(|link| (score_link(&link, message, now_ms).total(), link))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);

    scored.into_iter().map(|(_, link)| link.into()).collect()
}
