//! Pulling a JSON object out of free-form model output
//!
//! Generative models wrap their JSON in chat transcripts, escape quotes they
//! should not, leave trailing commas and forget closing braces. [`extract`]
//! finds the candidate object and [`repair`] applies a fixed sequence of
//! textual fixes. The order matters: key quoting assumes escaped quotes are
//! already gone, and the brace count runs last.

use crate::error::{AnalysisError, Result};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static OBJECT_AFTER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:assistant|answer)[\s\S]*?(\{[\s\S]*\})").expect("marker pattern is valid")
});

static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([a-zA-Z_]+)(\s*:)").expect("bare key pattern is valid")
});

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*(\}|\])").expect("trailing comma pattern is valid"));

/// Find the outermost `{...}` following the first "assistant" or "answer" marker
pub fn extract(response: &str) -> Result<&str> {
    OBJECT_AFTER_MARKER
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(AnalysisError::JsonNotFound)
}

/// Best-effort normalization of a JSON-like candidate
pub fn repair(candidate: &str) -> String {
    let cleaned = candidate.replace("\\\"", "\"");
    let cleaned = cleaned.replace('\n', " ");
    let cleaned = BARE_KEY
        .replace_all(&cleaned, |caps: &Captures| {
            format!("{}\"{}\"{}", &caps[1], &caps[2], &caps[3])
        })
        .into_owned();
    let cleaned = TRAILING_COMMA.replace_all(&cleaned, "$1").into_owned();
    let mut cleaned = cleaned.replace('\'', "\"");

    if serde_json::from_str::<serde_json::Value>(&cleaned).is_err() {
        let opened = cleaned.matches('{').count();
        let closed = cleaned.matches('}').count();
        if opened > closed {
            cleaned.push_str(&"}".repeat(opened - closed));
        }
    }
    cleaned
}

/// Extract and repair in one step
pub fn process_response(response: &str) -> Result<String> {
    extract(response).map(repair)
}
