// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Oracle reply extraction.
//
// Completion models wrap structured output in markdown fences, prepend
// chatter, or split one answer over several fenced blocks. These helpers
// pull the payload out before it is deserialized.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ReplyError {
    #[error("no JSON found in oracle reply")]
    NoJson,

    #[error("invalid JSON in oracle reply: {0}")]
    InvalidJson(String),

    #[error("oracle reply is empty")]
    Empty,
}

fn fenced_object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced object pattern")
    })
}

fn fence_marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)```[a-z]*[ \t]*\r?\n?").expect("fence marker pattern")
    })
}

/// Remove every markdown fence marker (with its language tag) from `text`
pub fn strip_code_fences(text: &str) -> String {
    fence_marker_pattern().replace_all(text, "").trim().to_string()
}

/// Extract one JSON object from a reply.
///
/// All fenced blocks holding an object are parsed and merged, later keys
/// winning. Without a usable fenced block, the span from the first `{` to
/// the last `}` is parsed.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, ReplyError> {
    let mut merged = Map::new();
    for capture in fenced_object_pattern().captures_iter(text) {
        match serde_json::from_str::<Value>(&capture[1]) {
            Ok(Value::Object(block)) => merged.extend(block),
            Ok(_) => {}
            Err(e) => tracing::debug!("Skipping unparsable fenced block: {}", e),
        }
    }
    if !merged.is_empty() {
        return Ok(merged);
    }

    let cleaned = strip_code_fences(text);
    let (start, end) = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => (start, end),
        _ => return Err(ReplyError::NoJson),
    };

    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ReplyError::NoJson),
        Err(e) => Err(ReplyError::InvalidJson(e.to_string())),
    }
}

/// Extract a JSON array from a reply: the span from the first `[` to the
/// last `]`, or the whole fence-stripped reply.
pub fn extract_json_array(text: &str) -> Result<Vec<Value>, ReplyError> {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return Err(ReplyError::Empty);
    }

    let candidate = match (cleaned.find('['), cleaned.rfind(']')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned.as_str(),
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(ReplyError::NoJson),
        Err(e) => Err(ReplyError::InvalidJson(e.to_string())),
    }
}

/// Policy document from a drafting or repair reply, fences removed
pub fn extract_policy_document(text: &str) -> Result<String, ReplyError> {
    let document = strip_code_fences(text);
    if document.is_empty() {
        Err(ReplyError::Empty)
    } else {
        Ok(document)
    }
}

/// Rewritten request from a rewrite reply: trimmed, first line only,
/// surrounding quotes removed.
pub fn clean_rewrite(text: &str) -> Result<String, ReplyError> {
    let first_line = text.trim().lines().next().unwrap_or_default();
    let cleaned = first_line
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string();
    if cleaned.is_empty() {
        Err(ReplyError::Empty)
    } else {
        Ok(cleaned)
    }
}
