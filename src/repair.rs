//! Tolerant JSON parsing for model completions.
//!
//! Small local models are told to answer with a bare JSON object but often
//! wrap it in a Markdown fence, emit numbers like `-00.2`, or get cut off by
//! the token limit. [`parse_model_output`] tries three independent parses,
//! each on a progressively more repaired copy of the text:
//!
//! 1. strict decode of the fence-stripped text
//! 2. decode after collapsing a spurious leading `00` in numeric literals
//! 3. decode after closing a dangling string and the outer object
//!
//! The structural repair counts raw `"` characters and does not know about
//! escaped quotes, so it can misfire on text containing `\"`. Callers get a
//! [`RepairError`] in that case, never a partially repaired value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use thiserror::Error;

/// `: 005`, `: -00.2` and friends: a colon, optional minus, then a literal
/// `00` directly in front of a digit or decimal point.
static LEADING_DOUBLE_ZERO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":(\s*-?)00([.\d])").unwrap());

const FENCE: &str = "```";

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("no JSON object found in model output")]
    NoJsonFound,

    #[error(
        "could not parse model output as JSON (strict: {strict}; numeric fix-up: {numeric}; structural repair: {structural})"
    )]
    JsonRepairFailed {
        strict: serde_json::Error,
        numeric: serde_json::Error,
        structural: serde_json::Error,
    },
}

/// Drop a surrounding Markdown code fence, tagged (```` ```json ````) or not.
///
/// Only the first line is removed when the text opens with a fence and only
/// the last line when it closes with one; the inner text is returned trimmed.
pub fn strip_fences(text: &str) -> &str {
    let mut text = text.trim();

    if text.starts_with(FENCE) {
        text = text.split_once('\n').map_or("", |(_, rest)| rest);
    }
    if text.ends_with(FENCE) {
        text = text.rsplit_once('\n').map_or("", |(head, _)| head);
    }

    text.trim()
}

/// Rewrite `: 00<digit>` / `: -00.<digit>` to a single leading zero.
///
/// Any other numeric literal is left untouched.
pub fn fix_numeric_literals(text: &str) -> Cow<'_, str> {
    LEADING_DOUBLE_ZERO.replace_all(text, ":${1}0${2}")
}

/// Close a dangling string and the outer object.
///
/// Appends one `"` when the quote count is odd and `\n}` when the text does
/// not already end with `}`.
pub fn repair_structure(text: &str) -> String {
    let mut repaired = text.to_string();

    if repaired.matches('"').count() % 2 == 1 {
        repaired.push('"');
    }
    if !repaired.ends_with('}') {
        repaired.push_str("\n}");
    }

    repaired
}

/// Parse a raw model completion into JSON, escalating through the repairs.
///
/// # Errors
///
/// - [`RepairError::NoJsonFound`] when neither of the first two parses
///   succeeds and the text has no `{` at all
/// - [`RepairError::JsonRepairFailed`] when all three parses fail; it carries
///   every underlying decode error
pub fn parse_model_output(raw: &str) -> Result<Value, RepairError> {
    let clean = strip_fences(raw);

    let strict = match serde_json::from_str::<Value>(clean) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let fixed = fix_numeric_literals(clean);
    let numeric = match serde_json::from_str::<Value>(&fixed) {
        Ok(value) => {
            tracing::debug!("model output parsed after numeric fix-up");
            return Ok(value);
        }
        Err(e) => e,
    };

    if !fixed.contains('{') {
        return Err(RepairError::NoJsonFound);
    }

    let repaired = repair_structure(&fixed);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            tracing::debug!("model output parsed after structural repair");
            Ok(value)
        }
        Err(structural) => Err(RepairError::JsonRepairFailed {
            strict,
            numeric,
            structural,
        }),
    }
}
