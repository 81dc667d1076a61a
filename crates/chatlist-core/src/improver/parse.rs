//! Extraction of an [`ImprovementResult`] from free-form model output
//!
//! Strategies run in order and the first one that yields an improved prompt
//! wins: a JSON object, labeled sections (Russian or English headers), a
//! numbered list, and finally plain paragraphs.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ImproveError;
use crate::types::ImprovementResult;

const MIN_IMPROVED_CHARS: usize = 5;
const MIN_ALTERNATIVES: usize = 2;
const MAX_ALTERNATIVES: usize = 3;
/// Shortest unlabeled line that may stand for the improved prompt
const MIN_LOOSE_LINE_CHARS: usize = 20;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?\s*").unwrap());

static IMPROVED_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:#+\s*)?(?:\*\*)?(?:улучшенн\w*\s+(?:верси\w*|промп?т\w*)|improved(?:\s+(?:version|prompt))?)(?:\*\*)?\s*(?:[:\-]\s*(?:\*\*)?\s*(.*))?$",
    )
    .unwrap()
});

static ALTERNATIVE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:#+\s*)?(?:\*\*)?(?:альтернатив\w*|вариант\w*|alternatives?|variants?)(?:\s*(?:#\s*)?\d+)?(?:\*\*)?\s*(?:[:.)\-]\s*(?:\*\*)?\s*(.*))?$",
    )
    .unwrap()
});

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+[.)\-]|[-*•])\s+(.+)$").unwrap());

static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)\-]\s+(.+)$").unwrap());

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());

static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

#[derive(Debug, Default)]
struct Extracted {
    improved: Option<String>,
    alternatives: Vec<String>,
    /// The model followed the requested JSON shape
    structured: bool,
}

/// Parse a model answer into an improved prompt plus 2-3 alternatives
pub fn parse_response(text: &str) -> Result<ImprovementResult, ImproveError> {
    let text = text.replace("\r\n", "\n");
    let text = text.trim();

    let extracted = from_json(text)
        .or_else(|| from_labeled_sections(text))
        .or_else(|| from_numbered_list(text))
        .unwrap_or_else(|| from_paragraphs(text));

    finish(extracted)
}

/// Trim, collapse runs of spaces, trim each line, then cap blank runs at one empty line
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let collapsed = SPACE_RUNS.replace_all(text.trim(), " ");
    let lines: Vec<&str> = collapsed.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    BLANK_RUNS.replace_all(&joined, "\n\n").trim().to_string()
}

fn from_json(text: &str) -> Option<Extracted> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = CODE_FENCE.replace_all(&text[start..=end], "");

    let value: Value = match serde_json::from_str(candidate.trim()) {
        Ok(value) => value,
        Err(e) => {
            warn!("Could not parse JSON in improvement response: {}", e);
            return None;
        }
    };
    let object = value.as_object()?;
    let improved = object.get("improved")?;
    let alternatives = match object.get("alternatives")? {
        Value::Array(items) => items
            .iter()
            .filter(|item| is_truthy(item))
            .map(value_text)
            .collect(),
        Value::String(s) => s.lines().map(str::to_string).collect(),
        other => {
            debug!("Ignoring JSON with non-list alternatives: {}", other);
            return None;
        }
    };

    Some(Extracted {
        improved: Some(value_text(improved)),
        alternatives,
        structured: true,
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Improved,
    Alternative,
}

type Block = (Section, Vec<String>);

fn from_labeled_sections(text: &str) -> Option<Extracted> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut current: Option<Block> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if let Some(caps) = IMPROVED_HEADER.captures(line) {
            flush(&mut current, &mut blocks);
            current = Some((Section::Improved, inline_text(&caps)));
        } else if let Some(caps) = ALTERNATIVE_HEADER.captures(line) {
            flush(&mut current, &mut blocks);
            current = Some((Section::Alternative, inline_text(&caps)));
        } else if line.is_empty() {
            if current.as_ref().is_some_and(|(_, lines)| !lines.is_empty()) {
                flush(&mut current, &mut blocks);
            }
        } else {
            let in_alternatives = matches!(current, Some((Section::Alternative, _)));
            match LIST_ITEM.captures(line) {
                // A list under an alternatives header holds one alternative per item
                Some(item) if in_alternatives => {
                    let item = item[1].trim().to_string();
                    flush(&mut current, &mut blocks);
                    current = Some((Section::Alternative, vec![item]));
                }
                _ => {
                    if let Some((_, lines)) = current.as_mut() {
                        lines.push(line.to_string());
                    }
                }
            }
        }
    }
    flush(&mut current, &mut blocks);

    let improved = blocks
        .iter()
        .find(|(section, _)| *section == Section::Improved)
        .map(|(_, lines)| lines.join("\n"))?;
    let alternatives = blocks
        .iter()
        .filter(|(section, _)| *section == Section::Alternative)
        .map(|(_, lines)| lines.join("\n"))
        .take(MAX_ALTERNATIVES)
        .collect();

    Some(Extracted {
        improved: Some(improved),
        alternatives,
        structured: false,
    })
}

fn inline_text(caps: &regex::Captures<'_>) -> Vec<String> {
    caps.get(1)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(|s| vec![s.to_string()])
        .unwrap_or_default()
}

fn flush(current: &mut Option<Block>, blocks: &mut Vec<Block>) {
    if let Some(block) = current.take() {
        if !block.1.is_empty() {
            blocks.push(block);
        }
    }
}

fn from_numbered_list(text: &str) -> Option<Extracted> {
    let mut improved: Option<String> = None;
    let mut items = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if let Some(caps) = NUMBERED_ITEM.captures(line) {
            items.push(caps[1].trim().to_string());
        } else if improved.is_none()
            && !line.starts_with('#')
            && !line.starts_with('*')
            && !line.ends_with(':')
            && line.chars().count() > MIN_LOOSE_LINE_CHARS
        {
            improved = Some(line.to_string());
        }
    }

    if improved.is_none() && items.is_empty() {
        return None;
    }
    let mut items = items.into_iter();
    let improved = improved.or_else(|| items.next());
    Some(Extracted {
        improved,
        alternatives: items.take(MAX_ALTERNATIVES).collect(),
        structured: false,
    })
}

fn from_paragraphs(text: &str) -> Extracted {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    match paragraphs.split_first() {
        Some((first, rest)) => Extracted {
            improved: Some(first.to_string()),
            alternatives: rest
                .iter()
                .take(MAX_ALTERNATIVES)
                .map(|p| p.to_string())
                .collect(),
            structured: false,
        },
        None => Extracted {
            improved: Some(text.to_string()),
            ..Extracted::default()
        },
    }
}

fn finish(extracted: Extracted) -> Result<ImprovementResult, ImproveError> {
    let improved = extracted
        .improved
        .as_deref()
        .map(normalize_whitespace)
        .unwrap_or_default();

    // A JSON answer states its improved text explicitly; heuristics need a floor
    let min_chars = if extracted.structured { 1 } else { MIN_IMPROVED_CHARS };
    if improved.chars().count() < min_chars {
        return Err(ImproveError::ParseFailure(
            "no improved prompt found in the response; try another model or rephrase the request"
                .to_string(),
        ));
    }

    let mut alternatives: Vec<String> = extracted
        .alternatives
        .iter()
        .map(|a| normalize_whitespace(a))
        .filter(|a| !a.is_empty())
        .collect();
    pad_alternatives(&mut alternatives, &improved);
    alternatives.truncate(MAX_ALTERNATIVES);

    Ok(ImprovementResult {
        improved_text: improved,
        alternatives,
    })
}

/// Ensure at least two alternatives by repeating the improved text
fn pad_alternatives(alternatives: &mut Vec<String>, improved: &str) {
    if alternatives.len() >= MIN_ALTERNATIVES {
        return;
    }
    if alternatives.first().is_none_or(|first| first != improved) {
        alternatives.insert(0, improved.to_string());
    }
    while alternatives.len() < MIN_ALTERNATIVES {
        alternatives.push(improved.to_string());
    }
}
