use serde_json::Value;
use std::collections::BTreeSet;

use super::markers::{Field, segments};
use super::types::{ExtractionConfidence, ExtractionContext, ExtractionResult};
use crate::stream::repair::repair_escapes;

pub const DEFAULT_ERROR_TYPE: &str = "未分类错误";
pub const DEFAULT_CATEGORY: &str = "未分类";
pub const DEFAULT_DIFFICULTY: u8 = 3;
pub const DEFAULT_SOLUTION_MAX_CHARS: usize = 2000;

const TAG_SEPARATORS: [char; 7] = [',', '，', '、', ';', '；', '\n', '|'];

/// Partially filled fields before defaults are applied.
#[derive(Debug, Default)]
struct Draft {
    category: Option<String>,
    subcategory: Option<String>,
    error_type: Option<String>,
    source_text: Option<String>,
    solution: Option<String>,
    difficulty: Option<u8>,
    tags: Option<BTreeSet<String>>,
}

impl Draft {
    fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.subcategory.is_none()
            && self.error_type.is_none()
            && self.source_text.is_none()
            && self.solution.is_none()
            && self.difficulty.is_none()
            && self.tags.is_none()
    }

    /// Fill fields still missing here from `other`.
    fn or(self, other: Self) -> Self {
        Self {
            category: self.category.or(other.category),
            subcategory: self.subcategory.or(other.subcategory),
            error_type: self.error_type.or(other.error_type),
            source_text: self.source_text.or(other.source_text),
            solution: self.solution.or(other.solution),
            difficulty: self.difficulty.or(other.difficulty),
            tags: self.tags.or(other.tags),
        }
    }
}

/// Best-effort field extraction from a model answer.
///
/// Tries a fenced ```json block first, then section markers; anything still
/// missing gets a default. Never fails, and always keeps the full answer in
/// `raw_answer_text`.
#[derive(Debug, Clone)]
pub struct ResultExtractor {
    solution_max_chars: usize,
}

impl Default for ResultExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_SOLUTION_MAX_CHARS)
    }
}

impl ResultExtractor {
    pub fn new(solution_max_chars: usize) -> Self {
        Self {
            solution_max_chars: solution_max_chars.max(1),
        }
    }

    pub fn extract(&self, full_text: &str, context: &ExtractionContext) -> ExtractionResult {
        let structured = self.from_json_block(full_text);
        let from_markers = self.from_markers(full_text);

        let confidence = match (&structured, from_markers.is_empty()) {
            (Some(_), _) => ExtractionConfidence::StructuredJson,
            (None, false) => ExtractionConfidence::MarkerMatch,
            (None, true) => ExtractionConfidence::Default,
        };
        let draft = structured.unwrap_or_default().or(from_markers);

        if confidence == ExtractionConfidence::Default {
            tracing::warn!(
                error_kind = "EXTRACTION_EMPTY",
                answer_len = full_text.len(),
                "No section markers found, using defaults"
            );
        }

        ExtractionResult {
            category: draft
                .category
                .or_else(|| non_empty(context.category.as_deref()))
                .or_else(|| non_empty(context.subject.as_deref()))
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            subcategory: draft.subcategory.unwrap_or_default(),
            error_type: draft
                .error_type
                .unwrap_or_else(|| DEFAULT_ERROR_TYPE.to_string()),
            source_text: draft.source_text.unwrap_or_default(),
            solution: draft.solution.unwrap_or_default(),
            difficulty: draft.difficulty.unwrap_or(DEFAULT_DIFFICULTY),
            tags: draft.tags.unwrap_or_default(),
            raw_answer_text: full_text.to_string(),
            extraction_confidence: confidence,
        }
    }

    fn from_markers(&self, text: &str) -> Draft {
        let mut draft = Draft::default();
        // First occurrence of each field wins; later ones only bound segments.
        for (field, segment) in segments(text) {
            match field {
                Field::Category => set_once(&mut draft.category, first_line(segment)),
                Field::Subcategory => set_once(&mut draft.subcategory, first_line(segment)),
                Field::ErrorType => set_once(&mut draft.error_type, first_line(segment)),
                Field::SourceText => set_once(&mut draft.source_text, block(segment)),
                Field::Solution => set_once(
                    &mut draft.solution,
                    block(segment).map(|s| cap_chars(&s, self.solution_max_chars)),
                ),
                Field::Difficulty => set_once(
                    &mut draft.difficulty,
                    first_line(segment).and_then(|line| parse_difficulty(&line)),
                ),
                Field::Tags => set_once(&mut draft.tags, parse_tags(segment)),
                Field::Analysis => {}
            }
        }
        draft
    }

    fn from_json_block(&self, text: &str) -> Option<Draft> {
        let body = fenced_json(text)?;
        let value: Value = serde_json::from_str(body)
            .or_else(|_| serde_json::from_str(&repair_escapes(body)))
            .ok()?;
        let object = value.as_object()?;

        let string = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| object.get(*key))
                .and_then(|v| match v {
                    Value::String(s) => non_empty(Some(s.as_str())),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
        };

        let tags = ["tags", "knowledge_tags", "knowledge_points"]
            .iter()
            .find_map(|key| object.get(*key))
            .and_then(|v| match v {
                Value::Array(items) => {
                    let set: BTreeSet<String> = items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(clean_tag)
                        .filter(|t| !t.is_empty())
                        .collect();
                    (!set.is_empty()).then_some(set)
                }
                Value::String(s) => parse_tags(s),
                _ => None,
            });

        let draft = Draft {
            category: string(&["category", "subject"]),
            subcategory: string(&["subcategory"]),
            error_type: string(&["error_type"]),
            source_text: string(&["source_text", "question"]),
            solution: string(&["solution", "correct_solution"])
                .map(|s| cap_chars(&s, self.solution_max_chars)),
            difficulty: string(&["difficulty"]).and_then(|d| parse_difficulty(&d)),
            tags,
        };
        (!draft.is_empty()).then_some(draft)
    }
}

fn set_once<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn strip_decoration(line: &str) -> &str {
    line.trim()
        .trim_matches(|c: char| c == '*' || c == '`' || c.is_whitespace())
}

fn first_line(segment: &str) -> Option<String> {
    segment
        .lines()
        .map(strip_decoration)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Whole segment, minus markdown left over from this and the next marker.
fn block(segment: &str) -> Option<String> {
    non_empty(Some(
        segment.trim_matches(|c: char| matches!(c, '*' | '#' | '【') || c.is_whitespace()),
    ))
}

fn cap_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Body of the first ```json fenced block, if any.
fn fenced_json(text: &str) -> Option<&str> {
    let open = text.find("```json")?;
    let body_start = open + "```json".len();
    let close = text[body_start..].find("```")?;
    Some(text[body_start..body_start + close].trim())
}

fn clean_tag(raw: &str) -> String {
    raw.trim()
        .trim_start_matches(['-', '*', '•', '#'])
        .trim()
        .to_string()
}

fn parse_tags(segment: &str) -> Option<BTreeSet<String>> {
    let tags: BTreeSet<String> = segment
        .split(TAG_SEPARATORS)
        .map(clean_tag)
        .filter(|t| !t.is_empty())
        .collect();
    (!tags.is_empty()).then_some(tags)
}

/// Digits, star glyphs or Chinese numerals, clamped to 1..=5.
pub fn parse_difficulty(text: &str) -> Option<u8> {
    let stars = text.chars().filter(|&c| c == '★').count();
    if stars > 0 {
        return Some(u8::try_from(stars.min(5)).unwrap_or(5));
    }
    if let Some(digit) = text.chars().find_map(|c| c.to_digit(10)) {
        return Some(u8::try_from(digit.clamp(1, 5)).unwrap_or(DEFAULT_DIFFICULTY));
    }
    text.chars().find_map(|c| match c {
        '一' => Some(1),
        '二' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        _ => None,
    })
}
