//! Section markers the models are prompted to emit, with the spellings
//! they actually use.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Category,
    Subcategory,
    ErrorType,
    SourceText,
    Solution,
    Difficulty,
    Tags,
    /// Free-form analysis. Not stored; only ends the previous section.
    Analysis,
}

pub const MARKERS: &[(Field, &[&str])] = &[
    (Field::Category, &["学科", "科目", "分类", "Subject", "Category"]),
    (
        Field::Subcategory,
        &["子分类", "题型", "知识点类别", "Subcategory", "Question Type"],
    ),
    (Field::ErrorType, &["错误类型", "错误类别", "Error Type"]),
    (Field::SourceText, &["题目内容", "原题", "题目", "Question"]),
    (
        Field::Solution,
        &[
            "正确解法",
            "正确解答",
            "解题步骤",
            "解答过程",
            "Correct Solution",
            "Solution",
        ],
    ),
    (Field::Difficulty, &["难度等级", "难度", "Difficulty"]),
    (
        Field::Tags,
        &["知识点标签", "知识点", "标签", "Knowledge Points", "Tags"],
    ),
    (
        Field::Analysis,
        &["错误分析", "错误原因", "原因分析", "Analysis"],
    ),
];

/// A matched marker. `end` is just past the colon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerHit {
    pub field: Field,
    pub start: usize,
    pub end: usize,
}

/// Characters allowed between a marker word and its colon (markdown bold,
/// bracket closers, spaces).
fn colon_end(text: &str, from: usize) -> Option<usize> {
    for (offset, c) in text[from..].char_indices() {
        match c {
            '*' | ' ' | '\t' | '】' | ']' => {}
            ':' | '：' => return Some(from + offset + c.len_utf8()),
            _ => return None,
        }
    }
    None
}

fn starts_mid_word(haystack: &str, start: usize, needle: &str) -> bool {
    needle.starts_with(|c: char| c.is_ascii_alphabetic())
        && haystack[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric())
}

/// All marker occurrences in text order. ASCII markers match
/// case-insensitively. Where matches overlap the longest one starting
/// first wins, so `题目内容：` is not also read as `题目`.
pub fn find_markers(text: &str) -> Vec<MarkerHit> {
    // ASCII lowercasing keeps byte offsets valid for `text`.
    let haystack = text.to_ascii_lowercase();
    let mut hits = Vec::new();

    for (field, synonyms) in MARKERS {
        for synonym in *synonyms {
            let needle = synonym.to_ascii_lowercase();
            for (start, _) in haystack.match_indices(&needle) {
                if starts_mid_word(&haystack, start, &needle) {
                    continue;
                }
                if let Some(end) = colon_end(&haystack, start + needle.len()) {
                    hits.push(MarkerHit {
                        field: *field,
                        start,
                        end,
                    });
                }
            }
        }
    }

    hits.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
    });

    let mut kept: Vec<MarkerHit> = Vec::with_capacity(hits.len());
    for hit in hits {
        if kept.last().is_some_and(|last| hit.start < last.end) {
            continue;
        }
        kept.push(hit);
    }
    kept
}

/// `(field, segment)` pairs: the text after each marker up to the next
/// marker or the end.
pub fn segments(text: &str) -> Vec<(Field, &str)> {
    let hits = find_markers(text);
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let end = hits.get(i + 1).map_or(text.len(), |next| next.start);
            (hit.field, &text[hit.end..end])
        })
        .collect()
}
