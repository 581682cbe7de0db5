//! Normalization of raw model output into canonical course content.
//!
//! Model responses are untrusted text. This module turns them into typed
//! documents in two steps:
//!
//! 1. [`extract_json`] strips a surrounding code fence, slices from the
//!    first `{` to the last `}` and parses the result.
//! 2. [`parse_lesson_payload`] / [`parse_course_outline`] map the parsed
//!    value onto [`GeneratedLesson`] / [`CourseOutline`]. Lesson blocks go
//!    through [`ProviderBlock`], whose `Unrecognized` arm keeps unknown
//!    block types as placeholder paragraphs so the block count never shrinks.
//!
//! Nothing here retries. A response that cannot be parsed is reported as
//! [`ContentError::InvalidJson`] and the caller decides whether to ask the
//! model again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::block::{BlockBody, ContentBlock, McqBlock, VideoBlock, DEFAULT_CODE_LANGUAGE};
use crate::course::{Course, CourseTree, Difficulty, Lesson, Module};
use crate::{ContentError, Result};

/// Markdown code fence delimiter.
const FENCE: &str = "```";

/// Duration given to lessons the outline leaves unspecified.
pub const DEFAULT_LESSON_DURATION: &str = "15 minutes";

// ============================================================================
// JSON Extraction
// ============================================================================

/// Extracts the JSON object embedded in a model response.
///
/// Tolerates a leading fence line (with or without a language tag), a
/// trailing fence line, and prose before or after the object.
///
/// # Examples
///
/// ```
/// use coursegen_content::normalize::extract_json;
///
/// let value = extract_json("Here you go: ```json {\"a\":1} ``` Hope that helps!").unwrap();
/// assert_eq!(value, serde_json::json!({"a": 1}));
/// ```
pub fn extract_json(raw: &str) -> Result<Value> {
    let body = strip_code_fence(raw.trim());

    let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) else {
        return Err(ContentError::invalid_json(
            raw,
            "no JSON object found in response",
        ));
    };
    if end < start {
        return Err(ContentError::invalid_json(
            raw,
            "no JSON object found in response",
        ));
    }

    serde_json::from_str(&body[start..=end])
        .map_err(|e| ContentError::invalid_json(raw, format!("failed to parse JSON: {e}")))
}

/// Removes a leading fence line and a trailing fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let mut body = text;

    if let Some(rest) = body.strip_prefix(FENCE) {
        // The fence line may carry a language tag; drop the whole line.
        body = rest.find('\n').map_or(rest, |newline| &rest[newline + 1..]);
    }

    let trimmed = body.trim_end();
    trimmed.strip_suffix(FENCE).unwrap_or(trimmed)
}

// ============================================================================
// Provider Blocks
// ============================================================================

/// A content block as the model emitted it, decoded by type.
///
/// The model wraps each block as `{type, content, metadata, order}` where
/// `content` is either a string or an object and `metadata` carries extras
/// such as the heading level or code language.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderBlock {
    /// `heading` block.
    Heading {
        /// Heading text.
        text: Option<String>,
        /// From `metadata.level`.
        level: Option<u8>,
    },
    /// `paragraph` block.
    Paragraph {
        /// Paragraph text.
        text: Option<String>,
    },
    /// `code` block.
    Code {
        /// Source code.
        text: Option<String>,
        /// From `metadata.language`.
        language: Option<String>,
    },
    /// `video` block.
    Video(VideoBlock),
    /// `quiz` or `mcq` block.
    Quiz {
        /// Question prompt.
        question: Option<String>,
        /// Answer options.
        options: Vec<String>,
        /// `correctAnswer` or `answer`, as given.
        answer: Value,
        /// Optional explanation.
        explanation: Option<String>,
    },
    /// Any other `type`.
    Unrecognized {
        /// The type name the model used.
        type_name: String,
        /// The raw `content` value.
        content: Value,
    },
}

/// A decoded provider block with its requested position.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEntry {
    /// The `order` the model assigned, if any.
    pub order: Option<i64>,
    /// The decoded block.
    pub block: ProviderBlock,
}

/// Field lookup over `content`, then `metadata`, then the wrapper itself.
struct Fields<'a> {
    content: &'a Value,
    metadata: &'a Value,
    wrapper: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn new(value: &'a Value) -> Self {
        Self {
            content: value.get("content").unwrap_or(&Value::Null),
            metadata: value.get("metadata").unwrap_or(&Value::Null),
            wrapper: value.as_object(),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.content
            .get(key)
            .or_else(|| self.metadata.get(key))
            .or_else(|| self.wrapper.and_then(|map| map.get(key)))
    }

    fn string(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|key| self.get(key).and_then(value_to_text))
    }

    /// Main text: `content` itself when it is a string.
    fn text(&self, keys: &[&str]) -> Option<String> {
        value_to_text(self.content).or_else(|| self.string(keys))
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ProviderEntry {
    /// Decodes one element of the model's content array.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let order = value.get("order").and_then(value_to_index);
        let type_name = value
            .get("type")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        let fields = Fields::new(value);

        let block = match type_name.as_str() {
            "heading" => ProviderBlock::Heading {
                text: fields.text(&["text", "title"]),
                level: fields
                    .get("level")
                    .and_then(value_to_index)
                    .map(|level| u8::try_from(level.clamp(1, 6)).unwrap_or(2)),
            },
            "paragraph" => ProviderBlock::Paragraph {
                text: fields.text(&["text"]),
            },
            "code" => ProviderBlock::Code {
                text: fields.text(&["code", "text"]),
                language: fields.string(&["language", "lang"]),
            },
            "video" => ProviderBlock::Video(decode_video(&fields)),
            "quiz" | "mcq" => ProviderBlock::Quiz {
                question: fields.text(&["question"]),
                options: fields
                    .get("options")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(option_text).collect())
                    .unwrap_or_default(),
                answer: fields
                    .get("correctAnswer")
                    .or_else(|| fields.get("answer"))
                    .cloned()
                    .unwrap_or(Value::Null),
                explanation: fields.string(&["explanation"]),
            },
            _ => ProviderBlock::Unrecognized {
                type_name: if type_name.is_empty() {
                    "(missing type)".to_string()
                } else {
                    type_name
                },
                content: fields.content.clone(),
            },
        };

        Self { order, block }
    }
}

fn decode_video(fields: &Fields<'_>) -> VideoBlock {
    let mut video = VideoBlock {
        url: fields.string(&["url", "videoUrl"]),
        search_query: fields.string(&["searchQuery", "search_query", "query"]),
        title: fields.string(&["title"]),
        description: fields.string(&["description"]),
    };

    // A bare string is a URL when it looks like one, otherwise a query.
    if let Some(text) = value_to_text(fields.content) {
        if text.starts_with("http://") || text.starts_with("https://") {
            video.url.get_or_insert(text);
        } else {
            video.search_query.get_or_insert(text);
        }
    }

    video
}

fn option_text(value: &Value) -> Option<String> {
    value_to_text(value).or_else(|| value.get("text").and_then(value_to_text))
}

/// Resolves an answer given as an index, a numeric string, an option
/// letter, or the option text itself. Option text wins over a numeric
/// reading of the same string. Unresolvable answers become 0.
fn resolve_answer(answer: &Value, options: &[String]) -> usize {
    let Some(text) = answer.as_str().map(str::trim) else {
        return value_to_index(answer)
            .map_or(0, |index| usize::try_from(index).unwrap_or(usize::MAX));
    };

    if let Some(position) = options.iter().position(|option| option.trim() == text) {
        return position;
    }

    if let Some(index) = value_to_index(answer) {
        return usize::try_from(index).unwrap_or(usize::MAX);
    }

    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_alphabetic() => {
            (letter.to_ascii_uppercase() as usize).saturating_sub('A' as usize)
        }
        _ => 0,
    }
}

fn placeholder(kind: &str, reason: &str) -> BlockBody {
    BlockBody::Paragraph {
        text: format!("[Invalid {kind} block: {reason}]"),
    }
}

impl ProviderBlock {
    /// Maps this provider block onto the canonical payload.
    ///
    /// Never drops a block: unknown types and known types missing their
    /// required fields become placeholder paragraphs.
    #[must_use]
    pub fn into_body(self) -> BlockBody {
        match self {
            Self::Heading { text, level } => match text {
                Some(text) => BlockBody::Heading {
                    text,
                    level: level.unwrap_or(crate::block::DEFAULT_HEADING_LEVEL),
                },
                None => placeholder("heading", "missing text"),
            },
            Self::Paragraph { text } => match text {
                Some(text) => BlockBody::Paragraph { text },
                None => placeholder("paragraph", "missing text"),
            },
            Self::Code { text, language } => match text {
                Some(text) => BlockBody::Code {
                    text,
                    language: language.unwrap_or_else(|| DEFAULT_CODE_LANGUAGE.to_string()),
                },
                None => placeholder("code", "missing code"),
            },
            Self::Video(video) => {
                if video.is_playable() {
                    BlockBody::Video(video)
                } else {
                    placeholder("video", "missing url and search query")
                }
            }
            Self::Quiz {
                question,
                options,
                answer,
                explanation,
            } => match question {
                Some(_) if options.is_empty() => placeholder("quiz", "no options"),
                Some(question) => {
                    let index = resolve_answer(&answer, &options);
                    BlockBody::Mcq(McqBlock::new(question, options, index, explanation))
                }
                None => placeholder("quiz", "missing question"),
            },
            Self::Unrecognized { type_name, content } => {
                let text = match value_to_text(&content) {
                    Some(inner) => format!("[Unsupported content type \"{type_name}\"] {inner}"),
                    None => format!("[Unsupported content type \"{type_name}\"]"),
                };
                BlockBody::Paragraph { text }
            }
        }
    }
}

/// Converts provider entries into canonical blocks numbered `0..n`.
///
/// When every entry carries an `order`, entries are sorted by it (ties keep
/// their input position); otherwise the input sequence is kept.
#[must_use]
pub fn to_canonical_blocks(entries: Vec<ProviderEntry>) -> Vec<ContentBlock> {
    let mut entries = entries;
    if entries.iter().all(|entry| entry.order.is_some()) {
        entries.sort_by_key(|entry| entry.order.unwrap_or_default());
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(position, entry)| {
            ContentBlock::new(
                u32::try_from(position).unwrap_or(u32::MAX),
                entry.block.into_body(),
            )
        })
        .collect()
}

// ============================================================================
// Lesson Payload
// ============================================================================

/// Lesson content produced by one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedLesson {
    /// Title suggested by the model (informational).
    pub title: Option<String>,
    /// Refined description, if provided.
    pub description: Option<String>,
    /// Learning objectives.
    pub objectives: Vec<String>,
    /// Duration estimate, if provided.
    pub estimated_duration: Option<String>,
    /// Canonical blocks numbered `0..n`.
    pub blocks: Vec<ContentBlock>,
}

/// Maps a parsed lesson response onto a [`GeneratedLesson`].
///
/// Accepts the lesson at the root or under a `lesson` key, with blocks under
/// `content` (or `blocks`).
pub fn parse_lesson_payload(value: &Value) -> Result<GeneratedLesson> {
    let root = value
        .get("lesson")
        .filter(|inner| inner.is_object())
        .unwrap_or(value);

    let Some(items) = root
        .get("content")
        .or_else(|| root.get("blocks"))
        .and_then(Value::as_array)
    else {
        return Err(ContentError::invalid_json(
            value.to_string(),
            "response has no content block array",
        ));
    };

    if items.is_empty() {
        return Err(ContentError::invalid_json(
            value.to_string(),
            "response contains no content blocks",
        ));
    }

    let blocks = to_canonical_blocks(items.iter().map(ProviderEntry::from_value).collect());

    let objectives = root
        .get("objectives")
        .or_else(|| root.get("learningObjectives"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(value_to_text).collect())
        .unwrap_or_default();

    let text_field = |keys: &[&str]| keys.iter().find_map(|key| root.get(key).and_then(value_to_text));

    Ok(GeneratedLesson {
        title: text_field(&["title"]),
        description: text_field(&["description"]),
        objectives,
        estimated_duration: text_field(&["estimatedDuration", "duration"]),
        blocks,
    })
}

// ============================================================================
// Course Outline
// ============================================================================

/// Accepts a string or a number, e.g. `"30 minutes"` or `30`.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_text))
}

/// Accepts a list of strings, silently skipping non-text items.
fn lenient_strings<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(value_to_text).collect())
        .unwrap_or_default())
}

/// Course structure returned by the outline prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutline {
    /// Course title.
    #[serde(default)]
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Topic tags.
    #[serde(default, deserialize_with = "lenient_strings")]
    pub tags: Vec<String>,
    /// Difficulty as the model wrote it.
    #[serde(default, deserialize_with = "lenient_string")]
    pub difficulty: Option<String>,
    /// Overall duration.
    #[serde(default, alias = "duration", deserialize_with = "lenient_string")]
    pub estimated_duration: Option<String>,
    /// Modules in order.
    #[serde(default)]
    pub modules: Vec<ModuleOutline>,
}

/// One module of a [`CourseOutline`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOutline {
    /// Module title.
    #[serde(default)]
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Lessons in order.
    #[serde(default)]
    pub lessons: Vec<LessonOutline>,
}

/// One lesson of a [`ModuleOutline`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonOutline {
    /// Lesson title.
    #[serde(default)]
    pub title: String,
    /// Short description, used as the stub content.
    #[serde(default)]
    pub description: String,
    /// Duration estimate.
    #[serde(default, alias = "duration", deserialize_with = "lenient_string")]
    pub estimated_duration: Option<String>,
}

/// Request values the outline falls back on when the model omits them.
#[derive(Debug, Clone, Copy)]
pub struct OutlineContext<'a> {
    /// Owner of the new course.
    pub creator: &'a str,
    /// Topic the user asked for; the title of last resort.
    pub topic: &'a str,
    /// Requested difficulty.
    pub difficulty: Difficulty,
    /// Requested duration.
    pub duration: &'a str,
}

/// Maps a parsed outline response onto a [`CourseOutline`].
///
/// Accepts the outline at the root or under a `course` key.
pub fn parse_course_outline(value: &Value) -> Result<CourseOutline> {
    let root = value
        .get("course")
        .filter(|inner| inner.is_object())
        .unwrap_or(value);

    CourseOutline::deserialize(root).map_err(|e| {
        ContentError::invalid_json(value.to_string(), format!("unexpected outline shape: {e}"))
    })
}

fn position(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

impl CourseOutline {
    /// Builds the full course tree with stub lessons.
    ///
    /// Fails on the first module or lesson that cannot be built; nothing is
    /// returned partially, so a caller that persists the tree in one write
    /// never leaves a half-built course behind.
    pub fn into_tree(self, ctx: &OutlineContext<'_>, now: DateTime<Utc>) -> Result<CourseTree> {
        if self.modules.is_empty() {
            return Err(ContentError::invalid_outline("outline contains no modules"));
        }

        let course_id = Uuid::new_v4();
        let mut modules = Vec::with_capacity(self.modules.len());
        let mut lessons = Vec::new();

        for (module_index, outline) in self.modules.into_iter().enumerate() {
            let module_title = outline.title.trim().to_string();
            if module_title.is_empty() {
                return Err(ContentError::invalid_outline(format!(
                    "module {} has no title",
                    module_index + 1
                )));
            }
            if outline.lessons.is_empty() {
                return Err(ContentError::invalid_outline(format!(
                    "module {} ('{module_title}') has no lessons",
                    module_index + 1
                )));
            }

            let module_id = Uuid::new_v4();
            let mut lesson_ids = Vec::with_capacity(outline.lessons.len());

            for (lesson_index, lesson) in outline.lessons.into_iter().enumerate() {
                let title = lesson.title.trim();
                if title.is_empty() {
                    return Err(ContentError::invalid_outline(format!(
                        "lesson {} of module {} has no title",
                        lesson_index + 1,
                        module_index + 1
                    )));
                }
                let description = if lesson.description.trim().is_empty() {
                    title.to_string()
                } else {
                    lesson.description.trim().to_string()
                };
                let stub = Lesson::stub(
                    module_id,
                    course_id,
                    position(lesson_index),
                    title,
                    description,
                    lesson
                        .estimated_duration
                        .unwrap_or_else(|| DEFAULT_LESSON_DURATION.to_string()),
                );
                lesson_ids.push(stub.id);
                lessons.push(stub);
            }

            modules.push(Module {
                id: module_id,
                course_id,
                title: module_title,
                description: outline.description.trim().to_string(),
                order: position(module_index),
                lessons: lesson_ids,
                is_enriched: true,
            });
        }

        let title = if self.title.trim().is_empty() {
            ctx.topic.trim().to_string()
        } else {
            self.title.trim().to_string()
        };

        let course = Course {
            id: course_id,
            title,
            description: self.description.trim().to_string(),
            tags: self.tags,
            difficulty: self
                .difficulty
                .as_deref()
                .and_then(Difficulty::from_str_case_insensitive)
                .unwrap_or(ctx.difficulty),
            estimated_duration: self
                .estimated_duration
                .unwrap_or_else(|| ctx.duration.to_string()),
            modules: modules.iter().map(|module| module.id).collect(),
            creator: ctx.creator.to_string(),
            is_enriched: false,
            created_at: now,
            updated_at: now,
        };

        Ok(CourseTree {
            course,
            modules,
            lessons,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::block::{renumber, sort_blocks, BlockKind};

    // ------------------------------------------------------------------------
    // extract_json
    // ------------------------------------------------------------------------

    #[test]
    fn test_extract_plain_object() {
        assert_eq!(extract_json(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_extract_fenced_with_language_tag() {
        let raw = "```json\n{\"a\":1}\n```";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_extract_fenced_without_language_tag() {
        let raw = "```\n{\"a\": [1, 2]}\n```\n";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_extract_fence_wrapped_in_prose() {
        let raw = "Here you go: ```json {\"a\":1} ``` Hope that helps!";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_extract_with_nested_braces_in_strings() {
        let raw = "Sure!\n{\"code\": \"fn main() { }\", \"n\": {\"x\": 1}}\nDone.";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["code"], "fn main() { }");
        assert_eq!(value["n"]["x"], 1);
    }

    #[test]
    fn test_extract_without_object_fails_with_raw_text() {
        let err = extract_json("I cannot help with that.").unwrap_err();
        match err {
            ContentError::InvalidJson { raw, message } => {
                assert_eq!(raw, "I cannot help with that.");
                assert!(message.contains("no JSON object"));
            }
            other => panic!("expected InvalidJson, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_malformed_object_fails() {
        let err = extract_json("```json\n{\"a\": 1,,}\n```").unwrap_err();
        assert!(matches!(err, ContentError::InvalidJson { .. }));
        assert!(err.to_string().contains("failed to parse JSON"));
    }

    #[test]
    fn test_extract_reversed_braces_fails() {
        assert!(extract_json("} nothing {").is_err());
    }

    // ------------------------------------------------------------------------
    // Provider block mapping
    // ------------------------------------------------------------------------

    fn canonical(values: &[Value]) -> Vec<ContentBlock> {
        to_canonical_blocks(values.iter().map(ProviderEntry::from_value).collect())
    }

    #[test]
    fn test_metadata_is_unwrapped() {
        let blocks = canonical(&[
            json!({"type": "heading", "content": "Intro", "metadata": {"level": 3}, "order": 1}),
            json!({"type": "code", "content": "let x = 1;", "metadata": {"language": "rust"}, "order": 2}),
        ]);
        assert_eq!(
            blocks[0].body,
            BlockBody::Heading {
                text: "Intro".into(),
                level: 3
            }
        );
        assert_eq!(
            blocks[1].body,
            BlockBody::Code {
                text: "let x = 1;".into(),
                language: "rust".into()
            }
        );
    }

    #[test]
    fn test_code_language_defaults_to_text() {
        let blocks = canonical(&[json!({"type": "code", "content": "echo hi"})]);
        assert_eq!(
            blocks[0].body,
            BlockBody::Code {
                text: "echo hi".into(),
                language: "text".into()
            }
        );
    }

    #[test]
    fn test_quiz_collapses_to_mcq() {
        let blocks = canonical(&[json!({
            "type": "quiz",
            "content": {
                "question": "Which keyword declares a constant?",
                "options": ["let", "const", "mut"],
                "correctAnswer": 1,
                "explanation": "const declares a constant."
            },
            "order": 0
        })]);
        let BlockBody::Mcq(mcq) = &blocks[0].body else {
            panic!("expected mcq, got {:?}", blocks[0].body);
        };
        assert_eq!(mcq.answer, 1);
        assert_eq!(mcq.options.len(), 3);
        assert_eq!(mcq.explanation.as_deref(), Some("const declares a constant."));
    }

    #[test]
    fn test_answer_given_as_letter_or_text() {
        let by_letter = canonical(&[json!({
            "type": "mcq",
            "content": {"question": "Q", "options": ["a", "b", "c"], "correctAnswer": "C"}
        })]);
        let by_text = canonical(&[json!({
            "type": "mcq",
            "content": {"question": "Q", "options": ["a", "b", "c"], "answer": "b"}
        })]);
        assert!(matches!(&by_letter[0].body, BlockBody::Mcq(m) if m.answer == 2));
        assert!(matches!(&by_text[0].body, BlockBody::Mcq(m) if m.answer == 1));
    }

    #[test]
    fn test_out_of_range_answer_clamps_to_zero() {
        let blocks = canonical(&[json!({
            "type": "quiz",
            "content": {"question": "Q", "options": ["a", "b", "c", "d"], "correctAnswer": 99}
        })]);
        assert!(matches!(&blocks[0].body, BlockBody::Mcq(m) if m.answer == 0));

        let negative = canonical(&[json!({
            "type": "quiz",
            "content": {"question": "Q", "options": ["a", "b"], "correctAnswer": -1}
        })]);
        assert!(matches!(&negative[0].body, BlockBody::Mcq(m) if m.answer == 0));
    }

    #[test]
    fn test_quiz_question_from_string_content() {
        let blocks = canonical(&[json!({
            "type": "quiz",
            "content": "What is 2+2?",
            "metadata": {"options": ["3", "4"], "correctAnswer": 1}
        })]);
        let BlockBody::Mcq(mcq) = &blocks[0].body else {
            panic!("expected mcq, got {:?}", blocks[0].body);
        };
        assert_eq!(mcq.question, "What is 2+2?");
        assert_eq!(mcq.options, vec!["3".to_string(), "4".to_string()]);
        assert_eq!(mcq.answer, 1);
    }

    #[test]
    fn test_numeric_option_text_beats_index() {
        let by_text = canonical(&[json!({
            "type": "quiz",
            "content": {"question": "Q", "options": ["1", "2", "3"], "answer": "3"}
        })]);
        assert!(matches!(&by_text[0].body, BlockBody::Mcq(m) if m.answer == 2));

        let by_index = canonical(&[json!({
            "type": "quiz",
            "content": {"question": "Q", "options": ["a", "b", "c"], "answer": "2"}
        })]);
        assert!(matches!(&by_index[0].body, BlockBody::Mcq(m) if m.answer == 2));
    }

    #[test]
    fn test_unknown_type_becomes_placeholder_paragraph() {
        let blocks = canonical(&[
            json!({"type": "paragraph", "content": "before"}),
            json!({"type": "unknown_widget", "content": "x"}),
            json!({"type": "paragraph", "content": "after"}),
        ]);
        assert_eq!(blocks.len(), 3);
        let BlockBody::Paragraph { text } = &blocks[1].body else {
            panic!("expected paragraph");
        };
        assert!(text.contains("unknown_widget"));
        assert!(text.contains('x'));
    }

    #[test]
    fn test_invalid_known_blocks_are_kept_as_placeholders() {
        let blocks = canonical(&[
            json!({"type": "video", "content": {"title": "No source"}}),
            json!({"type": "quiz", "content": {"question": "Q", "options": []}}),
            json!({"type": "heading", "content": ""}),
        ]);
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| b.kind() == BlockKind::Paragraph));
    }

    #[test]
    fn test_video_string_content() {
        let blocks = canonical(&[
            json!({"type": "video", "content": "rust ownership explained"}),
            json!({"type": "video", "content": "https://youtu.be/dQw4w9WgXcQ"}),
            json!({"type": "video", "content": {"searchQuery": "borrow checker", "title": "Borrowing"}}),
        ]);
        let videos: Vec<&VideoBlock> = blocks
            .iter()
            .filter_map(|b| match &b.body {
                BlockBody::Video(v) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(videos.len(), 3);
        assert_eq!(
            videos[0].search_query.as_deref(),
            Some("rust ownership explained")
        );
        assert_eq!(videos[1].youtube_id().as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(videos[2].title.as_deref(), Some("Borrowing"));
    }

    #[test]
    fn test_blocks_follow_provider_order() {
        let provider = vec![
            json!({"type": "code", "content": "x", "order": 30}),
            json!({"type": "heading", "content": "A", "order": 10}),
            json!({"type": "video", "content": "q", "order": 40}),
            json!({"type": "paragraph", "content": "B", "order": 20}),
            json!({"type": "quiz", "content": {"question": "Q", "options": ["y"]}, "order": 50}),
        ];
        let blocks = canonical(&provider);
        let kinds: Vec<BlockKind> = blocks.iter().map(ContentBlock::kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading,
                BlockKind::Paragraph,
                BlockKind::Code,
                BlockKind::Video,
                BlockKind::Mcq
            ]
        );
        let orders: Vec<u32> = blocks.iter().map(|b| b.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_canonical_blocks_survive_a_second_pass() {
        let mut original = vec![
            ContentBlock::paragraph(4, "tail"),
            ContentBlock::heading(0, "Title", 1),
            ContentBlock::new(
                2,
                BlockBody::Mcq(McqBlock::new("Q", vec!["a".into(), "b".into()], 1, None)),
            ),
            ContentBlock::new(
                1,
                BlockBody::Code {
                    text: "x".into(),
                    language: "rust".into(),
                },
            ),
            ContentBlock::new(
                3,
                BlockBody::Video(VideoBlock {
                    search_query: Some("q".into()),
                    ..Default::default()
                }),
            ),
        ];

        let serialized: Vec<Value> = original
            .iter()
            .map(|b| serde_json::to_value(b).unwrap())
            .collect();
        let normalized = canonical(&serialized);

        sort_blocks(&mut original);
        renumber(&mut original);
        assert_eq!(normalized, original);
    }

    #[test]
    fn test_missing_orders_keep_input_sequence() {
        let blocks = canonical(&[
            json!({"type": "paragraph", "content": "first", "order": 9}),
            json!({"type": "paragraph", "content": "second"}),
        ]);
        assert_eq!(
            blocks[0].body,
            BlockBody::Paragraph {
                text: "first".into()
            }
        );
    }

    // ------------------------------------------------------------------------
    // Lesson payload
    // ------------------------------------------------------------------------

    #[test]
    fn test_parse_lesson_payload() {
        let value = json!({
            "title": "Ownership",
            "objectives": ["Explain moves", "Use borrows"],
            "estimatedDuration": 25,
            "content": [
                {"type": "heading", "content": "Ownership", "order": 1},
                {"type": "paragraph", "content": "Every value has an owner.", "order": 2}
            ]
        });
        let lesson = parse_lesson_payload(&value).unwrap();
        assert_eq!(lesson.objectives.len(), 2);
        assert_eq!(lesson.estimated_duration.as_deref(), Some("25"));
        assert_eq!(lesson.blocks.len(), 2);
        assert_eq!(lesson.title.as_deref(), Some("Ownership"));
    }

    #[test]
    fn test_parse_lesson_payload_nested_under_lesson_key() {
        let value = json!({"lesson": {"blocks": [{"type": "paragraph", "content": "p"}]}});
        assert_eq!(parse_lesson_payload(&value).unwrap().blocks.len(), 1);
    }

    #[test]
    fn test_parse_lesson_payload_without_blocks_fails() {
        assert!(matches!(
            parse_lesson_payload(&json!({"title": "x"})),
            Err(ContentError::InvalidJson { .. })
        ));
        assert!(matches!(
            parse_lesson_payload(&json!({"content": []})),
            Err(ContentError::InvalidJson { .. })
        ));
    }

    // ------------------------------------------------------------------------
    // Course outline
    // ------------------------------------------------------------------------

    fn ctx() -> OutlineContext<'static> {
        OutlineContext {
            creator: "alice",
            topic: "Rust",
            difficulty: Difficulty::Intermediate,
            duration: "4 weeks",
        }
    }

    fn outline_json(lessons_per_module: &[usize]) -> Value {
        let modules: Vec<Value> = lessons_per_module
            .iter()
            .enumerate()
            .map(|(m, count)| {
                let lessons: Vec<Value> = (0..*count)
                    .map(|l| json!({"title": format!("Lesson {m}.{l}"), "description": "d", "estimatedDuration": "20 minutes"}))
                    .collect();
                json!({"title": format!("Module {m}"), "description": "md", "lessons": lessons})
            })
            .collect();
        json!({
            "title": "Rust in Practice",
            "description": "Hands-on Rust",
            "tags": ["rust", "systems"],
            "difficulty": "Advanced",
            "modules": modules
        })
    }

    #[test]
    fn test_outline_into_tree() {
        let outline = parse_course_outline(&outline_json(&[3, 4, 3])).unwrap();
        let tree = outline.into_tree(&ctx(), Utc::now()).unwrap();

        assert_eq!(tree.course.title, "Rust in Practice");
        assert_eq!(tree.course.difficulty, Difficulty::Advanced);
        assert_eq!(tree.course.estimated_duration, "4 weeks");
        assert_eq!(tree.course.creator, "alice");
        assert_eq!(tree.modules.len(), 3);
        assert_eq!(tree.lessons.len(), 10);
        assert!(tree.lessons.iter().all(|l| !l.is_enriched && l.content.len() == 1));
        assert!(tree.modules.iter().all(|m| m.is_enriched));
        assert!(tree.check_consistency().is_ok());
    }

    #[test]
    fn test_outline_under_course_key_with_fallbacks() {
        let value = json!({"course": {"modules": [{"title": "Only", "lessons": [{"title": "L"}]}]}});
        let tree = parse_course_outline(&value)
            .unwrap()
            .into_tree(&ctx(), Utc::now())
            .unwrap();
        assert_eq!(tree.course.title, "Rust");
        assert_eq!(tree.course.difficulty, Difficulty::Intermediate);
        assert_eq!(tree.lessons[0].description, "L");
        assert_eq!(tree.lessons[0].estimated_duration, DEFAULT_LESSON_DURATION);
    }

    #[test]
    fn test_outline_module_without_lessons_fails() {
        let outline = parse_course_outline(&outline_json(&[3, 0, 3, 3])).unwrap();
        let err = outline.into_tree(&ctx(), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("module 2"));
    }

    #[test]
    fn test_outline_without_modules_fails() {
        let outline = parse_course_outline(&json!({"title": "Empty"})).unwrap();
        assert!(matches!(
            outline.into_tree(&ctx(), Utc::now()),
            Err(ContentError::InvalidOutline { .. })
        ));
    }

    #[test]
    fn test_outline_wrong_shape_is_invalid_json() {
        let err = parse_course_outline(&json!({"modules": "not a list"})).unwrap_err();
        assert!(matches!(err, ContentError::InvalidJson { .. }));
    }
}
