//! Canonical lesson content blocks.
//!
//! A lesson's content is an ordered list of [`ContentBlock`]s. Each block
//! carries an `order` key and a [`BlockBody`] discriminated by `type`:
//!
//! ```json
//! {"order": 0, "type": "heading", "text": "Ownership", "level": 2}
//! {"order": 1, "type": "mcq", "question": "...", "options": ["a", "b"], "answer": 1}
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Heading level used when none is provided.
pub const DEFAULT_HEADING_LEVEL: u8 = 2;

/// Code language used when none is provided.
pub const DEFAULT_CODE_LANGUAGE: &str = "text";

const fn default_heading_level() -> u8 {
    DEFAULT_HEADING_LEVEL
}

fn default_code_language() -> String {
    DEFAULT_CODE_LANGUAGE.to_string()
}

/// Matches the video id in the common YouTube URL shapes.
static YOUTUBE_ID: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?:youtube\.com/(?:watch\?(?:.*&)?v=|embed/|shorts/)|youtu\.be/)([A-Za-z0-9_-]{11})")
        .ok()
});

// ============================================================================
// ContentBlock
// ============================================================================

/// A single ordered unit of lesson content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Position within the lesson; unique and increasing.
    pub order: u32,

    /// The typed payload.
    #[serde(flatten)]
    pub body: BlockBody,
}

impl ContentBlock {
    /// Creates a block at the given position.
    #[must_use]
    pub const fn new(order: u32, body: BlockBody) -> Self {
        Self { order, body }
    }

    /// Creates a paragraph block.
    #[must_use]
    pub fn paragraph(order: u32, text: impl Into<String>) -> Self {
        Self::new(order, BlockBody::Paragraph { text: text.into() })
    }

    /// Creates a heading block, clamping the level into `1..=6`.
    #[must_use]
    pub fn heading(order: u32, text: impl Into<String>, level: u8) -> Self {
        Self::new(
            order,
            BlockBody::Heading {
                text: text.into(),
                level: level.clamp(1, 6),
            },
        )
    }

    /// Returns the discriminant of this block.
    #[must_use]
    pub const fn kind(&self) -> BlockKind {
        self.body.kind()
    }
}

/// Sorts blocks by `order`. Ties keep their relative position.
pub fn sort_blocks(blocks: &mut [ContentBlock]) {
    blocks.sort_by_key(|block| block.order);
}

/// Rewrites `order` as `0..n` following the current sequence.
pub fn renumber(blocks: &mut [ContentBlock]) {
    for (index, block) in blocks.iter_mut().enumerate() {
        block.order = u32::try_from(index).unwrap_or(u32::MAX);
    }
}

/// Returns `true` if block orders are strictly increasing.
#[must_use]
pub fn is_strictly_ordered(blocks: &[ContentBlock]) -> bool {
    blocks.windows(2).all(|pair| pair[0].order < pair[1].order)
}

// ============================================================================
// BlockBody
// ============================================================================

/// Typed block payload, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlockBody {
    /// Section heading.
    Heading {
        /// Heading text.
        text: String,
        /// Heading level, 1 through 6.
        #[serde(default = "default_heading_level")]
        level: u8,
    },

    /// Prose paragraph (may contain Markdown).
    Paragraph {
        /// Paragraph text.
        text: String,
    },

    /// Code listing.
    Code {
        /// Source code.
        text: String,
        /// Language used for highlighting.
        #[serde(default = "default_code_language")]
        language: String,
    },

    /// Embedded video, either a concrete URL or a query resolved later.
    Video(VideoBlock),

    /// Multiple-choice question.
    #[serde(alias = "quiz")]
    Mcq(McqBlock),
}

impl BlockBody {
    /// Returns the discriminant of this payload.
    #[must_use]
    pub const fn kind(&self) -> BlockKind {
        match self {
            Self::Heading { .. } => BlockKind::Heading,
            Self::Paragraph { .. } => BlockKind::Paragraph,
            Self::Code { .. } => BlockKind::Code,
            Self::Video(_) => BlockKind::Video,
            Self::Mcq(_) => BlockKind::Mcq,
        }
    }
}

/// Block discriminant without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Section heading.
    Heading,
    /// Prose paragraph.
    Paragraph,
    /// Code listing.
    Code,
    /// Embedded video.
    Video,
    /// Multiple-choice question.
    Mcq,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heading => write!(f, "heading"),
            Self::Paragraph => write!(f, "paragraph"),
            Self::Code => write!(f, "code"),
            Self::Video => write!(f, "video"),
            Self::Mcq => write!(f, "mcq"),
        }
    }
}

// ============================================================================
// VideoBlock
// ============================================================================

/// Video payload. At least one of `url` or `search_query` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoBlock {
    /// Direct video URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Search query to resolve into a video at render time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,

    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Short description shown under the player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VideoBlock {
    /// Returns `true` if the block has a non-empty URL or search query.
    #[must_use]
    pub fn is_playable(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        present(&self.url) || present(&self.search_query)
    }

    /// Extracts the YouTube video id from `url`, if it is a YouTube link.
    #[must_use]
    pub fn youtube_id(&self) -> Option<String> {
        youtube_id(self.url.as_deref()?)
    }
}

/// Extracts an 11-character YouTube video id from a watch, embed, shorts or
/// short-link URL.
#[must_use]
pub fn youtube_id(url: &str) -> Option<String> {
    let re = YOUTUBE_ID.as_ref()?;
    re.captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

// ============================================================================
// McqBlock
// ============================================================================

/// Multiple-choice question payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McqBlock {
    /// The question prompt.
    pub question: String,

    /// Answer options, at least one.
    pub options: Vec<String>,

    /// Index of the correct option.
    #[serde(default, alias = "correctAnswer")]
    pub answer: usize,

    /// Why the answer is correct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl McqBlock {
    /// Creates a question, clamping an out-of-range answer to 0.
    #[must_use]
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        answer: usize,
        explanation: Option<String>,
    ) -> Self {
        let mut block = Self {
            question: question.into(),
            options,
            answer,
            explanation,
        };
        block.answer = block.clamped_answer();
        block
    }

    /// Returns the answer index, or 0 when it falls outside the options.
    ///
    /// Stored documents may predate clamping, so readers go through this
    /// rather than indexing `options` with `answer` directly.
    #[must_use]
    pub fn clamped_answer(&self) -> usize {
        if self.answer < self.options.len() {
            self.answer
        } else {
            0
        }
    }

    /// Returns the text of the correct option.
    #[must_use]
    pub fn correct_option(&self) -> Option<&str> {
        self.options.get(self.clamped_answer()).map(String::as_str)
    }
}
