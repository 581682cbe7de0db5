//! Coursegen Content
//!
//! Documents and pure transformations behind course generation. Nothing in
//! this crate performs I/O: it describes what a course looks like, how raw
//! model output becomes canonical lesson content, and how completion rolls
//! up from lessons to modules to the whole course.
//!
//! # Modules
//!
//! - [`block`] - The canonical [`ContentBlock`] tagged union
//! - [`course`] - [`Course`], [`Module`] and [`Lesson`] documents
//! - [`normalize`] - JSON extraction and provider-block mapping
//! - [`progress`] - Per-user [`Progress`] records and rollup functions
//! - [`markdown`] - Markdown export of a whole course
//!
//! # Example
//!
//! ```rust
//! use coursegen_content::normalize::{extract_json, parse_lesson_payload};
//!
//! let raw = "```json\n{\"content\": [{\"type\": \"paragraph\", \"content\": \"Hi\", \"order\": 1}]}\n```";
//! let value = extract_json(raw).unwrap();
//! let lesson = parse_lesson_payload(&value).unwrap();
//! assert_eq!(lesson.blocks.len(), 1);
//! ```

pub mod block;
pub mod course;
pub mod markdown;
pub mod normalize;
pub mod progress;

pub use block::{BlockBody, BlockKind, ContentBlock, McqBlock, VideoBlock};
pub use course::{
    Course, CourseSummary, CourseTree, Difficulty, Lesson, LessonSummary, Module, ModuleDetail,
};
pub use markdown::MarkdownExporter;
pub use normalize::{CourseOutline, GeneratedLesson, ProviderBlock};
pub use progress::{
    progress_percentage, CompletedLesson, CompletedModule, CourseRollup, LessonCompletion,
    ModuleRollup, Position, Progress,
};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors produced while turning model output into course content.
#[derive(Debug, Error)]
pub enum ContentError {
    /// No JSON object could be located or parsed in the model response.
    #[error("invalid JSON in model response: {message}")]
    InvalidJson {
        /// Why extraction or parsing failed.
        message: String,
        /// The untouched model output, kept for diagnostics.
        raw: String,
    },

    /// The JSON parsed but does not describe a usable course outline.
    #[error("invalid course outline: {message}")]
    InvalidOutline {
        /// What is wrong with the outline.
        message: String,
    },
}

impl ContentError {
    /// Creates a new `InvalidJson` error.
    #[must_use]
    pub fn invalid_json(raw: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Creates a new `InvalidOutline` error.
    #[must_use]
    pub fn invalid_outline(message: impl Into<String>) -> Self {
        Self::InvalidOutline {
            message: message.into(),
        }
    }
}

/// Result type for content operations.
pub type Result<T> = std::result::Result<T, ContentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_json_display_omits_raw_text() {
        let err = ContentError::invalid_json("lots of model prose", "no JSON object found");
        let msg = err.to_string();
        assert!(msg.contains("no JSON object found"));
        assert!(!msg.contains("lots of model prose"));
    }

    #[test]
    fn test_invalid_outline_display() {
        let err = ContentError::invalid_outline("module 2 has no lessons");
        assert_eq!(
            err.to_string(),
            "invalid course outline: module 2 has no lessons"
        );
    }
}
