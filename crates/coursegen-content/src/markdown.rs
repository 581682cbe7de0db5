//! Markdown export of a whole course.
//!
//! [`MarkdownExporter`] renders a [`CourseTree`] as a single document for
//! offline reading: an overview table, then every module and lesson in
//! order, with blocks rendered by type and quiz answers spelled out.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use coursegen_content::normalize::{parse_course_outline, OutlineContext};
//! use coursegen_content::{Difficulty, MarkdownExporter};
//!
//! let outline = parse_course_outline(&serde_json::json!({
//!     "title": "Rust Basics",
//!     "modules": [{"title": "Getting Started", "lessons": [{"title": "Hello"}]}]
//! }))
//! .unwrap();
//! let ctx = OutlineContext {
//!     creator: "alice",
//!     topic: "Rust",
//!     difficulty: Difficulty::Beginner,
//!     duration: "2 weeks",
//! };
//! let tree = outline.into_tree(&ctx, Utc::now()).unwrap();
//!
//! let markdown = MarkdownExporter::new(&tree).generate();
//! assert!(markdown.starts_with("# Rust Basics"));
//! assert!(markdown.contains("### Lesson 1.1: Hello"));
//! ```

use std::fmt::Write;

use crate::block::{BlockBody, McqBlock, VideoBlock};
use crate::course::{CourseTree, Lesson, Module};

/// Shallowest level for headings inside a lesson (lessons themselves are `###`).
const MIN_BLOCK_HEADING_DEPTH: usize = 4;

/// Deepest Markdown heading level.
const MAX_HEADING_DEPTH: usize = 6;

/// YouTube links are exported in this form, followed by the video id.
const YOUTUBE_WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Renders a [`CourseTree`] as Markdown.
pub struct MarkdownExporter<'a> {
    tree: &'a CourseTree,
}

impl<'a> MarkdownExporter<'a> {
    /// Creates an exporter for the given course.
    #[must_use]
    pub const fn new(tree: &'a CourseTree) -> Self {
        Self { tree }
    }

    /// Renders the complete document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_overview(&mut output);
        for (index, module) in self.tree.ordered_modules().into_iter().enumerate() {
            self.write_module(&mut output, index + 1, module);
        }

        let len = output.trim_end().len();
        output.truncate(len);
        output.push('\n');
        output
    }

    /// Suggested file name for the download.
    #[must_use]
    pub fn file_name(&self) -> String {
        let slug: String = self
            .tree
            .course
            .title
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        let slug = slug
            .split('-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        if slug.is_empty() {
            "course.md".to_string()
        } else {
            format!("{slug}.md")
        }
    }

    fn write_overview(&self, output: &mut String) {
        let course = &self.tree.course;

        let _ = writeln!(output, "# {}\n", course.title);
        if !course.description.trim().is_empty() {
            let _ = writeln!(output, "{}\n", course.description.trim());
        }

        let _ = writeln!(output, "| Difficulty | Duration | Modules | Lessons |");
        let _ = writeln!(output, "|------------|----------|---------|---------|");
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |\n",
            course.difficulty,
            course.estimated_duration,
            self.tree.modules.len(),
            self.tree.lessons.len()
        );

        if !course.tags.is_empty() {
            let _ = writeln!(output, "**Tags:** {}\n", course.tags.join(", "));
        }
    }

    fn write_module(&self, output: &mut String, number: usize, module: &Module) {
        let _ = writeln!(output, "## Module {number}: {}\n", module.title);
        if !module.description.trim().is_empty() {
            let _ = writeln!(output, "{}\n", module.description.trim());
        }

        for (index, lesson) in self.tree.lessons_of(module.id).into_iter().enumerate() {
            write_lesson(output, number, index + 1, lesson);
        }
    }
}

fn write_lesson(output: &mut String, module_number: usize, number: usize, lesson: &Lesson) {
    let _ = writeln!(
        output,
        "### Lesson {module_number}.{number}: {}\n",
        lesson.title
    );
    let _ = writeln!(
        output,
        "*Estimated duration: {}*\n",
        lesson.estimated_duration
    );

    if !lesson.objectives.is_empty() {
        let _ = writeln!(output, "**Objectives**\n");
        for objective in &lesson.objectives {
            let _ = writeln!(output, "- {objective}");
        }
        let _ = writeln!(output);
    }

    if !lesson.is_enriched {
        let _ = writeln!(output, "_Content not generated yet._\n");
    }

    for block in lesson.sorted_content() {
        write_block(output, &block.body);
    }
}

fn write_block(output: &mut String, body: &BlockBody) {
    match body {
        BlockBody::Heading { text, level } => {
            let depth = (usize::from(*level) + 2).clamp(MIN_BLOCK_HEADING_DEPTH, MAX_HEADING_DEPTH);
            let _ = writeln!(output, "{} {text}\n", "#".repeat(depth));
        }
        BlockBody::Paragraph { text } => {
            let _ = writeln!(output, "{}\n", text.trim());
        }
        BlockBody::Code { text, language } => {
            let fence = code_fence(text);
            let _ = writeln!(output, "{fence}{language}\n{}\n{fence}\n", text.trim_end());
        }
        BlockBody::Video(video) => write_video(output, video),
        BlockBody::Mcq(mcq) => write_mcq(output, mcq),
    }
}

fn write_video(output: &mut String, video: &VideoBlock) {
    let label = video.title.as_deref().unwrap_or("Video");

    match (video.url.as_deref(), video.search_query.as_deref()) {
        (Some(url), _) => {
            let link = video
                .youtube_id()
                .map_or_else(|| url.to_string(), |id| format!("{YOUTUBE_WATCH_URL}{id}"));
            let _ = writeln!(output, "> **Video:** [{label}]({link})");
        }
        (None, Some(query)) => {
            let _ = writeln!(output, "> **Video:** {label} (search: \"{query}\")");
        }
        (None, None) => {
            let _ = writeln!(output, "> **Video:** {label}");
        }
    }
    if let Some(description) = video.description.as_deref() {
        let _ = writeln!(output, ">\n> {description}");
    }
    let _ = writeln!(output);
}

fn write_mcq(output: &mut String, mcq: &McqBlock) {
    let _ = writeln!(output, "**Question:** {}\n", mcq.question);
    for (index, option) in mcq.options.iter().enumerate() {
        let _ = writeln!(output, "- {}. {option}", option_label(index));
    }
    let _ = writeln!(output);

    if let Some(correct) = mcq.correct_option() {
        let _ = writeln!(
            output,
            "**Answer:** {}. {correct}\n",
            option_label(mcq.clamped_answer())
        );
    }
    if let Some(explanation) = mcq.explanation.as_deref() {
        let _ = writeln!(output, "{explanation}\n");
    }
}

/// Backtick fence longer than any backtick run inside `text`.
fn code_fence(text: &str) -> String {
    let longest = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat((longest + 1).max(3))
}

/// `A`, `B`, ... for the first 26 options, then 1-based numbers.
fn option_label(index: usize) -> String {
    u8::try_from(index)
        .ok()
        .filter(|i| *i < 26)
        .map_or_else(|| (index + 1).to_string(), |i| char::from(b'A' + i).to_string())
}
