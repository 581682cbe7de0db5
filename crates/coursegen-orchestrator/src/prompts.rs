//! Prompt construction for course outlines and lesson content.
//!
//! Both prompts demand a single JSON object and describe its exact shape;
//! the normalizer still tolerates fences and surrounding prose.

use std::fmt::Write;

use coursegen_content::{Course, Difficulty, Lesson, Module};

use crate::config::GenerationSettings;

/// Builds the course outline prompt.
#[must_use]
pub fn course_outline(
    topic: &str,
    difficulty: Difficulty,
    duration: &str,
    settings: &GenerationSettings,
) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are an expert curriculum designer. Design a structured course on \"{topic}\"."
    );
    let _ = writeln!(prompt, "Audience level: {difficulty}.");
    let _ = writeln!(prompt, "Intended duration: {duration}.\n");

    let _ = writeln!(prompt, "Requirements:");
    let _ = writeln!(
        prompt,
        "- Between {} and {} modules, ordered from fundamentals to advanced material.",
        settings.min_modules, settings.max_modules
    );
    let _ = writeln!(
        prompt,
        "- Each module has between {} and {} lessons.",
        settings.min_lessons, settings.max_lessons
    );
    let _ = writeln!(
        prompt,
        "- Every module and lesson has a specific title and a one or two sentence description."
    );
    let _ = writeln!(
        prompt,
        "- Give each lesson an estimated duration such as \"20 minutes\".\n"
    );

    let _ = writeln!(
        prompt,
        "Respond with a single JSON object and nothing else, using exactly this shape:"
    );
    let _ = writeln!(
        prompt,
        r#"{{
  "title": "string",
  "description": "string",
  "tags": ["string"],
  "difficulty": "beginner | intermediate | advanced",
  "estimatedDuration": "string",
  "modules": [
    {{
      "title": "string",
      "description": "string",
      "lessons": [
        {{"title": "string", "description": "string", "estimatedDuration": "string"}}
      ]
    }}
  ]
}}"#
    );

    prompt
}

/// Builds the lesson content prompt.
#[must_use]
pub fn lesson_content(
    course: &Course,
    module: &Module,
    lesson: &Lesson,
    settings: &GenerationSettings,
) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are an expert instructor writing one lesson of the course \"{}\" ({} level).",
        course.title, course.difficulty
    );
    let _ = writeln!(prompt, "Module: \"{}\".", module.title);
    let _ = writeln!(prompt, "Lesson: \"{}\".", lesson.title);
    if !lesson.description.trim().is_empty() {
        let _ = writeln!(prompt, "Lesson summary: {}", lesson.description.trim());
    }
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "Requirements:");
    let _ = writeln!(
        prompt,
        "- Between {} and {} content blocks in teaching order.",
        settings.min_blocks, settings.max_blocks
    );
    let _ = writeln!(
        prompt,
        "- Start with a list of 3 to 5 learning objectives in the \"objectives\" field."
    );
    let _ = writeln!(
        prompt,
        "- At least {} video blocks, each with a YouTube search query that would find a relevant tutorial.",
        settings.min_videos
    );
    let _ = writeln!(
        prompt,
        "- Code blocks with a language tag wherever the topic involves code."
    );
    let _ = writeln!(
        prompt,
        "- End with {} to {} multiple-choice quiz blocks, each with 4 options, the 0-based index of the correct option and an explanation.\n",
        settings.min_questions, settings.max_questions
    );

    let _ = writeln!(
        prompt,
        "Respond with a single JSON object and nothing else, using exactly this shape:"
    );
    let _ = writeln!(
        prompt,
        r#"{{
  "title": "string",
  "description": "string",
  "objectives": ["string"],
  "estimatedDuration": "string",
  "content": [
    {{"type": "heading", "content": "string", "metadata": {{"level": 2}}, "order": 1}},
    {{"type": "paragraph", "content": "string (markdown allowed)", "order": 2}},
    {{"type": "code", "content": "string", "metadata": {{"language": "string"}}, "order": 3}},
    {{"type": "video", "content": {{"searchQuery": "string", "title": "string", "description": "string"}}, "order": 4}},
    {{"type": "quiz", "content": {{"question": "string", "options": ["string"], "correctAnswer": 0, "explanation": "string"}}, "order": 5}}
  ]
}}"#
    );

    prompt
}
