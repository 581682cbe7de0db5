//! Course and lesson generation.
//!
//! [`CourseGenerator`] drives the prompt → model → normalizer → store
//! pipeline. A course outline is turned into a full tree of stub lessons and
//! stored in one call; lesson content is generated lazily on first read or
//! explicitly on request.

use std::sync::Arc;

use chrono::Utc;
use coursegen_content::normalize::{
    extract_json, parse_course_outline, parse_lesson_payload, OutlineContext,
};
use coursegen_content::{
    ContentError, Course, CourseSummary, CourseTree, Difficulty, Lesson, MarkdownExporter,
    ModuleDetail,
};
use coursegen_gateway::TextGenerator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GenerationSettings;
use crate::error::{CourseGenError, Result};
use crate::prompts;
use crate::store::CourseStore;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of a course generation request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRequest {
    /// What the course is about.
    #[serde(default)]
    pub topic: String,
    /// `beginner`, `intermediate` or `advanced`; case-insensitive.
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Free-form intended duration such as "4 weeks".
    #[serde(default)]
    pub duration: Option<String>,
}

impl CourseRequest {
    /// Creates a request for `topic` with default difficulty and duration.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }
}

/// A course with its modules and lesson summaries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetail {
    /// The course document.
    pub course: Course,
    /// Modules in order, each with its lesson summaries.
    pub modules: Vec<ModuleDetail>,
}

impl From<&CourseTree> for CourseDetail {
    fn from(tree: &CourseTree) -> Self {
        Self {
            course: tree.course.clone(),
            modules: tree.module_details(),
        }
    }
}

/// A rendered Markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownExport {
    /// Suggested download name.
    pub file_name: String,
    /// The document.
    pub markdown: String,
}

// ============================================================================
// CourseGenerator
// ============================================================================

/// Generates, stores and serves courses.
pub struct CourseGenerator {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn CourseStore>,
    settings: GenerationSettings,
}

impl CourseGenerator {
    /// Creates a generator over the given model and store.
    #[must_use]
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn CourseStore>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            generator,
            store,
            settings,
        }
    }

    /// The generation settings in use.
    #[must_use]
    pub const fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Generates a course outline and stores the whole tree.
    ///
    /// Lessons are stored as stubs; nothing is written if any step fails.
    pub async fn generate_course(&self, creator: &str, request: &CourseRequest) -> Result<CourseTree> {
        let topic = request.topic.trim();
        if topic.is_empty() {
            return Err(CourseGenError::validation("topic is required"));
        }
        if topic.chars().count() > self.settings.max_topic_len {
            return Err(CourseGenError::validation(format!(
                "topic must be at most {} characters",
                self.settings.max_topic_len
            )));
        }

        let difficulty = match request.difficulty.as_deref().map(str::trim) {
            None | Some("") => self.settings.default_difficulty,
            Some(value) => Difficulty::from_str_case_insensitive(value).ok_or_else(|| {
                CourseGenError::validation(format!(
                    "difficulty must be one of beginner, intermediate, advanced (got '{value}')"
                ))
            })?,
        };
        let duration = request
            .duration
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(&self.settings.default_duration);

        info!(creator, topic, %difficulty, duration, "Generating course outline");

        let prompt = prompts::course_outline(topic, difficulty, duration, &self.settings);
        let outline = self
            .invoke_parsed(&prompt, self.settings.course_temperature, parse_course_outline)
            .await?;

        let ctx = OutlineContext {
            creator,
            topic,
            difficulty,
            duration,
        };
        let tree = outline.into_tree(&ctx, Utc::now())?;
        let course_id = tree.course.id;
        let module_count = tree.modules.len();
        let lesson_count = tree.lessons.len();

        self.store.insert_course_tree(tree.clone()).await?;

        info!(
            course_id = %course_id,
            modules = module_count,
            lessons = lesson_count,
            "Course generated"
        );
        Ok(tree)
    }

    /// Courses owned by `user`, newest first.
    pub async fn list_courses(&self, user: &str) -> Result<Vec<CourseSummary>> {
        let courses = self.store.list_courses(user).await?;
        Ok(courses.iter().map(CourseSummary::from).collect())
    }

    /// A course with module and lesson summaries.
    pub async fn course_detail(&self, user: &str, course_id: Uuid) -> Result<CourseDetail> {
        let tree = self.owned_tree(user, course_id).await?;
        Ok(CourseDetail::from(&tree))
    }

    /// Deletes a course with its modules and lessons.
    pub async fn delete_course(&self, user: &str, course_id: Uuid) -> Result<()> {
        self.owned_course(user, course_id).await?;
        if !self.store.delete_course(course_id).await? {
            return Err(CourseGenError::not_found("course", course_id));
        }
        info!(course_id = %course_id, "Course deleted");
        Ok(())
    }

    /// Renders a course as Markdown.
    pub async fn export_markdown(&self, user: &str, course_id: Uuid) -> Result<MarkdownExport> {
        let tree = self.owned_tree(user, course_id).await?;
        let exporter = MarkdownExporter::new(&tree);
        Ok(MarkdownExport {
            file_name: exporter.file_name(),
            markdown: exporter.generate(),
        })
    }

    /// Returns the lesson at the given 0-based module and lesson position,
    /// generating its content first if it is still a stub.
    pub async fn lesson_at(
        &self,
        user: &str,
        course_id: Uuid,
        module_index: u32,
        lesson_index: u32,
    ) -> Result<Lesson> {
        let course = self.owned_course(user, course_id).await?;
        let lesson = self
            .store
            .find_lesson_at(course_id, module_index, lesson_index)
            .await?
            .ok_or_else(|| {
                CourseGenError::not_found(
                    "lesson",
                    format!("{course_id}/module/{module_index}/lesson/{lesson_index}"),
                )
            })?;
        self.read_through(&course, lesson).await
    }

    /// Returns a lesson by id, generating its content first if it is still
    /// a stub.
    pub async fn lesson(&self, user: &str, lesson_id: Uuid) -> Result<Lesson> {
        let (course, lesson) = self.owned_lesson(user, lesson_id).await?;
        self.read_through(&course, lesson).await
    }

    /// Generates fresh content for a lesson whether or not it has some.
    pub async fn regenerate_lesson(&self, user: &str, lesson_id: Uuid) -> Result<Lesson> {
        let (course, lesson) = self.owned_lesson(user, lesson_id).await?;
        self.enrich(&course, lesson).await
    }

    async fn read_through(&self, course: &Course, lesson: Lesson) -> Result<Lesson> {
        if lesson.is_enriched {
            return Ok(lesson.into_sorted());
        }
        self.enrich(course, lesson).await
    }

    /// Generates content for `lesson` and stores it.
    ///
    /// The stored lesson is only replaced once generation succeeded.
    async fn enrich(&self, course: &Course, mut lesson: Lesson) -> Result<Lesson> {
        let module = self
            .store
            .get_module(lesson.module_id)
            .await?
            .ok_or_else(|| CourseGenError::not_found("module", lesson.module_id))?;

        info!(
            course_id = %course.id,
            lesson_id = %lesson.id,
            level = lesson.enrichment_level,
            "Generating lesson content"
        );

        let prompt = prompts::lesson_content(course, &module, &lesson, &self.settings);
        let generated = self
            .invoke_parsed(&prompt, self.settings.lesson_temperature, parse_lesson_payload)
            .await
            .map_err(|err| {
                warn!(lesson_id = %lesson.id, error = %err, "Lesson generation failed");
                err
            })?;

        let block_count = generated.blocks.len();
        lesson.apply_generated(generated, Utc::now());
        self.store.save_enriched_lesson(lesson.clone()).await?;

        info!(
            lesson_id = %lesson.id,
            blocks = block_count,
            level = lesson.enrichment_level,
            "Lesson content generated"
        );
        Ok(lesson.into_sorted())
    }

    /// Calls the model and parses its reply.
    ///
    /// Replies without usable JSON are retried up to `generationAttempts`
    /// times; model failures are returned as is since the gateway already
    /// retried them.
    async fn invoke_parsed<T>(
        &self,
        prompt: &str,
        temperature: f32,
        parse: impl Fn(&Value) -> coursegen_content::Result<T>,
    ) -> Result<T> {
        let attempts = self.settings.generation_attempts.max(1);
        let mut attempt = 1;
        loop {
            let raw = self.generator.invoke(prompt, temperature).await?;
            match extract_json(&raw).and_then(|value| parse(&value)) {
                Ok(parsed) => return Ok(parsed),
                Err(err @ ContentError::InvalidJson { .. }) if attempt < attempts => {
                    warn!(
                        model = self.generator.id(),
                        attempt,
                        max_attempts = attempts,
                        error = %err,
                        "Model reply was not usable, asking again"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------------

    /// Loads a course owned by `user`.
    pub async fn owned_course(&self, user: &str, course_id: Uuid) -> Result<Course> {
        let course = self
            .store
            .get_course(course_id)
            .await?
            .ok_or_else(|| CourseGenError::not_found("course", course_id))?;
        if !course.is_owned_by(user) {
            warn!(user, course_id = %course_id, "Course access denied");
            return Err(CourseGenError::access_denied("course", course_id));
        }
        Ok(course)
    }

    async fn owned_tree(&self, user: &str, course_id: Uuid) -> Result<CourseTree> {
        self.owned_course(user, course_id).await?;
        self.store
            .course_tree(course_id)
            .await?
            .ok_or_else(|| CourseGenError::not_found("course", course_id))
    }

    async fn owned_lesson(&self, user: &str, lesson_id: Uuid) -> Result<(Course, Lesson)> {
        let lesson = self
            .store
            .get_lesson(lesson_id)
            .await?
            .ok_or_else(|| CourseGenError::not_found("lesson", lesson_id))?;
        let course = self.owned_course(user, lesson.course_id).await?;
        Ok((course, lesson))
    }
}
