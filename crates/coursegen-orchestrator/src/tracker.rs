//! Progress tracking service.
//!
//! Wraps the pure rollups of [`coursegen_content::progress`] with ownership
//! checks and persistence. Read-modify-write cycles on progress records are
//! serialized so two completions for the same user never lose an entry.

use std::sync::Arc;

use chrono::Utc;
use coursegen_content::{CourseRollup, CourseTree, ModuleRollup, Position, Progress};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::{CourseGenError, Result};
use crate::store::CourseStore;

/// Body of a lesson completion request.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteLessonRequest {
    /// Seconds spent on the lesson in this session.
    #[serde(default)]
    pub time_spent: u64,
}

/// Result of completing a lesson.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    /// The updated progress record.
    pub progress: Progress,
    /// `false` when the lesson had been completed before.
    pub first_completion: bool,
    /// Rollup of the lesson's module.
    pub module: ModuleRollup,
    /// Rollup of the whole course.
    pub course: CourseRollup,
}

/// Reads and updates per-user progress.
pub struct ProgressTracker {
    store: Arc<dyn CourseStore>,
    write_lock: Mutex<()>,
}

impl ProgressTracker {
    /// Creates a tracker over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CourseStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the user's progress on a course, creating it if needed.
    pub async fn get(&self, user: &str, course_id: Uuid) -> Result<Progress> {
        self.owned_tree(user, course_id).await?;
        self.store
            .get_or_create_progress(user, course_id, Utc::now())
            .await
    }

    /// Marks a lesson completed and rolls the result up to its module and
    /// the course.
    ///
    /// Completing the same lesson again only adds `time_spent`.
    pub async fn complete_lesson(
        &self,
        user: &str,
        course_id: Uuid,
        lesson_id: Uuid,
        time_spent: u64,
    ) -> Result<CompletionOutcome> {
        let _guard = self.write_lock.lock().await;

        let tree = self.owned_tree(user, course_id).await?;
        let lesson = tree
            .lessons
            .iter()
            .find(|lesson| lesson.id == lesson_id)
            .ok_or_else(|| CourseGenError::not_found("lesson", lesson_id))?;

        let now = Utc::now();
        let mut progress = self.store.get_or_create_progress(user, course_id, now).await?;

        let completion = progress.record_lesson(lesson_id, time_spent, now);
        let module_lessons: Vec<Uuid> = tree
            .lessons_of(lesson.module_id)
            .into_iter()
            .map(|lesson| lesson.id)
            .collect();
        let module = progress.evaluate_module(lesson.module_id, &module_lessons, now);
        let live_lessons: Vec<Uuid> = tree.lessons.iter().map(|lesson| lesson.id).collect();
        let course = progress.recompute(&live_lessons, now);

        self.store.save_progress(progress.clone()).await?;

        info!(
            user,
            course_id = %course_id,
            lesson_id = %lesson_id,
            first_completion = completion.first_completion,
            percentage = course.progress_percentage,
            "Lesson completed"
        );
        if module.newly_completed {
            info!(user, module_id = %module.module_id, "Module completed");
        }
        if course.newly_completed {
            info!(user, course_id = %course_id, "Course completed");
        }

        Ok(CompletionOutcome {
            progress,
            first_completion: completion.first_completion,
            module,
            course,
        })
    }

    /// Moves the user's current position within the course.
    ///
    /// Both indices are 0-based and must point at an existing lesson.
    pub async fn set_position(
        &self,
        user: &str,
        course_id: Uuid,
        position: Position,
    ) -> Result<Progress> {
        let _guard = self.write_lock.lock().await;

        let tree = self.owned_tree(user, course_id).await?;
        validate_position(&tree, position)?;

        let now = Utc::now();
        let mut progress = self.store.get_or_create_progress(user, course_id, now).await?;
        progress.set_position(position, now);
        self.store.save_progress(progress.clone()).await?;
        Ok(progress)
    }

    async fn owned_tree(&self, user: &str, course_id: Uuid) -> Result<CourseTree> {
        let tree = self
            .store
            .course_tree(course_id)
            .await?
            .ok_or_else(|| CourseGenError::not_found("course", course_id))?;
        if !tree.course.is_owned_by(user) {
            return Err(CourseGenError::access_denied("course", course_id));
        }
        Ok(tree)
    }
}

fn validate_position(tree: &CourseTree, position: Position) -> Result<()> {
    let modules = tree.ordered_modules();
    let module = usize::try_from(position.module_index)
        .ok()
        .and_then(|index| modules.get(index))
        .ok_or_else(|| {
            CourseGenError::validation(format!(
                "moduleIndex {} is out of range (course has {} modules)",
                position.module_index,
                modules.len()
            ))
        })?;

    let lesson_count = tree.lessons_of(module.id).len();
    let in_range = usize::try_from(position.lesson_index).is_ok_and(|index| index < lesson_count);
    if !in_range {
        return Err(CourseGenError::validation(format!(
            "lessonIndex {} is out of range (module has {lesson_count} lessons)",
            position.lesson_index
        )));
    }
    Ok(())
}
