//! Per-user progress records and completion rollups.
//!
//! A [`Progress`] record tracks one user's way through one course. Entries
//! are only ever added: a lesson moves from not started to completed and
//! never back. Module and course completion are derived from the live
//! lesson lists, so ids of lessons that have since been deleted are kept
//! but never counted.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A lesson the user finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedLesson {
    /// The completed lesson.
    pub lesson_id: Uuid,
    /// First completion time.
    pub completed_at: DateTime<Utc>,
    /// Seconds spent, summed over repeated completions.
    pub time_spent: u64,
}

/// A module whose lessons are all completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedModule {
    /// The completed module.
    pub module_id: Uuid,
    /// When the last of its lessons was completed.
    pub completed_at: DateTime<Utc>,
}

/// The user's cursor within a course, as 0-based order indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Module order index.
    pub module_index: u32,
    /// Lesson order index within the module.
    pub lesson_index: u32,
}

/// One user's progress through one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Record id.
    pub id: Uuid,
    /// Owner.
    pub user_id: String,
    /// Course being tracked.
    pub course_id: Uuid,
    /// Completed lessons, in completion order.
    #[serde(default)]
    pub completed_lessons: Vec<CompletedLesson>,
    /// Completed modules, in completion order.
    #[serde(default)]
    pub completed_modules: Vec<CompletedModule>,
    /// Where the user currently is.
    #[serde(default)]
    pub current_position: Position,
    /// Set once the percentage first reaches 100.
    #[serde(default)]
    pub course_completed: bool,
    /// When the course was first completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Recomputed after every completion, 0 to 100.
    #[serde(default)]
    pub progress_percentage: u8,
    /// Seconds, summed over all completions.
    #[serde(default)]
    pub total_time_spent: u64,
    /// When the record was created.
    pub started_at: DateTime<Utc>,
    /// Last completion or position update.
    pub last_accessed_at: DateTime<Utc>,
}

/// Outcome of [`Progress::record_lesson`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonCompletion {
    /// `false` when the lesson had been completed before.
    pub first_completion: bool,
    /// Accumulated seconds for this lesson after the update.
    pub lesson_time_spent: u64,
}

/// Outcome of [`Progress::evaluate_module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRollup {
    /// The evaluated module.
    pub module_id: Uuid,
    /// All of the module's lessons are completed.
    pub is_completed: bool,
    /// Completion was recorded by this evaluation.
    pub newly_completed: bool,
}

/// Outcome of [`Progress::recompute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRollup {
    /// Live lessons in the course.
    pub total_lessons: usize,
    /// Live lessons the user has completed.
    pub completed_lessons: usize,
    /// Rounded percentage.
    pub progress_percentage: u8,
    /// Course completion flag after the recompute.
    pub course_completed: bool,
    /// The course was completed by this recompute.
    pub newly_completed: bool,
}

/// Percentage of `completed` out of `total`, rounded half up.
///
/// Returns 0 for a course without lessons. `completed` above `total` is
/// treated as `total`.
///
/// ```
/// use coursegen_content::progress_percentage;
///
/// assert_eq!(progress_percentage(3, 1), 33);
/// assert_eq!(progress_percentage(8, 1), 13);
/// assert_eq!(progress_percentage(0, 0), 0);
/// ```
#[must_use]
pub fn progress_percentage(total: usize, completed: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    let rounded = (completed * 200 + total) / (total * 2);
    u8::try_from(rounded).unwrap_or(100)
}

impl Progress {
    /// Creates an empty record for `user_id` on `course_id`.
    #[must_use]
    pub fn new(user_id: impl Into<String>, course_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            course_id,
            completed_lessons: Vec::new(),
            completed_modules: Vec::new(),
            current_position: Position::default(),
            course_completed: false,
            completed_at: None,
            progress_percentage: 0,
            total_time_spent: 0,
            started_at: now,
            last_accessed_at: now,
        }
    }

    /// Returns `true` if the lesson has a completion entry.
    #[must_use]
    pub fn is_lesson_completed(&self, lesson_id: Uuid) -> bool {
        self.completed_lessons
            .iter()
            .any(|entry| entry.lesson_id == lesson_id)
    }

    /// Returns `true` if the module has a completion entry.
    #[must_use]
    pub fn is_module_completed(&self, module_id: Uuid) -> bool {
        self.completed_modules
            .iter()
            .any(|entry| entry.module_id == module_id)
    }

    /// Ids of all completed lessons, live or not.
    #[must_use]
    pub fn completed_lesson_ids(&self) -> HashSet<Uuid> {
        self.completed_lessons
            .iter()
            .map(|entry| entry.lesson_id)
            .collect()
    }

    /// Records a completion of `lesson_id`.
    ///
    /// Repeated completions add `time_spent` to the existing entry instead of
    /// creating a new one.
    pub fn record_lesson(
        &mut self,
        lesson_id: Uuid,
        time_spent: u64,
        now: DateTime<Utc>,
    ) -> LessonCompletion {
        self.total_time_spent = self.total_time_spent.saturating_add(time_spent);
        self.last_accessed_at = now;

        if let Some(entry) = self
            .completed_lessons
            .iter_mut()
            .find(|entry| entry.lesson_id == lesson_id)
        {
            entry.time_spent = entry.time_spent.saturating_add(time_spent);
            return LessonCompletion {
                first_completion: false,
                lesson_time_spent: entry.time_spent,
            };
        }

        self.completed_lessons.push(CompletedLesson {
            lesson_id,
            completed_at: now,
            time_spent,
        });
        LessonCompletion {
            first_completion: true,
            lesson_time_spent: time_spent,
        }
    }

    /// Re-derives completion of a module from its live lesson list.
    ///
    /// A module without lessons is never complete. The completion entry is
    /// added at most once.
    pub fn evaluate_module(
        &mut self,
        module_id: Uuid,
        lesson_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> ModuleRollup {
        let already = self.is_module_completed(module_id);
        let completed = self.completed_lesson_ids();
        let all_done = !lesson_ids.is_empty() && lesson_ids.iter().all(|id| completed.contains(id));

        let newly_completed = all_done && !already;
        if newly_completed {
            self.completed_modules.push(CompletedModule {
                module_id,
                completed_at: now,
            });
        }

        ModuleRollup {
            module_id,
            is_completed: already || all_done,
            newly_completed,
        }
    }

    /// Recomputes the percentage from scratch against the live lessons.
    ///
    /// Flips `course_completed` the first time the percentage reaches 100;
    /// the completion timestamp is never overwritten afterwards.
    pub fn recompute(&mut self, live_lesson_ids: &[Uuid], now: DateTime<Utc>) -> CourseRollup {
        let live: HashSet<Uuid> = live_lesson_ids.iter().copied().collect();
        let completed = self
            .completed_lesson_ids()
            .intersection(&live)
            .count();

        self.progress_percentage = progress_percentage(live.len(), completed);

        let newly_completed = self.progress_percentage == 100 && !self.course_completed;
        if newly_completed {
            self.course_completed = true;
            self.completed_at.get_or_insert(now);
        }

        CourseRollup {
            total_lessons: live.len(),
            completed_lessons: completed,
            progress_percentage: self.progress_percentage,
            course_completed: self.course_completed,
            newly_completed,
        }
    }

    /// Moves the cursor and touches the access time.
    pub fn set_position(&mut self, position: Position, now: DateTime<Utc>) {
        self.current_position = position;
        self.last_accessed_at = now;
    }
}
