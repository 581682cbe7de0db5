//! Document persistence.
//!
//! [`CourseStore`] is the persistence seam used by the orchestrator and the
//! progress service. [`MemoryStore`] keeps every collection behind one
//! `tokio::sync::RwLock`, so a course tree is written in a single critical
//! section and readers never observe half of one. It can be seeded from and
//! written back to a JSON snapshot file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursegen_content::{Course, CourseTree, Lesson, Module, Progress};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CourseGenError, Result};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Document counts, for health reporting and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Stored courses.
    pub courses: usize,
    /// Stored modules.
    pub modules: usize,
    /// Stored lessons.
    pub lessons: usize,
    /// Stored progress records.
    pub progress: usize,
}

/// Persistence operations needed by the service.
#[async_trait]
pub trait CourseStore: Send + Sync {
    /// Writes a whole course tree at once. Either all documents become
    /// visible or none do.
    async fn insert_course_tree(&self, tree: CourseTree) -> Result<()>;

    /// Looks up a course by id.
    async fn get_course(&self, id: Uuid) -> Result<Option<Course>>;

    /// Courses created by `creator`, newest first.
    async fn list_courses(&self, creator: &str) -> Result<Vec<Course>>;

    /// A course with all of its modules and lessons.
    async fn course_tree(&self, id: Uuid) -> Result<Option<CourseTree>>;

    /// Deletes a course with its modules and lessons. Progress records are
    /// left alone. Returns `false` if the course did not exist.
    async fn delete_course(&self, id: Uuid) -> Result<bool>;

    /// Looks up a module by id.
    async fn get_module(&self, id: Uuid) -> Result<Option<Module>>;

    /// Looks up a lesson by id.
    async fn get_lesson(&self, id: Uuid) -> Result<Option<Lesson>>;

    /// Finds the lesson at the given 0-based module and lesson order.
    async fn find_lesson_at(
        &self,
        course_id: Uuid,
        module_index: u32,
        lesson_index: u32,
    ) -> Result<Option<Lesson>>;

    /// Replaces a lesson with generated content and marks its module and
    /// course enriched.
    async fn save_enriched_lesson(&self, lesson: Lesson) -> Result<()>;

    /// Returns the progress record for (user, course), creating it if needed.
    async fn get_or_create_progress(
        &self,
        user_id: &str,
        course_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Progress>;

    /// Replaces a progress record.
    async fn save_progress(&self, progress: Progress) -> Result<()>;

    /// Document counts.
    async fn stats(&self) -> Result<StoreStats>;
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Debug, Default)]
struct Collections {
    courses: HashMap<Uuid, Course>,
    modules: HashMap<Uuid, Module>,
    lessons: HashMap<Uuid, Lesson>,
    progress: Vec<Progress>,
}

/// On-disk form of the store.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    version: u32,
    #[serde(default)]
    courses: Vec<Course>,
    #[serde(default)]
    modules: Vec<Module>,
    #[serde(default)]
    lessons: Vec<Lesson>,
    #[serde(default)]
    progress: Vec<Progress>,
}

impl From<Snapshot> for Collections {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            courses: snapshot.courses.into_iter().map(|c| (c.id, c)).collect(),
            modules: snapshot.modules.into_iter().map(|m| (m.id, m)).collect(),
            lessons: snapshot.lessons.into_iter().map(|l| (l.id, l)).collect(),
            progress: snapshot.progress,
        }
    }
}

/// In-memory [`CourseStore`] with an optional JSON snapshot file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Collections>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Creates an empty store without a snapshot file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store backed by `path`, loading it if it exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let collections = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let snapshot: Snapshot = serde_json::from_str(&contents)
                    .map_err(|e| CourseGenError::snapshot(&path, e.to_string()))?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(CourseGenError::snapshot(
                        &path,
                        format!(
                            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                            snapshot.version
                        ),
                    ));
                }
                let collections = Collections::from(snapshot);
                info!(
                    path = %path.display(),
                    courses = collections.courses.len(),
                    "Loaded store snapshot"
                );
                collections
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No store snapshot yet");
                Collections::default()
            }
            Err(e) => return Err(CourseGenError::snapshot(&path, e.to_string())),
        };

        Ok(Self {
            data: RwLock::new(collections),
            snapshot_path: Some(path),
        })
    }

    /// The snapshot file, if any.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Writes the snapshot file. Does nothing without a snapshot path.
    ///
    /// Writes to a temporary sibling first and renames it into place.
    pub async fn save_snapshot(&self) -> Result<()> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Ok(());
        };

        let json = {
            let data = self.data.read().await;
            let snapshot = Snapshot {
                version: SNAPSHOT_VERSION,
                courses: data.courses.values().cloned().collect(),
                modules: data.modules.values().cloned().collect(),
                lessons: data.lessons.values().cloned().collect(),
                progress: data.progress.clone(),
            };
            serde_json::to_string_pretty(&snapshot)?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CourseGenError::snapshot(path, e.to_string()))?;
        }

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| CourseGenError::snapshot(&temp_path, e.to_string()))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| CourseGenError::snapshot(path, e.to_string()))?;

        info!(path = %path.display(), "Saved store snapshot");
        Ok(())
    }
}

fn sorted_lessons<'a>(data: &'a Collections, module_id: Uuid) -> Vec<&'a Lesson> {
    let mut lessons: Vec<&Lesson> = data
        .lessons
        .values()
        .filter(|lesson| lesson.module_id == module_id)
        .collect();
    lessons.sort_by_key(|lesson| lesson.order);
    lessons
}

#[async_trait]
impl CourseStore for MemoryStore {
    async fn insert_course_tree(&self, tree: CourseTree) -> Result<()> {
        tree.check_consistency()
            .map_err(|e| CourseGenError::generation(format!("inconsistent course tree: {e}")))?;

        let mut data = self.data.write().await;
        if data.courses.contains_key(&tree.course.id) {
            return Err(CourseGenError::generation(format!(
                "course {} already exists",
                tree.course.id
            )));
        }

        let CourseTree {
            course,
            modules,
            lessons,
        } = tree;
        data.modules.extend(modules.into_iter().map(|m| (m.id, m)));
        data.lessons.extend(lessons.into_iter().map(|l| (l.id, l)));
        data.courses.insert(course.id, course);
        Ok(())
    }

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>> {
        Ok(self.data.read().await.courses.get(&id).cloned())
    }

    async fn list_courses(&self, creator: &str) -> Result<Vec<Course>> {
        let data = self.data.read().await;
        let mut courses: Vec<Course> = data
            .courses
            .values()
            .filter(|course| course.is_owned_by(creator))
            .cloned()
            .collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses)
    }

    async fn course_tree(&self, id: Uuid) -> Result<Option<CourseTree>> {
        let data = self.data.read().await;
        let Some(course) = data.courses.get(&id).cloned() else {
            return Ok(None);
        };

        let mut modules: Vec<Module> = data
            .modules
            .values()
            .filter(|module| module.course_id == id)
            .cloned()
            .collect();
        modules.sort_by_key(|module| module.order);

        let lessons = modules
            .iter()
            .flat_map(|module| sorted_lessons(&data, module.id))
            .cloned()
            .collect();

        Ok(Some(CourseTree {
            course,
            modules,
            lessons,
        }))
    }

    async fn delete_course(&self, id: Uuid) -> Result<bool> {
        let mut data = self.data.write().await;
        if data.courses.remove(&id).is_none() {
            return Ok(false);
        }
        data.modules.retain(|_, module| module.course_id != id);
        data.lessons.retain(|_, lesson| lesson.course_id != id);
        Ok(true)
    }

    async fn get_module(&self, id: Uuid) -> Result<Option<Module>> {
        Ok(self.data.read().await.modules.get(&id).cloned())
    }

    async fn get_lesson(&self, id: Uuid) -> Result<Option<Lesson>> {
        Ok(self.data.read().await.lessons.get(&id).cloned())
    }

    async fn find_lesson_at(
        &self,
        course_id: Uuid,
        module_index: u32,
        lesson_index: u32,
    ) -> Result<Option<Lesson>> {
        let data = self.data.read().await;
        let Some(module) = data
            .modules
            .values()
            .find(|module| module.course_id == course_id && module.order == module_index)
        else {
            return Ok(None);
        };

        Ok(data
            .lessons
            .values()
            .find(|lesson| lesson.module_id == module.id && lesson.order == lesson_index)
            .cloned())
    }

    async fn save_enriched_lesson(&self, lesson: Lesson) -> Result<()> {
        let mut data = self.data.write().await;
        if !data.lessons.contains_key(&lesson.id) {
            return Err(CourseGenError::not_found("lesson", lesson.id));
        }

        let touched_at = lesson.generated_at.unwrap_or_else(Utc::now);
        if let Some(module) = data.modules.get_mut(&lesson.module_id) {
            module.is_enriched = true;
        }
        if let Some(course) = data.courses.get_mut(&lesson.course_id) {
            course.is_enriched = true;
            course.updated_at = touched_at;
        }
        data.lessons.insert(lesson.id, lesson);
        Ok(())
    }

    async fn get_or_create_progress(
        &self,
        user_id: &str,
        course_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Progress> {
        let mut data = self.data.write().await;
        if let Some(existing) = data
            .progress
            .iter()
            .find(|p| p.user_id == user_id && p.course_id == course_id)
        {
            return Ok(existing.clone());
        }

        let progress = Progress::new(user_id, course_id, now);
        data.progress.push(progress.clone());
        debug!(user_id, course_id = %course_id, "Created progress record");
        Ok(progress)
    }

    async fn save_progress(&self, progress: Progress) -> Result<()> {
        let mut data = self.data.write().await;
        match data
            .progress
            .iter_mut()
            .find(|p| p.user_id == progress.user_id && p.course_id == progress.course_id)
        {
            Some(existing) => *existing = progress,
            None => data.progress.push(progress),
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let data = self.data.read().await;
        Ok(StoreStats {
            courses: data.courses.len(),
            modules: data.modules.len(),
            lessons: data.lessons.len(),
            progress: data.progress.len(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use coursegen_content::normalize::{parse_course_outline, GeneratedLesson, OutlineContext};
    use coursegen_content::{ContentBlock, Difficulty};
    use serde_json::json;
    use tokio_test::assert_ok;

    use super::*;

    fn tree(creator: &str) -> CourseTree {
        let outline = parse_course_outline(&json!({
            "title": "Rust Basics",
            "modules": [
                {"title": "M1", "lessons": [{"title": "L1"}, {"title": "L2"}]},
                {"title": "M2", "lessons": [{"title": "L3"}]}
            ]
        }))
        .unwrap();
        let ctx = OutlineContext {
            creator,
            topic: "Rust",
            difficulty: Difficulty::Beginner,
            duration: "2 weeks",
        };
        outline.into_tree(&ctx, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_read_tree() {
        let store = MemoryStore::new();
        let tree = tree("alice");
        let course_id = tree.course.id;
        assert_ok!(store.insert_course_tree(tree.clone()).await);

        let loaded = store.course_tree(course_id).await.unwrap().unwrap();
        assert_eq!(loaded.modules.len(), 2);
        assert_eq!(loaded.lessons.len(), 3);
        assert_eq!(loaded.lessons[0].title, "L1");
        assert_eq!(loaded.lessons[2].title, "L3");

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.courses, 1);
        assert_eq!(stats.lessons, 3);
    }

    #[tokio::test]
    async fn test_inconsistent_tree_writes_nothing() {
        let store = MemoryStore::new();
        let mut tree = tree("alice");
        tree.lessons[0].module_id = Uuid::new_v4();

        assert!(store.insert_course_tree(tree).await.is_err());
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());
    }

    #[tokio::test]
    async fn test_list_courses_is_owner_scoped() {
        let store = MemoryStore::new();
        store.insert_course_tree(tree("alice")).await.unwrap();
        store.insert_course_tree(tree("bob")).await.unwrap();

        let courses = store.list_courses("alice").await.unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].creator, "alice");
    }

    #[tokio::test]
    async fn test_delete_cascades_but_keeps_progress() {
        let store = MemoryStore::new();
        let tree = tree("alice");
        let course_id = tree.course.id;
        store.insert_course_tree(tree).await.unwrap();
        store
            .get_or_create_progress("alice", course_id, Utc::now())
            .await
            .unwrap();

        assert!(store.delete_course(course_id).await.unwrap());
        assert!(!store.delete_course(course_id).await.unwrap());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.courses, 0);
        assert_eq!(stats.modules, 0);
        assert_eq!(stats.lessons, 0);
        assert_eq!(stats.progress, 1);
    }

    #[tokio::test]
    async fn test_find_lesson_at_uses_order_indices() {
        let store = MemoryStore::new();
        let tree = tree("alice");
        let course_id = tree.course.id;
        store.insert_course_tree(tree).await.unwrap();

        let lesson = store.find_lesson_at(course_id, 0, 1).await.unwrap().unwrap();
        assert_eq!(lesson.title, "L2");
        assert!(store.find_lesson_at(course_id, 1, 1).await.unwrap().is_none());
        assert!(store.find_lesson_at(course_id, 5, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_enriched_lesson_marks_parents() {
        let store = MemoryStore::new();
        let tree = tree("alice");
        let course_id = tree.course.id;
        let mut lesson = tree.lessons[0].clone();
        store.insert_course_tree(tree).await.unwrap();

        lesson.apply_generated(
            GeneratedLesson {
                title: None,
                description: None,
                objectives: vec![],
                estimated_duration: None,
                blocks: vec![ContentBlock::paragraph(0, "Generated")],
            },
            Utc::now(),
        );
        store.save_enriched_lesson(lesson.clone()).await.unwrap();

        let stored = store.get_lesson(lesson.id).await.unwrap().unwrap();
        assert!(stored.is_enriched);
        assert_eq!(stored.enrichment_level, 1);
        assert!(store.get_course(course_id).await.unwrap().unwrap().is_enriched);
    }

    #[tokio::test]
    async fn test_save_enriched_lesson_for_deleted_course_fails() {
        let store = MemoryStore::new();
        let tree = tree("alice");
        let course_id = tree.course.id;
        let lesson = tree.lessons[0].clone();
        store.insert_course_tree(tree).await.unwrap();
        store.delete_course(course_id).await.unwrap();

        let err = store.save_enriched_lesson(lesson).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_progress_is_unique_per_user_and_course() {
        let store = MemoryStore::new();
        let course_id = Uuid::new_v4();
        let first = store
            .get_or_create_progress("alice", course_id, Utc::now())
            .await
            .unwrap();
        let second = store
            .get_or_create_progress("alice", course_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let mut updated = second;
        updated.progress_percentage = 50;
        store.save_progress(updated).await.unwrap();
        let reloaded = store
            .get_or_create_progress("alice", course_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(reloaded.progress_percentage, 50);
        assert_eq!(store.stats().await.unwrap().progress, 1);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let path = std::env::temp_dir().join(format!("coursegen-store-{}.json", Uuid::new_v4()));
        let tree = tree("alice");
        let course_id = tree.course.id;

        let store = MemoryStore::open(&path).await.unwrap();
        store.insert_course_tree(tree).await.unwrap();
        store.save_snapshot().await.unwrap();

        let reopened = MemoryStore::open(&path).await.unwrap();
        let loaded = reopened.course_tree(course_id).await.unwrap().unwrap();
        assert_eq!(loaded.lessons.len(), 3);
        assert_eq!(reopened.snapshot_path(), Some(path.as_path()));

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let path = std::env::temp_dir().join(format!("coursegen-store-{}.json", Uuid::new_v4()));
        std::fs::write(&path, "{ not json").unwrap();

        let err = MemoryStore::open(&path).await.unwrap_err();
        assert!(matches!(err, CourseGenError::Snapshot { .. }));

        std::fs::remove_file(&path).ok();
    }
}
