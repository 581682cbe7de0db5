//! Course, module and lesson documents.
//!
//! The three form a strict tree: a [`Course`] lists its [`Module`] ids in
//! order, each module lists its [`Lesson`] ids in order, and every child
//! points back at exactly one parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::{is_strictly_ordered, sort_blocks, ContentBlock};
use crate::normalize::GeneratedLesson;

// ============================================================================
// Difficulty
// ============================================================================

/// Target audience level of a course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Difficulty {
    /// No prior knowledge assumed (default).
    #[default]
    Beginner,
    /// Comfortable with the basics.
    Intermediate,
    /// Experienced practitioners.
    Advanced,
}

impl Difficulty {
    /// Parses a string into a `Difficulty`, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }

    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid difficulty '{s}': expected one of 'beginner', 'intermediate', 'advanced'"
            ))
        })
    }
}

impl Serialize for Difficulty {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Course
// ============================================================================

/// A generated course owned by its creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// Unique identifier.
    pub id: Uuid,
    /// Course title.
    pub title: String,
    /// Short description.
    pub description: String,
    /// Free-form topic tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Audience level.
    pub difficulty: Difficulty,
    /// Human-readable duration such as "4 weeks".
    pub estimated_duration: String,
    /// Module ids in course order.
    pub modules: Vec<Uuid>,
    /// Identifier of the owning user.
    pub creator: String,
    /// True once any lesson has generated content.
    pub is_enriched: bool,
    /// When the course was generated.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Returns `true` if `user` owns this course.
    #[must_use]
    pub fn is_owned_by(&self, user: &str) -> bool {
        self.creator == user
    }
}

// ============================================================================
// Module
// ============================================================================

/// A module groups lessons within a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Unique identifier.
    pub id: Uuid,
    /// Parent course.
    pub course_id: Uuid,
    /// Module title.
    pub title: String,
    /// Short description.
    pub description: String,
    /// Position within the course, unique per course.
    pub order: u32,
    /// Lesson ids in module order.
    pub lessons: Vec<Uuid>,
    /// True once the module has lessons.
    pub is_enriched: bool,
}

// ============================================================================
// Lesson
// ============================================================================

/// A lesson with its ordered content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    /// Unique identifier.
    pub id: Uuid,
    /// Parent module.
    pub module_id: Uuid,
    /// Owning course, denormalized for lookups.
    pub course_id: Uuid,
    /// Lesson title.
    pub title: String,
    /// Short description.
    pub description: String,
    /// Position within the module, unique per module.
    pub order: u32,
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
    /// Learning objectives.
    #[serde(default)]
    pub objectives: Vec<String>,
    /// Human-readable duration such as "30 minutes".
    pub estimated_duration: String,
    /// False while the lesson still holds its placeholder stub.
    pub is_enriched: bool,
    /// Number of successful generations applied; 0 for a stub.
    #[serde(default)]
    pub enrichment_level: u32,
    /// When content was last generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

impl Lesson {
    /// Creates an unenriched lesson whose content is a single paragraph
    /// holding the description.
    #[must_use]
    pub fn stub(
        module_id: Uuid,
        course_id: Uuid,
        order: u32,
        title: impl Into<String>,
        description: impl Into<String>,
        estimated_duration: impl Into<String>,
    ) -> Self {
        let description = description.into();
        Self {
            id: Uuid::new_v4(),
            module_id,
            course_id,
            title: title.into(),
            content: vec![ContentBlock::paragraph(0, description.clone())],
            description,
            order,
            objectives: Vec::new(),
            estimated_duration: estimated_duration.into(),
            is_enriched: false,
            enrichment_level: 0,
            generated_at: None,
        }
    }

    /// Replaces the content with a freshly generated lesson.
    ///
    /// Title and order are kept; description and duration are only taken
    /// from the generated lesson when it provides them.
    pub fn apply_generated(&mut self, generated: GeneratedLesson, now: DateTime<Utc>) {
        self.content = generated.blocks;
        sort_blocks(&mut self.content);
        self.objectives = generated.objectives;
        if let Some(description) = generated.description.filter(|d| !d.trim().is_empty()) {
            self.description = description;
        }
        if let Some(duration) = generated
            .estimated_duration
            .filter(|d| !d.trim().is_empty())
        {
            self.estimated_duration = duration;
        }
        self.is_enriched = true;
        self.enrichment_level = self.enrichment_level.saturating_add(1);
        self.generated_at = Some(now);
    }

    /// Returns the content sorted by `order`.
    #[must_use]
    pub fn sorted_content(&self) -> Vec<ContentBlock> {
        let mut blocks = self.content.clone();
        sort_blocks(&mut blocks);
        blocks
    }

    /// Returns the lesson with its content sorted in place.
    #[must_use]
    pub fn into_sorted(mut self) -> Self {
        sort_blocks(&mut self.content);
        self
    }
}

// ============================================================================
// CourseTree
// ============================================================================

/// A course together with all of its modules and lessons.
///
/// This is the unit written when a course is generated and the unit read
/// when a course is exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseTree {
    /// The course document.
    pub course: Course,
    /// Modules in course order.
    pub modules: Vec<Module>,
    /// Every lesson of every module.
    pub lessons: Vec<Lesson>,
}

impl CourseTree {
    /// Returns the lessons of `module_id`, sorted by order.
    #[must_use]
    pub fn lessons_of(&self, module_id: Uuid) -> Vec<&Lesson> {
        let mut lessons: Vec<&Lesson> = self
            .lessons
            .iter()
            .filter(|lesson| lesson.module_id == module_id)
            .collect();
        lessons.sort_by_key(|lesson| lesson.order);
        lessons
    }

    /// Returns the modules sorted by order.
    #[must_use]
    pub fn ordered_modules(&self) -> Vec<&Module> {
        let mut modules: Vec<&Module> = self.modules.iter().collect();
        modules.sort_by_key(|module| module.order);
        modules
    }

    /// Checks the parent/child links and order uniqueness of the tree,
    /// including block orders within each lesson.
    ///
    /// Returns a description of the first violation found.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        let mut module_orders = std::collections::HashSet::new();
        for module in &self.modules {
            if module.course_id != self.course.id {
                return Err(format!("module {} belongs to another course", module.id));
            }
            if !module_orders.insert(module.order) {
                return Err(format!("duplicate module order {}", module.order));
            }
            if !self.course.modules.contains(&module.id) {
                return Err(format!("module {} not listed by the course", module.id));
            }
        }

        let mut lesson_orders = std::collections::HashSet::new();
        for lesson in &self.lessons {
            let Some(module) = self.modules.iter().find(|m| m.id == lesson.module_id) else {
                return Err(format!("lesson {} has no parent module", lesson.id));
            };
            if !module.lessons.contains(&lesson.id) {
                return Err(format!("lesson {} not listed by its module", lesson.id));
            }
            if !lesson_orders.insert((lesson.module_id, lesson.order)) {
                return Err(format!(
                    "duplicate lesson order {} in module {}",
                    lesson.order, lesson.module_id
                ));
            }
            if !is_strictly_ordered(&lesson.sorted_content()) {
                return Err(format!("lesson {} has duplicate block orders", lesson.id));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Read Models
// ============================================================================

/// Course listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    /// Course id.
    pub id: Uuid,
    /// Course title.
    pub title: String,
    /// Short description.
    pub description: String,
    /// Audience level.
    pub difficulty: Difficulty,
    /// Number of modules.
    pub module_count: usize,
    /// When the course was generated.
    pub created_at: DateTime<Utc>,
}

impl From<&Course> for CourseSummary {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id,
            title: course.title.clone(),
            description: course.description.clone(),
            difficulty: course.difficulty,
            module_count: course.modules.len(),
            created_at: course.created_at,
        }
    }
}

/// Lesson entry inside a course detail view, without block content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    /// Lesson id.
    pub id: Uuid,
    /// Lesson title.
    pub title: String,
    /// Short description.
    pub description: String,
    /// Position within the module.
    pub order: u32,
    /// Human-readable duration.
    pub estimated_duration: String,
    /// Whether content has been generated.
    pub is_enriched: bool,
}

impl From<&Lesson> for LessonSummary {
    fn from(lesson: &Lesson) -> Self {
        Self {
            id: lesson.id,
            title: lesson.title.clone(),
            description: lesson.description.clone(),
            order: lesson.order,
            estimated_duration: lesson.estimated_duration.clone(),
            is_enriched: lesson.is_enriched,
        }
    }
}

/// Module with its lesson summaries, used by the course detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDetail {
    /// The module document.
    #[serde(flatten)]
    pub module: Module,
    /// Lessons in order.
    pub lesson_summaries: Vec<LessonSummary>,
}

impl CourseTree {
    /// Builds the module detail list for this tree.
    #[must_use]
    pub fn module_details(&self) -> Vec<ModuleDetail> {
        self.ordered_modules()
            .into_iter()
            .map(|module| ModuleDetail {
                module: module.clone(),
                lesson_summaries: self
                    .lessons_of(module.id)
                    .into_iter()
                    .map(LessonSummary::from)
                    .collect(),
            })
            .collect()
    }
}
