//! Coursegen Orchestrator
//!
//! Generates courses with a language model, stores them, tracks learner
//! progress and serves it all over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod generation;
pub mod prompts;
pub mod store;
pub mod tracker;

pub use api::{
    create_router, ApiResponse, AppState, CallerId, DeletedResponse, ErrorBody, HealthResponse,
    VideoSearchQuery, USER_ID_HEADER,
};
pub use config::{
    Config, GenerationSettings, ServerConfig, StoreConfig, GEMINI_API_KEY_ENV, YOUTUBE_API_KEY_ENV,
};
pub use error::{CourseGenError, Result};
pub use generation::{CourseDetail, CourseGenerator, CourseRequest, MarkdownExport};
pub use store::{CourseStore, MemoryStore, StoreStats, SNAPSHOT_VERSION};
pub use tracker::{CompleteLessonRequest, CompletionOutcome, ProgressTracker};
