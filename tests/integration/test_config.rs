//! Integration tests for configuration loading and store persistence.

use std::path::PathBuf;
use std::sync::Arc;

use coursegen_content::Difficulty;
use coursegen_gateway::ScriptedGenerator;
use coursegen_orchestrator::{
    Config, CourseGenerator, CourseRequest, CourseStore, MemoryStore, GEMINI_API_KEY_ENV,
};

/// Path to the fixtures directory.
fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn outline_reply() -> String {
    serde_json::json!({
        "title": "Async Rust",
        "modules": [
            {"title": "Futures", "lessons": [{"title": "Polling"}, {"title": "Wakers"}]},
            {"title": "Runtimes", "lessons": [{"title": "Tokio"}]}
        ]
    })
    .to_string()
}

/// Tests that the sample config loads and keeps defaults for unset fields.
#[test]
fn test_sample_config_loads() {
    let config_path = fixture_path().join("coursegen.json");
    assert!(
        config_path.exists(),
        "Config fixture not found at: {config_path:?}"
    );

    let config = Config::load_from_file(&config_path).expect("Failed to load config");

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.gemini.model, "gemini-1.5-pro");
    assert_eq!(config.gemini.max_attempts, 5);
    assert_eq!(config.generation.generation_attempts, 3);
    assert_eq!(config.generation.default_difficulty, Difficulty::Intermediate);
    assert_eq!(config.generation.min_modules, 4);
    assert_eq!(config.generation.max_modules, 6);
    assert_eq!(config.video_search.cache_ttl_secs, 600);
    assert_eq!(config.video_search.cache_capacity, 100);
    assert_eq!(
        config.store.snapshot_path.as_deref(),
        Some("data/coursegen.json")
    );
    assert!(!config.gemini.has_api_key());
}

/// Tests that a directory without a config file yields defaults.
#[test]
fn test_missing_config_uses_defaults() {
    let dir = std::env::temp_dir().join(format!("coursegen-empty-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");

    let config = Config::load_from_dir(&dir).expect("Failed to load defaults");
    assert_eq!(config, Config::default());

    std::fs::remove_dir_all(&dir).ok();
}

/// Tests that environment keys fill in credentials.
#[test]
fn test_api_keys_from_lookup() {
    let mut config = Config::load_from_file(&fixture_path().join("coursegen.json"))
        .expect("Failed to load config");
    config.apply_overrides_from(|name| (name == GEMINI_API_KEY_ENV).then(|| "secret".to_string()));

    assert!(config.gemini.has_api_key());
    assert!(!config.video_search.has_api_key());
}

/// Tests that generated courses survive a restart through the snapshot file.
#[tokio::test]
async fn test_snapshot_survives_restart() {
    let path = std::env::temp_dir()
        .join(format!("coursegen-it-{}", uuid::Uuid::new_v4()))
        .join("store.json");

    let course_id = {
        let store = Arc::new(MemoryStore::open(&path).await.expect("Failed to open store"));
        let generator = CourseGenerator::new(
            Arc::new(ScriptedGenerator::new().with_reply(outline_reply())),
            store.clone(),
            Config::default().generation,
        );
        let tree = generator
            .generate_course("alice", &CourseRequest::new("Async Rust"))
            .await
            .expect("Failed to generate course");
        store.save_snapshot().await.expect("Failed to save snapshot");
        tree.course.id
    };

    let reopened = MemoryStore::open(&path).await.expect("Failed to reopen store");
    let tree = reopened
        .course_tree(course_id)
        .await
        .expect("Store read failed")
        .expect("Course missing after restart");
    assert_eq!(tree.course.title, "Async Rust");
    assert_eq!(tree.modules.len(), 2);
    assert_eq!(tree.lessons.len(), 3);

    if let Some(dir) = path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}
