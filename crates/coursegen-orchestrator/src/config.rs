//! Configuration types for the course generation service.
//!
//! Configuration is read from `coursegen.json` (camelCase keys, every field
//! optional). Secrets are normally supplied through the environment and
//! applied with [`Config::apply_env_overrides`].

use std::path::Path;

use coursegen_content::Difficulty;
use coursegen_gateway::{GeminiConfig, YouTubeConfig};
use serde::{Deserialize, Serialize};

use crate::error::{CourseGenError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "coursegen.json";

/// Environment variable holding the generative model API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable holding the video search API key.
pub const YOUTUBE_API_KEY_ENV: &str = "YOUTUBE_API_KEY";

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_course_temperature() -> f32 {
    0.7
}

const fn default_lesson_temperature() -> f32 {
    0.8
}

const fn default_generation_attempts() -> u32 {
    2
}

fn default_duration() -> String {
    "4 weeks".to_string()
}

const fn default_min_modules() -> u32 {
    3
}

const fn default_max_modules() -> u32 {
    6
}

const fn default_min_lessons() -> u32 {
    3
}

const fn default_max_lessons() -> u32 {
    8
}

const fn default_min_blocks() -> u32 {
    15
}

const fn default_max_blocks() -> u32 {
    25
}

const fn default_min_videos() -> u32 {
    2
}

const fn default_min_questions() -> u32 {
    4
}

const fn default_max_questions() -> u32 {
    5
}

const fn default_max_topic_len() -> usize {
    200
}

/// Main configuration for the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Generative model client settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Prompt shape and retry settings.
    #[serde(default)]
    pub generation: GenerationSettings,

    /// Video search settings.
    #[serde(default)]
    pub video_search: YouTubeConfig,

    /// Persistence settings.
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `coursegen.json` in the current directory; falls back to
    /// defaults when it is absent.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            CourseGenError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `coursegen.json` in `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the default configuration. A file that exists
    /// but does not parse is an error.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(CourseGenError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| CourseGenError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Fills API keys from `GEMINI_API_KEY` and `YOUTUBE_API_KEY`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Fills API keys from `lookup`. Non-empty values win over the file.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = non_empty(GEMINI_API_KEY_ENV) {
            self.gemini.api_key = Some(key);
        }
        if let Some(key) = non_empty(YOUTUBE_API_KEY_ENV) {
            self.video_search.api_key = Some(key);
        }
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(CourseGenError::config_validation(
                "server.host must not be empty",
                "Set server.host to an address such as 127.0.0.1 in your coursegen.json",
            ));
        }

        if self.gemini.model.trim().is_empty() {
            return Err(CourseGenError::config_validation(
                "gemini.model must not be empty",
                "Set gemini.model to a model name such as gemini-1.5-flash",
            ));
        }

        if self.gemini.max_attempts == 0 {
            return Err(CourseGenError::config_validation(
                "gemini.maxAttempts must be greater than 0",
                "Set gemini.maxAttempts to at least 1 in your coursegen.json",
            ));
        }

        if self.generation.generation_attempts == 0 {
            return Err(CourseGenError::config_validation(
                "generation.generationAttempts must be greater than 0",
                "Set generation.generationAttempts to at least 1 in your coursegen.json",
            ));
        }

        for (name, value) in [
            ("courseTemperature", self.generation.course_temperature),
            ("lessonTemperature", self.generation.lesson_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(CourseGenError::config_validation(
                    format!("generation.{name} must be between 0 and 2, got {value}"),
                    format!("Set generation.{name} to a value such as 0.7"),
                ));
            }
        }

        for (name, min, max) in [
            (
                "Modules",
                self.generation.min_modules,
                self.generation.max_modules,
            ),
            (
                "Lessons",
                self.generation.min_lessons,
                self.generation.max_lessons,
            ),
            (
                "Blocks",
                self.generation.min_blocks,
                self.generation.max_blocks,
            ),
            (
                "Questions",
                self.generation.min_questions,
                self.generation.max_questions,
            ),
        ] {
            if min == 0 || min > max {
                return Err(CourseGenError::config_validation(
                    format!("generation.min{name} must be at least 1 and not above generation.max{name} (got {min}..{max})"),
                    format!("Adjust generation.min{name} and generation.max{name} in your coursegen.json"),
                ));
            }
        }

        if self.video_search.cache_capacity == 0 {
            return Err(CourseGenError::config_validation(
                "videoSearch.cacheCapacity must be greater than 0",
                "Set videoSearch.cacheCapacity to at least 1 (default 100)",
            ));
        }

        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Prompt shape and retry settings for generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    /// Temperature for course outlines.
    #[serde(default = "default_course_temperature")]
    pub course_temperature: f32,

    /// Temperature for lesson content.
    #[serde(default = "default_lesson_temperature")]
    pub lesson_temperature: f32,

    /// Model calls per generation when the reply is not valid JSON.
    #[serde(default = "default_generation_attempts")]
    pub generation_attempts: u32,

    /// Difficulty used when a request omits it.
    #[serde(default)]
    pub default_difficulty: Difficulty,

    /// Duration used when a request omits it.
    #[serde(default = "default_duration")]
    pub default_duration: String,

    /// Fewest modules to ask for.
    #[serde(default = "default_min_modules")]
    pub min_modules: u32,

    /// Most modules to ask for.
    #[serde(default = "default_max_modules")]
    pub max_modules: u32,

    /// Fewest lessons per module to ask for.
    #[serde(default = "default_min_lessons")]
    pub min_lessons: u32,

    /// Most lessons per module to ask for.
    #[serde(default = "default_max_lessons")]
    pub max_lessons: u32,

    /// Fewest content blocks per lesson to ask for.
    #[serde(default = "default_min_blocks")]
    pub min_blocks: u32,

    /// Most content blocks per lesson to ask for.
    #[serde(default = "default_max_blocks")]
    pub max_blocks: u32,

    /// Video search queries per lesson to ask for.
    #[serde(default = "default_min_videos")]
    pub min_videos: u32,

    /// Fewest assessment questions per lesson.
    #[serde(default = "default_min_questions")]
    pub min_questions: u32,

    /// Most assessment questions per lesson.
    #[serde(default = "default_max_questions")]
    pub max_questions: u32,

    /// Longest accepted topic, in characters.
    #[serde(default = "default_max_topic_len")]
    pub max_topic_len: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            course_temperature: default_course_temperature(),
            lesson_temperature: default_lesson_temperature(),
            generation_attempts: default_generation_attempts(),
            default_difficulty: Difficulty::default(),
            default_duration: default_duration(),
            min_modules: default_min_modules(),
            max_modules: default_max_modules(),
            min_lessons: default_min_lessons(),
            max_lessons: default_max_lessons(),
            min_blocks: default_min_blocks(),
            max_blocks: default_max_blocks(),
            min_videos: default_min_videos(),
            min_questions: default_min_questions(),
            max_questions: default_max_questions(),
            max_topic_len: default_max_topic_len(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// JSON snapshot loaded at startup and written on shutdown.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}
