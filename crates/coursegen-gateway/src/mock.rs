//! Scripted services for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::gemini::TextGenerator;
use crate::video::{VideoResult, VideoSearch};
use crate::{GatewayError, Result};

#[derive(Debug, Clone)]
enum Step {
    Reply(String),
    Fail { message: String, status: Option<u16> },
}

/// A [`TextGenerator`] that plays back queued replies in order.
///
/// When the queue runs dry it answers with the fallback reply, or fails if
/// none is set. Every prompt is recorded with its temperature.
pub struct ScriptedGenerator {
    model_id: String,
    script: Mutex<VecDeque<Step>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<(String, f32)>>,
    call_count: AtomicU32,
}

impl ScriptedGenerator {
    /// Creates a generator with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            model_id: "scripted".to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }

    /// Queues a successful reply.
    #[must_use]
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push_reply(reply);
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn with_failure(self, message: impl Into<String>, status: Option<u16>) -> Self {
        lock(&self.script).push_back(Step::Fail {
            message: message.into(),
            status,
        });
        self
    }

    /// Sets the reply used once the script is exhausted.
    #[must_use]
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Queues a successful reply on a shared generator.
    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.script).push_back(Step::Reply(reply.into()));
    }

    /// Number of `invoke` calls so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far, with their temperatures.
    pub fn prompts(&self) -> Vec<(String, f32)> {
        lock(&self.prompts).clone()
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn invoke(&self, prompt: &str, temperature: f32) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push((prompt.to_string(), temperature));

        let step = lock(&self.script).pop_front();
        match step {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Fail { message, status }) => Err(GatewayError::api(message, status)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| GatewayError::api("script exhausted", None)),
        }
    }
}

/// A [`VideoSearch`] that returns the same results for every query.
pub struct StaticVideoSearch {
    results: Vec<VideoResult>,
    queries: Mutex<Vec<String>>,
}

impl StaticVideoSearch {
    /// Creates a search that always answers with `results`.
    #[must_use]
    pub fn new(results: Vec<VideoResult>) -> Self {
        Self {
            results,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Number of searches so far.
    pub fn call_count(&self) -> usize {
        lock(&self.queries).len()
    }

    /// Queries received so far.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl VideoSearch for StaticVideoSearch {
    async fn search(&self, query: &str) -> Result<Vec<VideoResult>> {
        lock(&self.queries).push(query.to_string());
        Ok(self.results.clone())
    }
}

/// Locks a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_plays_in_order_then_falls_back() {
        let generator = ScriptedGenerator::new()
            .with_reply("first")
            .with_failure("boom", Some(500))
            .with_fallback("again");

        assert_eq!(generator.invoke("a", 0.1).await.unwrap(), "first");
        assert_eq!(
            generator.invoke("b", 0.2).await.unwrap_err().status(),
            Some(500)
        );
        assert_eq!(generator.invoke("c", 0.3).await.unwrap(), "again");
        assert_eq!(generator.call_count(), 3);
        assert_eq!(generator.prompts()[1].0, "b");
    }

    #[tokio::test]
    async fn test_exhausted_script_without_fallback_fails() {
        let generator = ScriptedGenerator::new();
        assert!(generator.invoke("a", 0.1).await.is_err());
    }
}
