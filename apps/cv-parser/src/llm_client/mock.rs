//! Scripted completion backend for deterministic tests.
//!
//! Replies are consumed in order. Per-model scripts take precedence over the
//! shared queue, and once both are drained the default reply (if any) is
//! returned. Every call is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{CompletionBackend, CompletionSettings, LlmError};

/// One scripted outcome.
pub enum Scripted {
    Reply(String),
    Fail(LlmError),
}

/// A call observed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
}

#[derive(Default)]
struct Script {
    queue: VecDeque<Scripted>,
    per_model: HashMap<String, VecDeque<Scripted>>,
    default_reply: Option<String>,
    calls: Vec<RecordedCall>,
}

#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that always answers with `reply`.
    pub fn always(reply: impl Into<String>) -> Self {
        let backend = Self::new();
        backend.lock().default_reply = Some(reply.into());
        backend
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.lock().queue.push_back(Scripted::Reply(text.into()));
        self
    }

    pub fn fail(self, error: LlmError) -> Self {
        self.lock().queue.push_back(Scripted::Fail(error));
        self
    }

    /// Scripts an outcome for one model only.
    pub fn on_model(self, model: impl Into<String>, outcome: Scripted) -> Self {
        self.lock()
            .per_model
            .entry(model.into())
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // A poisoned script only happens after a panicking test; keep going.
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<String, LlmError> {
        let mut guard = self.lock();
        let script = &mut *guard;
        script.calls.push(RecordedCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
            temperature: settings.temperature,
        });

        let queue = &mut script.queue;
        let next = script
            .per_model
            .get_mut(model)
            .and_then(VecDeque::pop_front)
            .or_else(|| queue.pop_front());

        match next {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(e)) => Err(e),
            None => script.default_reply.clone().ok_or(LlmError::EmptyContent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_then_default() {
        let backend = ScriptedBackend::always("fallback")
            .reply("first")
            .fail(LlmError::EmptyContent);
        let s = CompletionSettings::default();

        assert_eq!(backend.complete("m", "p", &s).await.unwrap(), "first");
        assert!(backend.complete("m", "p", &s).await.is_err());
        assert_eq!(backend.complete("m", "p", &s).await.unwrap(), "fallback");
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_per_model_script_takes_precedence() {
        let backend = ScriptedBackend::new()
            .reply("shared")
            .on_model("special", Scripted::Reply("special reply".into()));
        let s = CompletionSettings::default();

        assert_eq!(
            backend.complete("special", "p", &s).await.unwrap(),
            "special reply"
        );
        assert_eq!(backend.complete("special", "p", &s).await.unwrap(), "shared");
        assert!(matches!(
            backend.complete("other", "p", &s).await,
            Err(LlmError::EmptyContent)
        ));
        assert_eq!(backend.calls()[0].model, "special");
    }
}
