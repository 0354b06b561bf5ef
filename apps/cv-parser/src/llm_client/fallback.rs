//! Model fallback — walk an ordered candidate list until one model answers.
//!
//! "Not found" / "access denied" failures advance at once; anything else waits
//! a fixed delay before the next candidate. The first success wins.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::{LlmError, ProviderKind};

pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_secs(1);

/// Every candidate failed. Carries the last failure and what was tried.
#[derive(Debug, Error)]
#[error("all {} candidate models failed for {provider}; last error from {last_model}: {last}", .tried.len())]
pub struct ModelFallbackError {
    pub provider: ProviderKind,
    pub tried: Vec<String>,
    pub last_model: String,
    pub last: LlmError,
}

/// Runs `call` for each model in order. Returns the model that succeeded with
/// its output.
pub async fn run_model_fallback<T, F, Fut>(
    provider: ProviderKind,
    models: &[String],
    delay: Duration,
    mut call: F,
) -> Result<(String, T), ModelFallbackError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut tried = Vec::with_capacity(models.len());
    let mut last: Option<(String, LlmError)> = None;

    for (i, model) in models.iter().enumerate() {
        tried.push(model.clone());
        match call(model.clone()).await {
            Ok(value) => {
                info!("LLM call succeeded: provider={}, model={}", provider, model);
                return Ok((model.clone(), value));
            }
            Err(e) => {
                warn!(
                    "LLM call failed: provider={}, model={}, error={}",
                    provider, model, e
                );
                let has_next = i + 1 < models.len();
                if has_next && !e.skips_immediately() && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                last = Some((model.clone(), e));
            }
        }
    }

    let (last_model, last) = last.unwrap_or_else(|| (String::new(), LlmError::NoCandidates));
    Err(ModelFallbackError {
        provider,
        tried,
        last_model,
        last,
    })
}
