//! pubagent-llm
//!
//! [`Generator`](pubagent_core::traits::Generator) implementations: a client
//! for OpenAI-compatible chat-completions services (Groq by default) and a
//! retrying wrapper around any generator.

mod openai;
mod retry;

pub use openai::ChatCompletionsGenerator;
pub use retry::RetryingGenerator;

use std::sync::Arc;

use pubagent_core::config::GenerationSettings;
use pubagent_core::traits::Generator;
use pubagent_core::Result;

/// The configured generator, wrapped for retries when `max_retries > 0`.
///
/// Each attempt is bounded by `timeout_secs`; callers bound the whole call by
/// [`GenerationSettings::total_budget`].
pub fn get_default_generator(settings: &GenerationSettings) -> Result<Arc<dyn Generator>> {
    let client = ChatCompletionsGenerator::from_settings(settings)?;
    if settings.max_retries == 0 {
        return Ok(Arc::new(client));
    }
    let retrying = RetryingGenerator::new(client, settings.max_retries)
        .with_base_delay(settings.retry_base_delay())
        .with_attempt_timeout(settings.attempt_timeout());
    Ok(Arc::new(retrying))
}
