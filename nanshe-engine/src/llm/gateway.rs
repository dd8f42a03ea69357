//! JSON completions with retry and per-user usage accounting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nanshe_models::providers::{ChatRequest, Message, Usage};
use nanshe_models::tokens::count_tokens;
use nanshe_models::{PricingTable, ProviderRegistry};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::json::parse_object;
use crate::config::LlmConfig;
use crate::store::{CozoStore, NewUsage};
use crate::types::Id;
use crate::{EngineError, Result};

const JSON_DIRECTIVE: &str =
    "Respond with a single valid JSON object and nothing else.";

const REPAIR_SUFFIX: &str = "Your previous reply could not be parsed as JSON. \
Reply again with only the JSON object: no backticks, no markdown, no commentary.";

/// Retries ask for a more literal answer.
const REPAIR_TEMPERATURE: f32 = 0.2;

/// A parsed completion with the tokens it consumed across all attempts.
#[derive(Debug, Clone)]
pub struct JsonCompletion {
    pub object: Map<String, Value>,
    /// Bare model name the request was routed to
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub attempts: u32,
}

/// Front door to the language model providers.
///
/// Routes a `provider:model` choice through the registry, forces JSON
/// output and retries replies that do not parse.
pub struct LlmGateway {
    registry: ProviderRegistry,
    store: Arc<CozoStore>,
    pricing: PricingTable,
    default_model: String,
    max_retries: u32,
    timeout: Duration,
}

impl LlmGateway {
    pub fn new(registry: ProviderRegistry, store: Arc<CozoStore>, config: &LlmConfig) -> Self {
        Self {
            registry,
            store,
            pricing: config.pricing_table(),
            default_model: config.model.clone(),
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Ask for a JSON object.
    ///
    /// Makes at most `max_retries + 1` attempts (the configured value when
    /// `None`) and returns the last failure as [`EngineError::Llm`].
    pub async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model_choice: Option<&str>,
        max_retries: Option<u32>,
    ) -> Result<Map<String, Value>> {
        self.complete(system_prompt, user_prompt, model_choice, max_retries)
            .await
            .map(|c| c.object)
    }

    /// [`complete_json`](Self::complete_json), then record the call's token
    /// usage and cost against `user_id` under `feature`.
    #[instrument(skip(self, system_prompt, user_prompt))]
    pub async fn complete_and_log(
        &self,
        user_id: Id,
        feature: &str,
        system_prompt: &str,
        user_prompt: &str,
        model_choice: Option<&str>,
        max_retries: Option<u32>,
    ) -> Result<Map<String, Value>> {
        let completion = self
            .complete(system_prompt, user_prompt, model_choice, max_retries)
            .await?;
        let cost_usd = self.pricing.cost(
            &completion.model,
            completion.prompt_tokens,
            completion.completion_tokens,
        );
        let usage = NewUsage {
            user_id,
            feature: feature.to_string(),
            model: completion.model.clone(),
            prompt_tokens: completion.prompt_tokens,
            completion_tokens: completion.completion_tokens,
            cost_usd,
        };
        self.store.insert_usage(usage, Utc::now()).await?;
        debug!(
            model = %completion.model,
            prompt_tokens = completion.prompt_tokens,
            completion_tokens = completion.completion_tokens,
            cost_usd,
            "LLM usage recorded"
        );
        Ok(completion.object)
    }

    /// Retry loop shared by both entry points.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model_choice: Option<&str>,
        max_retries: Option<u32>,
    ) -> Result<JsonCompletion> {
        let choice = model_choice.unwrap_or(&self.default_model);
        let (provider, model) = self.registry.resolve(choice)?;
        let attempts = max_retries.unwrap_or(self.max_retries) + 1;

        let system = with_json_guard(system_prompt, user_prompt);
        let mut prompt_tokens = 0;
        let mut completion_tokens = 0;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            let user = if attempt == 1 {
                user_prompt.to_string()
            } else {
                format!("{user_prompt}\n\n{REPAIR_SUFFIX}")
            };
            let mut request = ChatRequest::new(
                &model,
                vec![Message::system(&system), Message::user(&user)],
            )
            .json();
            if attempt > 1 {
                request = request.temperature(REPAIR_TEMPERATURE);
            }

            let reply = match tokio::time::timeout(self.timeout, provider.chat(request)).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    warn!(model = %model, attempt, error = %e, "LLM call failed");
                    last_error = e.to_string();
                    continue;
                }
                Err(_) => {
                    warn!(model = %model, attempt, timeout_secs = self.timeout.as_secs(), "LLM call timed out");
                    last_error = format!("timed out after {}s", self.timeout.as_secs());
                    continue;
                }
            };

            let (input, output) = usage_or_estimate(&reply.usage, &model, &system, &user, &reply.content);
            prompt_tokens += input;
            completion_tokens += output;

            match parse_object(&reply.content) {
                Ok(object) => {
                    info!(model = %model, attempt, "LLM reply parsed");
                    return Ok(JsonCompletion {
                        object,
                        model,
                        prompt_tokens,
                        completion_tokens,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!(model = %model, attempt, error = %e, "LLM reply is not a JSON object");
                    last_error = e;
                }
            }
        }

        Err(EngineError::Llm(format!(
            "{model}: giving up after {attempts} attempts: {last_error}"
        )))
    }
}

/// Append the strict-JSON directive unless either prompt already says "json".
fn with_json_guard(system_prompt: &str, user_prompt: &str) -> String {
    let mentions_json = system_prompt.to_lowercase().contains("json")
        || user_prompt.to_lowercase().contains("json");
    if mentions_json {
        system_prompt.to_string()
    } else if system_prompt.is_empty() {
        JSON_DIRECTIVE.to_string()
    } else {
        format!("{system_prompt}\n\n{JSON_DIRECTIVE}")
    }
}

fn usage_or_estimate(usage: &Usage, model: &str, system: &str, user: &str, reply: &str) -> (u64, u64) {
    if usage.is_empty() {
        (
            count_tokens(model, system) + count_tokens(model, user),
            count_tokens(model, reply),
        )
    } else {
        (usage.input_tokens, usage.output_tokens)
    }
}
