use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::prompts::PromptEngine;

use super::retry::{AttemptError, RetryPolicy, Sleeper, ThreadSleeper};
use super::{Proposal, RepairOracle, RepairRequest};

const TEMPERATURE: f64 = 0.1;
const MAX_TOKENS: u32 = 2000;

/// Language tags some models put on the first line inside a fence.
const LANGUAGE_LINES: &[&str] = &["python", "javascript", "java", "cpp", "c++"];

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:\w+)?\s*(.*?)```").unwrap());

// ---------------------------------------------------------------------------
// Client abstraction (for testability)
// ---------------------------------------------------------------------------

/// One chat-completion round trip: prompt in, raw reply text out.
pub trait ChatClient {
    fn complete(&self, prompt: &str) -> Result<String, AttemptError>;
}

/// OpenAI-compatible `/chat/completions` client over blocking `ureq`.
pub struct UreqChatClient {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    model: String,
}

impl UreqChatClient {
    pub fn new(url: String, api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url,
            api_key,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl ChatClient for UreqChatClient {
    fn complete(&self, prompt: &str) -> Result<String, AttemptError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        });

        let response = self
            .agent
            .post(&self.url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_json(&body)
            .map_err(classify)?;

        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| AttemptError::Fatal(format!("failed to parse oracle response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AttemptError::Fatal("oracle response has no choices".to_string()))
    }
}

/// Rate limits (429), server errors (5xx) and transport errors are retryable.
fn classify(err: ureq::Error) -> AttemptError {
    match err {
        ureq::Error::Status(429, _) => AttemptError::RateLimited("HTTP 429".to_string()),
        ureq::Error::Status(code, response) if code >= 500 => {
            let text = response.into_string().unwrap_or_default();
            AttemptError::Transient(format!("API error: {code} - {text}"))
        }
        ureq::Error::Status(code, response) => {
            let text = response.into_string().unwrap_or_default();
            AttemptError::Fatal(format!("API error: {code} - {text}"))
        }
        ureq::Error::Transport(transport) => AttemptError::Transient(transport.to_string()),
    }
}

/// Pull the code out of a model reply: the last fenced block if there is
/// one, otherwise the whole trimmed reply.
pub fn extract_code(reply: &str) -> String {
    let text = reply.trim();
    if text.is_empty() {
        return String::new();
    }

    if text.contains("```")
        && let Some(block) = FENCE_RE.captures_iter(text).last()
    {
        let code = block.get(1).map_or("", |m| m.as_str()).trim();
        let mut lines = code.lines();
        if let Some(first) = lines.next()
            && code.contains('\n')
            && LANGUAGE_LINES.contains(&first.trim())
        {
            return lines.collect::<Vec<_>>().join("\n").trim().to_string();
        }
        return code.to_string();
    }

    text.to_string()
}

// ---------------------------------------------------------------------------
// HttpOracle
// ---------------------------------------------------------------------------

/// Repair oracle backed by a chat-completion endpoint.
pub struct HttpOracle {
    client: Option<Box<dyn ChatClient>>,
    retry: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
    prompts: PromptEngine,
}

impl HttpOracle {
    /// Build from config; unavailable when the API key env var is unset.
    pub fn from_config(config: &Config) -> Self {
        let client = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => {
                debug!(url = %config.oracle_url, model = %config.model, "repair oracle configured");
                Some(Box::new(UreqChatClient::new(
                    config.oracle_url.clone(),
                    key,
                    config.model.clone(),
                    Duration::from_secs(config.timeout_secs),
                )) as Box<dyn ChatClient>)
            }
            _ => {
                warn!(
                    env = %config.api_key_env,
                    "repair oracle API key not set, oracle-backed strategies are unavailable"
                );
                None
            }
        };

        Self {
            client,
            retry: RetryPolicy::with_max_attempts(config.max_retries),
            sleeper: Box::new(ThreadSleeper),
            prompts: PromptEngine::new(config.prompts_dir.clone()),
        }
    }

    pub fn with_client(
        client: Box<dyn ChatClient>,
        retry: RetryPolicy,
        sleeper: Box<dyn Sleeper>,
    ) -> Self {
        Self {
            client: Some(client),
            retry,
            sleeper,
            prompts: PromptEngine::default(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }
}

impl RepairOracle for HttpOracle {
    fn propose(&self, request: &RepairRequest<'_>) -> Proposal {
        let Some(ref client) = self.client else {
            return Proposal::Unavailable;
        };

        let prompt = match self.prompts.render_repair(request) {
            Ok(p) => p,
            Err(e) => return Proposal::Failed(format!("failed to render repair prompt: {e}")),
        };

        let max_attempts = self.retry.max_attempts;
        let reply = self.retry.run(self.sleeper.as_ref(), |attempt| {
            info!(attempt, max_attempts, "consulting repair oracle");
            client.complete(&prompt)
        });

        match reply {
            Ok(reply) => {
                let code = extract_code(&reply);
                if code.is_empty() || code == request.problem_code.trim() {
                    warn!("repair oracle returned no usable fix");
                    Proposal::Failed("oracle did not provide a usable fix".to_string())
                } else {
                    info!("repair oracle proposed a fix");
                    Proposal::Fixed(code)
                }
            }
            Err(e) => {
                warn!(error = %e, "repair oracle failed");
                Proposal::Failed(e.to_string())
            }
        }
    }
}
