//! Turning one command into at most `max` ordered subtask payloads.

use anyhow::{Context, Result, bail};
use reqwest::{Client, header};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;

const SYSTEM_PROMPT: &str = "You break a command into independent subtasks that can run \
in parallel on separate machines. Reply with a numbered list, one subtask per line, and \
nothing else.";

/// Splits a command into subtask payloads.
pub trait Splitter: Send + Sync {
    /// At most `max` payloads, in execution order.
    fn split(&self, command: &str, max: usize) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Extract list items from free text.
///
/// Keeps lines that start with a digit, `-` or `*`, strips the enumerator
/// (`1.`, `2)`, `-`), drops empty items, and keeps the first `max`.
pub fn parse_subtasks(text: &str, max: usize) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(strip_enumerator)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .take(max)
        .collect()
}

fn strip_enumerator(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix(['-', '*']) {
        return Some(rest.trim());
    }
    if !line.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    let rest = rest.strip_prefix(['.', ')', ':']).unwrap_or(rest);
    Some(rest.trim())
}

/// Offline splitter: every non-empty line or `;`-separated clause is one
/// subtask.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineSplitter;

impl Splitter for LineSplitter {
    async fn split(&self, command: &str, max: usize) -> Result<Vec<String>> {
        Ok(command
            .lines()
            .flat_map(|line| line.split(';'))
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_owned)
            .take(max)
            .collect())
    }
}

/// Splitter backed by an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct ChatSplitter {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl ChatSplitter {
    /// Create a splitter calling `<base_url>/chat/completions`.
    pub fn new(client: Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
        }
    }
}

impl Splitter for ChatSplitter {
    async fn split(&self, command: &str, max: usize) -> Result<Vec<String>> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Split into at most {max} subtasks:\n{command}"),
                },
            ],
        });
        let completion: Completion = self
            .client
            .post(&self.endpoint)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("splitter request failed")?
            .error_for_status()
            .context("splitter rejected the request")?
            .json()
            .await
            .context("unexpected splitter response")?;

        let Some(content) = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
        else {
            bail!("splitter returned no content");
        };
        let subtasks = parse_subtasks(&content, max);
        tracing::debug!(subtasks = subtasks.len(), "split command");
        Ok(subtasks)
    }
}

/// Splitter selected by configuration.
#[derive(Clone)]
pub enum AnySplitter {
    /// Local line splitting.
    Line(LineSplitter),
    /// Remote chat model.
    Chat(ChatSplitter),
}

impl Splitter for AnySplitter {
    async fn split(&self, command: &str, max: usize) -> Result<Vec<String>> {
        match self {
            Self::Line(s) => s.split(command, max).await,
            Self::Chat(s) => s.split(command, max).await,
        }
    }
}
