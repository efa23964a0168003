// PromptChain — Chat-endpoint surface (OpenAI-compatible HTTP API)

use super::{InputHandle, PageInfo, PageProvider, TargetSurface};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Default)]
struct ChatState {
    draft: String,
    transcript: Vec<ChatMessage>,
    errors: Vec<String>,
    in_flight: bool,
}

/// A surface that behaves like a chat page backed by `/chat/completions`.
///
/// There is a single input: every input selector resolves to it. Every busy
/// indicator query reports whether a reply is still being fetched, and the
/// input is disabled for the same period. Each request carries the whole
/// conversation so far, so later prompts see earlier answers.
#[derive(Clone)]
pub struct ChatSurface {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    state: Arc<Mutex<ChatState>>,
}

impl ChatSurface {
    pub fn new(
        api_key: String,
        api_base: String,
        model: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        let api_base = if api_base.is_empty() {
            "https://api.openai.com/v1".to_string()
        } else {
            api_base
        };

        Ok(Self {
            client,
            api_base,
            api_key,
            model,
            state: Arc::new(Mutex::new(ChatState::default())),
        })
    }

    /// Messages exchanged so far, oldest first.
    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.state.lock().await.transcript.clone()
    }

    /// Request failures, in the order they happened.
    pub async fn errors(&self) -> Vec<String> {
        self.state.lock().await.errors.clone()
    }

    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": messages,
        });

        tracing::debug!(url = %url, model = %self.model, messages = messages.len(), "Sending chat request");

        let mut request = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            anyhow::bail!("chat API error ({}): {}", status, text);
        }

        parse_reply(&text)
    }
}

fn parse_reply(body: &str) -> anyhow::Result<String> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    value["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("chat API response has no message content"))
}

#[async_trait]
impl TargetSurface for ChatSurface {
    async fn find_input(&self, selector: &str) -> Option<InputHandle> {
        Some(InputHandle::new(selector))
    }

    async fn is_disabled(&self, _input: &InputHandle) -> bool {
        self.state.lock().await.in_flight
    }

    async fn clear(&self, _input: &InputHandle) -> anyhow::Result<()> {
        self.state.lock().await.draft.clear();
        Ok(())
    }

    async fn insert_text(&self, _input: &InputHandle, text: &str) -> anyhow::Result<()> {
        self.state.lock().await.draft.push_str(text);
        Ok(())
    }

    async fn paste(&self, input: &InputHandle, text: &str) -> anyhow::Result<()> {
        self.insert_text(input, text).await
    }

    async fn submit(&self, _input: &InputHandle) -> anyhow::Result<()> {
        let messages = {
            let mut state = self.state.lock().await;
            if state.in_flight || state.draft.trim().is_empty() {
                // Enter on an empty or busy input does nothing
                return Ok(());
            }
            let prompt = std::mem::take(&mut state.draft);
            state.transcript.push(ChatMessage::user(prompt));
            state.in_flight = true;
            state.transcript.clone()
        };

        let surface = self.clone();
        tokio::spawn(async move {
            let result = surface.complete(&messages).await;
            let mut state = surface.state.lock().await;
            match result {
                Ok(reply) => {
                    tracing::debug!(reply_len = reply.len(), "Chat reply received");
                    state.transcript.push(ChatMessage::assistant(reply));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Chat request failed");
                    state.errors.push(e.to_string());
                }
            }
            state.in_flight = false;
        });

        Ok(())
    }

    async fn exists(&self, _selector: &str) -> bool {
        self.state.lock().await.in_flight
    }
}

/// Presents one [`ChatSurface`] as a single open page at `url`.
pub struct ChatPages {
    url: String,
    surface: Arc<ChatSurface>,
}

impl ChatPages {
    pub fn new(url: impl Into<String>, surface: Arc<ChatSurface>) -> Self {
        Self {
            url: url.into(),
            surface,
        }
    }
}

#[async_trait]
impl PageProvider for ChatPages {
    async fn pages(&self) -> anyhow::Result<Vec<PageInfo>> {
        Ok(vec![PageInfo {
            id: "chat".to_string(),
            url: self.url.clone(),
        }])
    }

    async fn attach(&self, _page: &PageInfo) -> anyhow::Result<Arc<dyn TargetSurface>> {
        Ok(self.surface.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
