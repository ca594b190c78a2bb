//! OpenAI-compatible API backend for streaming chat replies.
//!
//! Works against any server implementing the chat completions API with
//! SSE streaming (Ollama, vLLM, llama.cpp server, hosted providers).

use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use crate::llm::ChatBackend;
use async_trait::async_trait;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::info;

/// Chat backend using an OpenAI-compatible HTTP API.
///
/// Keeps a bounded conversation history with the system prompt pinned at
/// the front, so every request is prior-turn aware.
pub struct ApiChat {
    config: LlmConfig,
    history: Vec<ChatMessage>,
    agent: ureq::Agent,
}

/// A single message in the conversation history.
#[derive(Debug, Clone)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ApiChat {
    /// Create a new API-backed chat session.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable (empty URL or
    /// model), which callers surface as an initialization-failure entry.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            return Err(AssistantError::Config("llm.api_url is empty".to_owned()));
        }
        if config.api_model.trim().is_empty() {
            return Err(AssistantError::Config("llm.api_model is empty".to_owned()));
        }

        info!(
            "chat backend configured: {} model={}",
            config.api_url, config.api_model
        );

        let history = vec![ChatMessage {
            role: "system",
            content: config.system_prompt.clone(),
        }];

        Ok(Self {
            config: config.clone(),
            history,
            agent: ureq::agent(),
        })
    }

    fn completions_url(&self) -> String {
        let base = match self.config.api_url.strip_suffix("/v1") {
            Some(u) => u,
            None => &self.config.api_url,
        };
        let base = base.trim_end_matches('/');
        format!("{base}/v1/chat/completions")
    }

    /// Truncate the history to the system prompt plus the most recent
    /// `max_history_messages` messages.
    fn trim_history(&mut self) {
        let max = self.config.max_history_messages;
        if max == 0 {
            return;
        }
        if self.history.len() > 1 + max {
            let drain_end = self.history.len().saturating_sub(max);
            if drain_end > 1 {
                self.history.drain(1..drain_end);
            }
        }
    }
}

#[async_trait]
impl ChatBackend for ApiChat {
    async fn stream_reply(&mut self, user_text: &str, tx: mpsc::Sender<String>) -> Result<()> {
        self.history.push(ChatMessage {
            role: "user",
            content: user_text.to_owned(),
        });
        self.trim_history();

        let gen_start = Instant::now();

        let messages: Vec<serde_json::Value> = self
            .history
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content,
                })
            })
            .collect();

        let body = serde_json::json!({
            "model": self.config.api_model,
            "messages": messages,
            "stream": true,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        let body_str = serde_json::to_string(&body)
            .map_err(|e| AssistantError::Chat(format!("JSON serialization failed: {e}")))?;

        let url = self.completions_url();
        let agent = self.agent.clone();
        let api_key = self.config.api_key.clone();

        // Bridge sync HTTP streaming to async via a channel.
        let (token_tx, mut token_rx) = mpsc::channel::<String>(64);

        let http_handle =
            tokio::task::spawn_blocking(move || -> std::result::Result<(), String> {
                let mut req = agent.post(&url).set("Content-Type", "application/json");
                if !api_key.is_empty() {
                    let auth = format!("Bearer {api_key}");
                    req = req.set("Authorization", &auth);
                }

                let response = req
                    .send_string(&body_str)
                    .map_err(|e| format!("chat request failed: {e}"))?;

                let reader = std::io::BufReader::new(response.into_reader());
                for line in std::io::BufRead::lines(reader) {
                    let line = line.map_err(|e| format!("read error: {e}"))?;
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        break;
                    }

                    let (content, stop) = parse_delta(data)?;
                    if let Some(content) = content
                        && token_tx.blocking_send(content).is_err()
                    {
                        break;
                    }
                    if stop {
                        break;
                    }
                }
                Ok(())
            });

        let mut reply = String::new();
        let mut chunk_count: usize = 0;
        while let Some(token_text) = token_rx.recv().await {
            chunk_count += 1;
            reply.push_str(&token_text);
            tx.send(token_text)
                .await
                .map_err(|e| AssistantError::Channel(format!("chunk channel closed: {e}")))?;
        }

        match http_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(AssistantError::Chat(e)),
            Err(e) => return Err(AssistantError::Chat(format!("HTTP task panicked: {e}"))),
        }

        let final_text = reply.trim().to_owned();
        if !final_text.is_empty() {
            self.history.push(ChatMessage {
                role: "assistant",
                content: final_text,
            });
        }
        self.trim_history();

        info!(
            "streamed {chunk_count} chunks in {:.1}s",
            gen_start.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

/// Extract the content delta and finish flag from one SSE `data:` payload.
fn parse_delta(data: &str) -> std::result::Result<(Option<String>, bool), String> {
    let chunk: serde_json::Value =
        serde_json::from_str(data).map_err(|e| format!("JSON parse error: {e}"))?;
    let content = chunk["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
    let stop = chunk["choices"][0]["finish_reason"].as_str() == Some("stop");
    Ok((content, stop))
}
