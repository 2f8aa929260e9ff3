//! HTTP client for a local Ollama server: model discovery, metadata, and
//! streaming chat with backpressure and cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::logger::Logger;
use crate::protocol::{ChatOptions, ChatRequest, ChatResponse, Message, Role, StreamEvent, ToolCall};

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    logger: Arc<Logger>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(Deserialize)]
struct ShowModelResponse {
    #[serde(default)]
    model_info: Map<String, Value>,
}

impl OllamaClient {
    pub fn new(base_url: String, logger: Arc<Logger>) -> Result<Self> {
        // No global timeout: streamed responses run as long as generation
        // takes. Only connecting is bounded.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            logger,
        })
    }

    /// Lists the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .with_context(|| format!("Could not reach Ollama at {}", self.base_url))?
            .error_for_status()
            .context("Ollama rejected the model list request")?;
        let tags: TagsResponse = resp.json().await.context("Invalid model list response")?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Fetches model metadata for context-window discovery.
    pub async fn show_model(&self, model: &str) -> Result<Map<String, Value>> {
        let url = format!("{}/api/show", self.base_url);
        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(10))
            .json(&serde_json::json!({ "model": model }))
            .send()
            .await
            .context("Could not query model info")?
            .error_for_status()
            .context("Ollama rejected the model info request")?;
        let show: ShowModelResponse = resp.json().await.context("Invalid model info response")?;
        Ok(show.model_info)
    }

    /// Starts a streaming chat round. Events arrive over a capacity-1
    /// channel, so generation only runs ahead of the consumer by one event.
    pub fn start_stream(&self, model: &str, messages: Vec<Message>, num_ctx: i64) -> StreamHandle {
        let (tx, rx) = mpsc::channel(1);
        let http = self.http.clone();
        let url = format!("{}/api/chat", self.base_url);
        let model = model.to_string();
        let logger = Arc::clone(&self.logger);

        let task = tokio::spawn(async move {
            if let Err(e) = run_stream(http, url, model, messages, num_ctx, &tx).await {
                logger.log(&format!("stream error: {e:#}"));
                let _ = tx.send(StreamEvent::Failed(e)).await;
            }
        });

        StreamHandle {
            events: rx,
            task,
        }
    }
}

/// A live streaming round. Dropping or cancelling aborts generation.
pub struct StreamHandle {
    events: mpsc::Receiver<StreamEvent>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Next event, or `None` once the stream has stopped (normally after a
    /// terminal event, or without one after cancellation).
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Stops generation. Safe to call more than once.
    pub fn cancel(&mut self) {
        self.task.abort();
        self.events.close();
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_stream(
    http: reqwest::Client,
    url: String,
    model: String,
    messages: Vec<Message>,
    num_ctx: i64,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<()> {
    let options = (num_ctx > 0).then_some(ChatOptions { num_ctx });
    let request = ChatRequest {
        model: &model,
        messages: &messages,
        stream: true,
        options,
    };

    let resp = http
        .post(&url)
        .json(&request)
        .send()
        .await
        .context("Could not reach Ollama")?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("Ollama returned {status}: {}", body.trim());
    }

    let started = Instant::now();
    let mut acc = Accumulator::default();
    let mut stream = resp.bytes_stream();
    let mut buffer = String::new();
    let mut finished = false;

    'outer: while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Stream interrupted")?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        // NDJSON: one response object per line, lines may split across
        // network chunks.
        while let Some(newline) = buffer.find('\n') {
            let line = buffer[..newline].trim().to_string();
            buffer.drain(..=newline);
            if line.is_empty() {
                continue;
            }
            let parsed: ChatResponse = serde_json::from_str(&line)
                .with_context(|| format!("Unparseable stream line: {line}"))?;

            if !parsed.message.content.is_empty() {
                // A full channel means the consumer is still rendering the
                // previous event; await here is the backpressure.
                if tx
                    .send(StreamEvent::Chunk(parsed.message.content.clone()))
                    .await
                    .is_err()
                {
                    return Ok(());
                }
            }
            acc.absorb(&parsed);

            if parsed.done {
                finished = true;
                break 'outer;
            }
        }
    }

    // The last line may arrive without a trailing newline.
    if !finished {
        let trailing = buffer.trim();
        if !trailing.is_empty() {
            let parsed: ChatResponse = serde_json::from_str(trailing)
                .with_context(|| format!("Unparseable stream line: {trailing}"))?;
            if !parsed.message.content.is_empty()
                && tx
                    .send(StreamEvent::Chunk(parsed.message.content.clone()))
                    .await
                    .is_err()
            {
                return Ok(());
            }
            acc.absorb(&parsed);
        }
    }

    let stats = format_stats(acc.eval_count, started.elapsed());
    let _ = tx
        .send(StreamEvent::Done {
            stats,
            message: acc.into_message(),
        })
        .await;
    Ok(())
}

/// Accumulates streamed fragments into the complete assistant message.
#[derive(Default)]
pub struct Accumulator {
    role: Option<Role>,
    content: String,
    tool_calls: Vec<ToolCall>,
    eval_count: u64,
}

impl Accumulator {
    pub fn absorb(&mut self, resp: &ChatResponse) {
        if self.role.is_none() {
            self.role = Some(resp.message.role);
        }
        self.content.push_str(&resp.message.content);
        self.tool_calls.extend(resp.message.tool_calls.iter().cloned());
        if resp.eval_count > 0 {
            self.eval_count = resp.eval_count;
        }
    }

    pub fn into_message(self) -> Message {
        Message {
            role: self.role.unwrap_or(Role::Assistant),
            content: self.content,
            display_content: None,
            tool_calls: self.tool_calls,
        }
    }
}

pub fn format_stats(eval_count: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        eval_count as f64 / secs
    } else {
        0.0
    };
    format!("Time: {secs:.2}s | Tokens/sec: {rate:.2}")
}

/// Model-architecture keys that carry the context window in `model_info`.
const CONTEXT_KEYS: &[&str] = &[
    "llama.context_length",
    "gemma.context_length",
    "mistral.context_length",
    "gptoss.context_length",
];

/// Pulls the context window out of `/api/show` metadata. Returns an error
/// when no architecture reports one; callers fall back to the server default.
pub fn context_length(model_info: &Map<String, Value>) -> Result<i64> {
    for key in CONTEXT_KEYS {
        if let Some(value) = model_info.get(*key) {
            if let Some(n) = as_integer(value) {
                return Ok(n);
            }
        }
    }
    // Unknown architecture: accept any *.context_length key.
    for (key, value) in model_info {
        if key.ends_with(".context_length") {
            if let Some(n) = as_integer(value) {
                return Ok(n);
            }
        }
    }
    Err(anyhow!("model info carries no context_length"))
}

/// Lenient numeric coercion: Ollama has shipped this field as an integer,
/// a float, and a decimal string across versions.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
            s.trim().parse::<f64>().ok().map(|f| f as i64)
        }),
        _ => None,
    }
}
