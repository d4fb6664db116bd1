//! Streaming generation against an Ollama-compatible endpoint.
//!
//! One request produces one [`ReplyStream`]: a cold, pull-based fragment
//! sequence bound to a cancellation token. Consuming the stream drives
//! the network read; dropping or cancelling it closes the connection.

pub mod prompt;
pub mod stream;

pub use prompt::{GenerationRequest, build_request};
pub use stream::ReplyEvent;

use crate::config::LlmConfig;
use crate::error::{PipelineError, Result};
use bytes::Bytes;
use futures_util::StreamExt;
use std::time::Duration;
use stream::NdjsonParser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Client for the generation endpoint.
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .build()
            .map_err(|e| PipelineError::Generation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_owned(),
            http,
        })
    }

    /// Whether the generation endpoint is reachable.
    pub async fn check_connection(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Open a streaming generation call.
    ///
    /// Fragments arrive in generation order; their concatenation is the
    /// exact reply text. The stream ends with exactly one terminal event
    /// ([`ReplyEvent::Done`] or [`ReplyEvent::Failed`]). Cancelling the
    /// token stops the stream and closes the connection; no fragment is
    /// delivered after cancellation.
    pub fn stream_generate(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> ReplyStream {
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": request.model,
            "prompt": request.prompt,
            "system": request.system_prompt,
            "stream": true,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });

        info!("generation request to {} (model={})", url, request.model);

        let (tx, rx) = mpsc::channel(64);
        let http = self.http.clone();
        tokio::spawn(drive_stream(http, url, body, tx, cancel));

        ReplyStream { rx }
    }
}

/// A cold, cancellable sequence of reply fragments.
///
/// Forward-only and not restartable; once a terminal event is observed
/// the stream is exhausted.
pub struct ReplyStream {
    rx: mpsc::Receiver<ReplyEvent>,
}

impl ReplyStream {
    /// Await the next event. `None` means the producer stopped without a
    /// terminal event, which only happens after cancellation.
    pub async fn next(&mut self) -> Option<ReplyEvent> {
        self.rx.recv().await
    }
}

/// Drive one HTTP generation call, translating the byte stream into
/// reply events. Runs as its own task so slow consumers only apply
/// backpressure to the channel, never to the parser state.
async fn drive_stream(
    http: reqwest::Client,
    url: String,
    body: serde_json::Value,
    tx: mpsc::Sender<ReplyEvent>,
    cancel: CancellationToken,
) {
    let response = tokio::select! {
        r = http.post(&url).json(&body).send() => r,
        _ = cancel.cancelled() => {
            debug!("generation cancelled before the endpoint answered");
            return;
        }
    };

    let response = match response {
        Ok(resp) => resp,
        Err(e) => {
            let _ = tx
                .send(ReplyEvent::Failed(format!("request failed: {e}")))
                .await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let _ = tx
            .send(ReplyEvent::Failed(format!(
                "endpoint returned status {status}"
            )))
            .await;
        return;
    }

    let mut bytes = response.bytes_stream();
    let mut parser = NdjsonParser::new();

    loop {
        let chunk: Option<reqwest::Result<Bytes>> = tokio::select! {
            // Dropping `bytes` (and the response with it) closes the
            // connection on cancellation.
            _ = cancel.cancelled() => {
                debug!("generation cancelled mid-stream");
                return;
            }
            chunk = bytes.next() => chunk,
        };

        match chunk {
            Some(Ok(data)) => {
                for event in parser.push(&data) {
                    let terminal = event.is_terminal();
                    if tx.send(event).await.is_err() {
                        return;
                    }
                    if terminal {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                let _ = tx
                    .send(ReplyEvent::Failed(format!("stream read failed: {e}")))
                    .await;
                return;
            }
            None => {
                for event in parser.flush() {
                    let terminal = event.is_terminal();
                    if tx.send(event).await.is_err() {
                        return;
                    }
                    if terminal {
                        return;
                    }
                }
                if !parser.is_finished() {
                    let _ = tx
                        .send(ReplyEvent::Failed(
                            "connection closed before completion".into(),
                        ))
                        .await;
                }
                return;
            }
        }
    }
}
