//! Response framing: answer text followed by a citation trailer on one stream.
//!
//! A chat request runs through these states:
//!
//! ```text
//! Started ──▶ Streaming ──▶ CitationAppended ──▶ Closed
//!                 │                │
//!                 └──────▶ Failed ◀┘──────────────▶ Closed
//! ```
//!
//! Validation happens in [`ResponseFramer::prepare`] before any retrieval or
//! streaming work. [`FramedResponse::run`] then forwards generated fragments
//! verbatim and in order, and finally writes
//!
//! ```text
//! \n[CITATIONS]{"citations":[{"filename":"faq.md","section":3}]}
//! ```
//!
//! as the last item before closing the stream. The trailer is written exactly
//! once and only after all answer text.
//!
//! If the backend fails before producing anything, or the output closes (the
//! client went away), the framer moves to `Failed` and closes. Closing drops
//! the fragment receiver, which cancels the backend task.
//! A backend failure is forwarded as an `Err` item so the transport aborts
//! the response instead of ending it cleanly.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

use crate::context::{extract_citations, format_context};
use crate::corpus::CorpusStore;
use crate::generation::{spawn_generation, GenerationError, GenerationGateway};
use crate::models::{Citation, Message, Role};
use crate::retrieve::retrieve;

/// Separates answer text from the citation payload.
pub const CITATION_DELIMITER: &str = "\n[CITATIONS]";

/// Capacity of the output channel between the framer task and the transport.
pub const FRAME_BUFFER: usize = 32;

/// Rejections raised before any work starts.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("messages must not be empty")]
    EmptyHistory,
    #[error("last message must be from user")]
    LastMessageNotUser,
}

/// Failures after the stream has been handed to the transport.
#[derive(Debug, thiserror::Error)]
pub enum FramerError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("failed to encode citations: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    Started,
    Streaming,
    CitationAppended,
    Failed,
    Closed,
}

impl FramerState {
    pub fn can_advance_to(self, next: FramerState) -> bool {
        use FramerState::*;
        matches!(
            (self, next),
            (Started, Streaming)
                | (Streaming, CitationAppended)
                | (Streaming, Failed)
                | (CitationAppended, Failed)
                | (CitationAppended, Closed)
                | (Failed, Closed)
        )
    }
}

/// How a framed response ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// All fragments and the trailer were written.
    Completed,
    /// The backend failed before producing any text.
    GenerationFailed,
    /// The citation payload could not be encoded.
    EncodeFailed,
    /// The output channel was closed by the consumer.
    Disconnected,
}

impl FramerError {
    /// The outcome a framer reports after forwarding this error.
    pub fn outcome(&self) -> FrameOutcome {
        match self {
            FramerError::Generation(_) => FrameOutcome::GenerationFailed,
            FramerError::Encode(_) => FrameOutcome::EncodeFailed,
        }
    }
}

/// Checks the history shape and returns the message to answer.
pub fn validate_messages(messages: &[Message]) -> Result<&Message, RequestError> {
    let last = messages.last().ok_or(RequestError::EmptyHistory)?;
    if last.role != Role::User {
        return Err(RequestError::LastMessageNotUser);
    }
    Ok(last)
}

#[derive(Serialize)]
struct CitationPayloadRef<'a> {
    citations: &'a [Citation],
}

#[derive(Deserialize)]
struct CitationPayload {
    #[serde(default)]
    citations: Vec<Citation>,
}

/// Encodes the delimiter plus JSON payload appended after the answer.
pub fn citation_trailer(citations: &[Citation]) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_string(&CitationPayloadRef { citations })?;
    Ok(format!("{}{}", CITATION_DELIMITER, payload))
}

/// Splits a complete framed body into answer text and citations.
///
/// Uses the last delimiter so answer text is never mistaken for a trailer.
/// A body without a trailer is returned whole with no citations.
pub fn split_response(body: &str) -> anyhow::Result<(&str, Vec<Citation>)> {
    match body.rfind(CITATION_DELIMITER) {
        Some(pos) => {
            let payload: CitationPayload =
                serde_json::from_str(&body[pos + CITATION_DELIMITER.len()..])?;
            Ok((&body[..pos], payload.citations))
        }
        None => Ok((body, Vec::new())),
    }
}

/// Per-process entry point: owns the corpus handle and backend, prepares
/// one [`FramedResponse`] per request.
#[derive(Clone)]
pub struct ResponseFramer {
    store: Arc<CorpusStore>,
    gateway: Arc<dyn GenerationGateway>,
    top_k: usize,
}

impl ResponseFramer {
    pub fn new(store: Arc<CorpusStore>, gateway: Arc<dyn GenerationGateway>, top_k: usize) -> Self {
        Self {
            store,
            gateway,
            top_k,
        }
    }

    /// Validates the history, retrieves passages for the last user message,
    /// and builds the context and citations.
    pub async fn prepare(&self, messages: Vec<Message>) -> Result<FramedResponse, RequestError> {
        let query = validate_messages(&messages)?.content.clone();

        let results = retrieve(&self.store, &query, self.top_k).await;
        info!(
            backend = self.gateway.name(),
            passages = results.len(),
            "Answering chat request"
        );

        Ok(FramedResponse {
            gateway: self.gateway.clone(),
            context: format_context(&results),
            citations: extract_citations(&results),
            messages,
            state: FramerState::Started,
        })
    }
}

/// A validated request ready to stream.
pub struct FramedResponse {
    gateway: Arc<dyn GenerationGateway>,
    messages: Vec<Message>,
    context: String,
    citations: Vec<Citation>,
    state: FramerState,
}

impl FramedResponse {
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Runs the framer on its own task and returns the output stream.
    ///
    /// Dropping the stream cancels generation, even while the backend is
    /// waiting on its upstream.
    pub fn spawn(self) -> ReceiverStream<Result<String, FramerError>> {
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        tokio::spawn(self.run(tx));
        ReceiverStream::new(rx)
    }

    /// Drives generation to completion, writing into `out`.
    pub async fn run(mut self, out: mpsc::Sender<Result<String, FramerError>>) -> FrameOutcome {
        self.advance(FramerState::Streaming);

        let mut fragments = spawn_generation(
            self.gateway.clone(),
            std::mem::take(&mut self.messages),
            std::mem::take(&mut self.context),
        );

        let mut forwarded = 0usize;
        loop {
            // The consumer may leave while the backend is silent.
            let next = tokio::select! {
                item = fragments.recv() => Some(item),
                _ = out.closed() => None,
            };
            let item = match next {
                Some(Some(item)) => item,
                Some(None) => break,
                None => {
                    debug!(forwarded, "Client disconnected while awaiting generation");
                    return self.fail(FrameOutcome::Disconnected);
                }
            };

            match item {
                Ok(text) => {
                    if out.send(Ok(text)).await.is_err() {
                        debug!(forwarded, "Client disconnected mid-stream");
                        return self.fail(FrameOutcome::Disconnected);
                    }
                    forwarded += 1;
                }
                Err(e) => {
                    error!(backend = self.gateway.name(), error = %e, "Generation failed");
                    return self.abort(&out, e.into()).await;
                }
            }
        }

        self.advance(FramerState::CitationAppended);
        let trailer = match citation_trailer(&self.citations) {
            Ok(trailer) => trailer,
            Err(e) => {
                error!(error = %e, "Failed to encode citations");
                return self.abort(&out, e.into()).await;
            }
        };
        if out.send(Ok(trailer)).await.is_err() {
            debug!("Client disconnected before citations");
            return self.fail(FrameOutcome::Disconnected);
        }

        self.advance(FramerState::Closed);
        debug!(forwarded, citations = self.citations.len(), "Response complete");
        FrameOutcome::Completed
    }

    /// Convenience for callers that want the whole body at once.
    pub async fn collect(self) -> Result<String, FramerError> {
        let mut rx = self.spawn().into_inner();
        let mut body = String::new();
        while let Some(item) = rx.recv().await {
            body.push_str(&item?);
        }
        Ok(body)
    }

    /// Forwards `err` so the transport aborts the body, then closes.
    async fn abort(
        &mut self,
        out: &mpsc::Sender<Result<String, FramerError>>,
        err: FramerError,
    ) -> FrameOutcome {
        let outcome = err.outcome();
        let _ = out.send(Err(err)).await;
        self.fail(outcome)
    }

    fn fail(&mut self, outcome: FrameOutcome) -> FrameOutcome {
        self.advance(FramerState::Failed);
        self.advance(FramerState::Closed);
        outcome
    }

    fn advance(&mut self, next: FramerState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal framer transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "Framer state");
        self.state = next;
    }
}
