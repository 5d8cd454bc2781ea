//! Generation backends.
//!
//! A [`GenerationGateway`] turns a chat history plus a context block into a
//! stream of text fragments. Backends write fragments into a
//! [`FragmentSink`]; [`spawn_generation`] runs a backend on its own task and
//! hands the caller the receiving end of a bounded channel.
//!
//! - **[`OpenAIGateway`]** streams from an OpenAI-compatible chat completions API.
//! - **[`OfflineGateway`]** answers from a fixed rule set, one character at a time.
//!
//! # Failure contract
//!
//! Once a backend has produced a fragment it must not fail silently: on any
//! error it emits the [`APOLOGY`] fragments and finishes normally.
//! [`spawn_generation`] enforces this for backends that return an error after
//! streaming has begun. An error returned before the first fragment is passed
//! through to the consumer as a failed stream.
//!
//! # Cancellation
//!
//! Dropping the receiver closes the channel. [`spawn_generation`] then drops
//! the backend future, releasing its upstream connection even if it is
//! waiting on a slow response. A backend polled directly sees
//! [`FragmentSink::send`] return `false` instead.

pub mod offline;
pub mod openai;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::models::Message;

pub use offline::OfflineGateway;
pub use openai::OpenAIGateway;

/// User-facing text emitted in place of an answer when generation fails.
pub const APOLOGY: [&str; 2] = [
    "I apologize, but I encountered an issue retrieving information. ",
    "Please try again or contact support@helpdesk.ai for assistance.",
];

/// Capacity of the channel between a backend and its consumer.
pub const FRAGMENT_BUFFER: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("generation backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation failed: {0}")]
    Backend(String),
}

/// One item on the fragment channel.
pub type Fragment = Result<String, GenerationError>;

/// Writing half of the fragment channel given to a backend.
#[derive(Clone)]
pub struct FragmentSink {
    tx: mpsc::Sender<Fragment>,
    started: Arc<AtomicBool>,
}

impl FragmentSink {
    /// Sends one fragment. Returns `false` once the consumer has gone away.
    pub async fn send(&self, fragment: impl Into<String>) -> bool {
        let ok = self.tx.send(Ok(fragment.into())).await.is_ok();
        if ok {
            self.started.store(true, Ordering::Relaxed);
        }
        ok
    }

    /// Whether at least one fragment has been delivered.
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }
}

/// A sink/receiver pair not attached to any backend task.
#[cfg(test)]
pub(crate) fn test_sink(capacity: usize) -> (FragmentSink, mpsc::Receiver<Fragment>) {
    let (tx, rx) = mpsc::channel(capacity);
    let sink = FragmentSink {
        tx,
        started: Arc::new(AtomicBool::new(false)),
    };
    (sink, rx)
}

/// Sends the apology fragments, stopping early if the consumer is gone.
pub async fn apologize(sink: &FragmentSink) {
    for part in APOLOGY {
        if !sink.send(part).await {
            return;
        }
    }
}

/// A text-generation backend.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Short backend identifier used in logs (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Streams an answer to the last user message into `sink`.
    ///
    /// `context` is the formatted passage block, possibly empty. Implementations
    /// should return as soon as [`FragmentSink::send`] reports the consumer
    /// has gone.
    async fn generate(
        &self,
        messages: &[Message],
        context: &str,
        sink: FragmentSink,
    ) -> Result<(), GenerationError>;
}

/// Runs `gateway` on a new task and returns the fragment receiver.
///
/// The channel closes when the backend finishes, and the backend is
/// cancelled as soon as the receiver is dropped. A backend error is delivered
/// as a final `Err` item only if no fragment was sent yet; otherwise the
/// apology is sent instead so the stream still ends with visible text.
pub fn spawn_generation(
    gateway: Arc<dyn GenerationGateway>,
    messages: Vec<Message>,
    context: String,
) -> mpsc::Receiver<Fragment> {
    let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
    let sink = FragmentSink {
        tx: tx.clone(),
        started: Arc::new(AtomicBool::new(false)),
    };

    tokio::spawn(async move {
        let result = tokio::select! {
            result = gateway.generate(&messages, &context, sink.clone()) => Some(result),
            _ = tx.closed() => None,
        };
        let Some(result) = result else {
            debug!(backend = gateway.name(), "Fragment consumer closed, generation cancelled");
            return;
        };
        if let Err(e) = result {
            if sink.has_started() {
                warn!(backend = gateway.name(), error = %e, "Generation failed mid-stream");
                apologize(&sink).await;
            } else {
                let _ = tx.send(Err(e)).await;
            }
        }
    });

    rx
}

/// Selects the backend named by `config.provider`.
///
/// `auto` picks the live backend when an API key is present and the offline
/// stand-in otherwise.
pub fn create_gateway(config: &GenerationConfig) -> Result<Arc<dyn GenerationGateway>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIGateway::new(config)?)),
        "offline" => Ok(Arc::new(OfflineGateway::new(config))),
        "auto" => {
            if config.api_key().is_some() {
                Ok(Arc::new(OpenAIGateway::new(config)?))
            } else {
                info!(
                    env = %config.api_key_env,
                    "No API key configured, using offline generation"
                );
                Ok(Arc::new(OfflineGateway::new(config)))
            }
        }
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// Builds the system instruction that carries the retrieved context.
pub fn system_prompt(context: &str) -> String {
    let knowledge = if context.trim().is_empty() {
        "No relevant information found in the knowledge base."
    } else {
        context
    };
    format!(
        "You are a helpful HelpDesk AI assistant. You answer questions based on the provided knowledge base.\n\n\
         If the user's question is not covered by the knowledge base, politely say you don't have enough \
         information and suggest relevant documentation.\n\n\
         Always be concise and helpful. Format your response in clear, readable paragraphs.\n\n\
         Knowledge Base Context:\n{}",
        knowledge
    )
}
