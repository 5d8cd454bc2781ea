//! Core data models used throughout ragdesk.
//!
//! These types represent the documents, ranked passages, citations, and chat
//! messages that flow through the retrieval and answering pipeline.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// A document loaded from the corpus directory. Identity is the filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub raw_content: String,
    pub paragraphs: Vec<String>,
}

/// An immutable view of the whole corpus at one directory version.
///
/// Snapshots are never patched: a directory change produces a new snapshot
/// that replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSnapshot {
    pub documents: Vec<Document>,
    /// Modification time of the corpus directory when this snapshot was read.
    /// `None` for the empty snapshot returned when the directory is unreadable.
    pub source_version: Option<SystemTime>,
}

impl CorpusSnapshot {
    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            source_version: None,
        }
    }

    pub fn paragraph_count(&self) -> usize {
        self.documents.iter().map(|d| d.paragraphs.len()).sum()
    }
}

/// One ranked passage produced for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub filename: String,
    /// 0-based paragraph position within the document.
    pub paragraph_index: usize,
    pub content: String,
    pub score: f64,
}

/// Pointer back to the document paragraph that backed an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub filename: String,
    /// 1-based paragraph number.
    pub section: usize,
}

impl From<&RetrievalResult> for Citation {
    fn from(result: &RetrievalResult) -> Self {
        Self {
            filename: result.filename.clone(),
            section: result.paragraph_index + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
