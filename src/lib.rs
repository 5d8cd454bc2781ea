//! # ragdesk
//!
//! A local-first help-desk answer engine.
//!
//! ragdesk reads a folder of Markdown documents, ranks their paragraphs
//! against a question with a simple lexical scorer, and streams a generated
//! answer followed by citations pointing back at the paragraphs it used.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌────────────┐
//! │  Corpus  │──▶│ Retriever │──▶│ Context │──▶│ Generation │
//! │  ./data  │   │  (score)  │   │ + cites │   │  gateway   │
//! └──────────┘   └───────────┘   └────┬────┘   └─────┬──────┘
//!                                     │              │ fragments
//!                                     ▼              ▼
//!                                  ┌────────────────────┐
//!                                  │  Response framer   │──▶ text … \n[CITATIONS]{…}
//!                                  └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragdesk search "refund policy"       # ranked passages
//! ragdesk ask "What is your refund policy?"
//! ragdesk serve                        # POST /api/chat, GET /api/doc
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`models`] | Core data types |
//! | [`chunk`] | Paragraph splitting |
//! | [`corpus`] | Directory loading with mtime cache |
//! | [`score`] | Lexical relevance score |
//! | [`retrieve`] | Top-k passage ranking |
//! | [`context`] | Context block and citations |
//! | [`generation`] | Streaming generation backends |
//! | [`framer`] | Answer stream with citation trailer |
//! | [`doc`] | Document and section lookup |
//! | [`server`] | HTTP server |

pub mod chunk;
pub mod config;
pub mod context;
pub mod corpus;
pub mod doc;
pub mod framer;
pub mod generation;
pub mod models;
pub mod retrieve;
pub mod score;
pub mod server;
