//! Passage retrieval.
//!
//! Scores every paragraph of the current corpus snapshot against the query
//! and returns the best `top_k`. Ordering is score descending; equal scores
//! keep corpus order (documents by file name, then paragraph position)
//! because the sort is stable.
//!
//! An empty result is a normal outcome, not an error.

use anyhow::Result;

use crate::config::Config;
use crate::corpus::CorpusStore;
use crate::models::{Citation, CorpusSnapshot, RetrievalResult};
use crate::score::{query_terms, score_terms};

/// Retrieves up to `top_k` passages for `query` from the store's current snapshot.
pub async fn retrieve(store: &CorpusStore, query: &str, top_k: usize) -> Vec<RetrievalResult> {
    let snapshot = store.load().await;
    rank(&snapshot, query, top_k)
}

/// Ranks the paragraphs of `snapshot` against `query`.
pub fn rank(snapshot: &CorpusSnapshot, query: &str, top_k: usize) -> Vec<RetrievalResult> {
    let terms = query_terms(query);
    if terms.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let mut results: Vec<RetrievalResult> = snapshot
        .documents
        .iter()
        .flat_map(|doc| {
            doc.paragraphs
                .iter()
                .enumerate()
                .map(move |(i, paragraph)| (doc, i, paragraph))
        })
        .filter_map(|(doc, i, paragraph)| {
            let score = score_terms(&terms, paragraph);
            (score > 0.0).then(|| RetrievalResult {
                filename: doc.filename.clone(),
                paragraph_index: i,
                content: paragraph.clone(),
                score,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    results
}

/// CLI entry point for `ragdesk search`.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = CorpusStore::new(&config.corpus)?;
    let top_k = limit.unwrap_or(config.retrieval.top_k);
    let results = retrieve(&store, query, top_k).await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let citation = Citation::from(result);
        println!(
            "{}. [{:.0}] {} §{}",
            i + 1,
            result.score,
            citation.filename,
            citation.section
        );
        println!(
            "    excerpt: \"{}\"",
            excerpt(&result.content, 240).replace('\n', " ")
        );
        println!();
    }

    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
