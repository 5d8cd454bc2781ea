//! Context formatting and citation extraction.
//!
//! Both functions preserve input order, so the `n`th citation always points
//! at the passage labelled `Source n` in the context block.

use crate::models::{Citation, RetrievalResult};

/// Renders passages as labelled blocks separated by a blank line.
///
/// Returns an empty string for no passages, which downstream means
/// "no knowledge available".
pub fn format_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[Source {}: {}]\n{}", i + 1, r.filename, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn extract_citations(results: &[RetrievalResult]) -> Vec<Citation> {
    results.iter().map(Citation::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(filename: &str, paragraph_index: usize, content: &str) -> RetrievalResult {
        RetrievalResult {
            filename: filename.to_string(),
            paragraph_index,
            content: content.to_string(),
            score: 10.0,
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(format_context(&[]), "");
        assert!(extract_citations(&[]).is_empty());
    }

    #[test]
    fn test_format_labels_by_rank() {
        let results = vec![
            result("pricing.md", 4, "Plans start at $29."),
            result("faq.md", 0, "Contact support."),
        ];
        assert_eq!(
            format_context(&results),
            "[Source 1: pricing.md]\nPlans start at $29.\n\n[Source 2: faq.md]\nContact support."
        );
    }

    #[test]
    fn test_citations_follow_input_order() {
        let results = vec![
            result("b.md", 2, "x"),
            result("a.md", 0, "y"),
            result("b.md", 7, "z"),
        ];
        let citations = extract_citations(&results);
        assert_eq!(citations.len(), results.len());
        for (c, r) in citations.iter().zip(&results) {
            assert_eq!(c.filename, r.filename);
            assert_eq!(c.section, r.paragraph_index + 1);
        }
    }
}
