//! Lexical relevance scoring.
//!
//! Each query term of three or more characters contributes a fixed weight
//! for every place it occurs in the text at the start of a word. The term
//! may be followed by more word characters, so `refund` also counts inside
//! `refunds` and `refunded`. There is no length normalisation and no IDF.

/// Weight added per term occurrence.
pub const TERM_WEIGHT: f64 = 10.0;

/// Terms of this many characters or fewer are ignored.
const MIN_TERM_CHARS: usize = 2;

/// Splits a query into scoring terms.
///
/// Terms are lower-cased, split on whitespace, and stripped of leading and
/// trailing punctuation (`"policy?"` becomes `"policy"`).
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !is_word_char(c)))
        .filter(|t| t.chars().count() > MIN_TERM_CHARS)
        .map(str::to_string)
        .collect()
}

/// Scores `text` against `query`. Zero means no term matched.
pub fn score(query: &str, text: &str) -> f64 {
    score_terms(&query_terms(query), text)
}

/// Scores `text` against pre-split terms, so a query is tokenized once per
/// retrieval rather than once per paragraph.
pub fn score_terms(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    terms
        .iter()
        .map(|term| count_word_prefix_matches(&text, term) as f64 * TERM_WEIGHT)
        .sum()
}

/// Counts occurrences of `term` in `text` that begin at a word boundary.
fn count_word_prefix_matches(text: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = text[from..].find(term) {
        let start = from + pos;
        let at_boundary = text[..start]
            .chars()
            .next_back()
            .map_or(true, |prev| !is_word_char(prev));
        if at_boundary {
            count += 1;
            from = start + term.len();
        } else {
            // Step one character so multi-byte text stays on a char boundary.
            from = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
    }
    count
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_terms_are_dropped() {
        assert_eq!(query_terms("is it ok to go"), Vec::<String>::new());
        assert_eq!(score("is it an ox", "it is an ox"), 0.0);
    }

    #[test]
    fn test_terms_lowercased_and_trimmed() {
        assert_eq!(
            query_terms("What is your REFUND policy?"),
            vec!["what", "your", "refund", "policy"]
        );
    }

    #[test]
    fn test_prefix_matches_variants() {
        let text = "Refunds are processed weekly. A refund takes 5 days.";
        assert_eq!(score("refund", text), 20.0);
    }

    #[test]
    fn test_mid_word_occurrence_does_not_count() {
        assert_eq!(score("fund", "We refund promptly."), 0.0);
        assert_eq!(score("fund", "The fund grew."), 10.0);
    }

    #[test]
    fn test_sums_over_terms() {
        let text = "Our refund policy allows returns within 30 days.";
        assert_eq!(score("our refund policy allows", text), 40.0);
    }

    #[test]
    fn test_repeated_term_counts_each_time() {
        assert_eq!(score("plan plan", "plan"), 20.0);
    }

    #[test]
    fn test_boundary_after_punctuation() {
        assert_eq!(score("api", "(API) keys, api-keys and rapid"), 20.0);
    }

    #[test]
    fn test_non_ascii_text() {
        assert_eq!(score("café", "Le café, les cafés."), 20.0);
        assert_eq!(score("über", "darüber über"), 10.0);
    }

    #[test]
    fn test_no_overlap_scores_zero() {
        assert_eq!(score("shipping hardware", "Pricing tiers and plans."), 0.0);
    }
}
