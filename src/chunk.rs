//! Paragraph splitter.
//!
//! A paragraph is a block of text separated from its neighbours by at least
//! one blank line (two or more consecutive newlines). Paragraphs are the
//! atomic retrievable unit and their 1-based position is the citation
//! "section".

/// Split text into trimmed, non-empty paragraphs in document order.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");

    // Splitting on every "\n\n" is equivalent to splitting on runs of two or
    // more newlines once the pieces are trimmed and empties dropped.
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns paragraph `section` (1-based), or `None` when out of range.
pub fn paragraph_at(text: &str, section: usize) -> Option<String> {
    if section == 0 {
        return None;
    }
    split_paragraphs(text).into_iter().nth(section - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_paragraph() {
        assert_eq!(split_paragraphs("Hello, world!"), vec!["Hello, world!"]);
    }

    #[test]
    fn test_empty_text() {
        assert!(split_paragraphs("").is_empty());
        assert!(split_paragraphs("\n\n\n   \n").is_empty());
    }

    #[test]
    fn test_blocks_are_trimmed() {
        let text = "  # Title  \n\n\tFirst paragraph.\nStill first.  \n\n\n\nSecond.\n";
        assert_eq!(
            split_paragraphs(text),
            vec!["# Title", "First paragraph.\nStill first.", "Second."]
        );
    }

    #[test]
    fn test_single_newline_does_not_split() {
        let paragraphs = split_paragraphs("line one\nline two");
        assert_eq!(paragraphs.len(), 1);
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = "Alpha\r\n\r\nBeta\r\nGamma";
        assert_eq!(split_paragraphs(text), vec!["Alpha", "Beta\nGamma"]);
    }

    #[test]
    fn test_n_blocks_yield_n_paragraphs() {
        let blocks: Vec<String> = (0..25).map(|i| format!("Paragraph number {}.", i)).collect();
        let text = blocks.join("\n\n\n");
        let paragraphs = split_paragraphs(&text);
        assert_eq!(paragraphs, blocks);
    }

    #[test]
    fn test_paragraph_at() {
        let text = "One\n\nTwo\n\nThree";
        assert_eq!(paragraph_at(text, 1).as_deref(), Some("One"));
        assert_eq!(paragraph_at(text, 3).as_deref(), Some("Three"));
        assert_eq!(paragraph_at(text, 0), None);
        assert_eq!(paragraph_at(text, 4), None);
    }
}
