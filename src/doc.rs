//! Document lookup by file name.
//!
//! Reads a document straight from the corpus directory, optionally narrowed
//! to one paragraph. Used by the `ragdesk doc` CLI command and the
//! `GET /api/doc` endpoint that citation links point at.

use anyhow::Result;
use std::path::Component;

use crate::chunk::paragraph_at;
use crate::config::Config;
use crate::corpus::CorpusStore;

#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("missing file parameter")]
    MissingFile,
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("failed to read document {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

/// Returns the document's raw text, or only paragraph `section` (1-based).
///
/// A `section` that is zero or past the end is ignored and the whole
/// document is returned. Names with path components, unrecognized types,
/// missing files and files that are not UTF-8 are all reported as
/// [`DocError::NotFound`].
pub async fn get_document_section(
    store: &CorpusStore,
    filename: &str,
    section: Option<usize>,
) -> Result<String, DocError> {
    if filename.trim().is_empty() {
        return Err(DocError::MissingFile);
    }
    if !is_plain_file_name(filename) || !store.is_document(filename) {
        return Err(DocError::NotFound(filename.to_string()));
    }

    let path = store.dir().join(filename);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        // The corpus skips files that are not UTF-8, so they are not documents.
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::InvalidData
            ) =>
        {
            return Err(DocError::NotFound(filename.to_string()));
        }
        Err(e) => {
            return Err(DocError::Io {
                file: filename.to_string(),
                source: e,
            });
        }
    };

    Ok(section
        .and_then(|s| paragraph_at(&content, s))
        .unwrap_or(content))
}

/// Accepts only a single normal path component, so lookups cannot leave
/// the corpus directory.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = std::path::Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// CLI entry point for `ragdesk doc`.
pub async fn run_doc(config: &Config, filename: &str, section: Option<usize>) -> Result<()> {
    let store = CorpusStore::new(&config.corpus)?;
    let text = get_document_section(&store, filename, section).await?;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorpusConfig;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CorpusStore) {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("faq.md"),
            "# FAQ\n\nHow do I reset my password?\n\nUse the login page.",
        )
        .unwrap();
        fs::write(tmp.path().join("notes.txt"), "not a document").unwrap();
        let store = CorpusStore::new(&CorpusConfig {
            dir: tmp.path().to_path_buf(),
            include_globs: vec!["*.md".to_string()],
        })
        .unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn test_whole_document() {
        let (_tmp, store) = setup();
        let text = get_document_section(&store, "faq.md", None).await.unwrap();
        assert!(text.starts_with("# FAQ"));
        assert!(text.ends_with("Use the login page."));
    }

    #[tokio::test]
    async fn test_single_section() {
        let (_tmp, store) = setup();
        let text = get_document_section(&store, "faq.md", Some(2))
            .await
            .unwrap();
        assert_eq!(text, "How do I reset my password?");
    }

    #[tokio::test]
    async fn test_out_of_range_section_returns_whole_document() {
        let (_tmp, store) = setup();
        let whole = get_document_section(&store, "faq.md", None).await.unwrap();
        let text = get_document_section(&store, "faq.md", Some(99))
            .await
            .unwrap();
        assert_eq!(text, whole);
        let text = get_document_section(&store, "faq.md", Some(0)).await.unwrap();
        assert_eq!(text, whole);
    }

    #[tokio::test]
    async fn test_not_found_cases() {
        let (_tmp, store) = setup();
        for name in ["missing.md", "notes.txt", "../faq.md", "sub/faq.md", ".."] {
            let err = get_document_section(&store, name, None).await.unwrap_err();
            assert!(matches!(err, DocError::NotFound(_)), "{}: {:?}", name, err);
        }
        let err = get_document_section(&store, "", None).await.unwrap_err();
        assert!(matches!(err, DocError::MissingFile));
    }

    #[tokio::test]
    async fn test_non_utf8_document_is_not_found() {
        let (tmp, store) = setup();
        fs::write(tmp.path().join("latin1.md"), b"caf\xe9 menu\n").unwrap();

        let err = get_document_section(&store, "latin1.md", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DocError::NotFound(_)), "{:?}", err);
        assert!(store
            .load()
            .await
            .documents
            .iter()
            .all(|d| d.filename != "latin1.md"));
    }
}
