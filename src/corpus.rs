//! Corpus store: loads documents from a directory and caches them by the
//! directory's modification time.
//!
//! The cache holds one [`CorpusSnapshot`] behind an `Arc`. A refresh builds a
//! complete new snapshot and swaps the pointer, so a request that already
//! holds the old snapshot keeps a consistent view. Concurrent refreshes may
//! both scan the directory; the last one to finish wins.
//!
//! Staleness: only the directory mtime is compared. Edits that do not touch
//! the directory entry, or that land within the same timestamp tick, are not
//! seen until the next directory change.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chunk::split_paragraphs;
use crate::config::CorpusConfig;
use crate::models::{CorpusSnapshot, Document};

pub struct CorpusStore {
    dir: PathBuf,
    include: GlobSet,
    cached: RwLock<Option<Arc<CorpusSnapshot>>>,
    scans: AtomicU64,
}

impl CorpusStore {
    pub fn new(config: &CorpusConfig) -> Result<Self> {
        Ok(Self {
            dir: config.dir.clone(),
            include: build_globset(&config.include_globs)?,
            cached: RwLock::new(None),
            scans: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a bare file name has a recognized document type.
    pub fn is_document(&self, filename: &str) -> bool {
        self.include.is_match(filename)
    }

    /// Number of full directory scans performed so far.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Returns the current snapshot, rescanning only when the directory
    /// mtime differs from the cached one.
    ///
    /// Never fails: an unreadable directory yields an empty snapshot and
    /// unreadable files are skipped.
    pub async fn load(&self) -> Arc<CorpusSnapshot> {
        let version = match directory_version(&self.dir).await {
            Ok(v) => v,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to read corpus directory");
                return Arc::new(CorpusSnapshot::empty());
            }
        };

        if let Some(snapshot) = self.cached() {
            if snapshot.source_version == Some(version) {
                return snapshot;
            }
        }

        let dir = self.dir.clone();
        let include = self.include.clone();
        let scanned = tokio::task::spawn_blocking(move || scan_corpus(&dir, &include)).await;

        let documents = match scanned {
            Ok(Ok(documents)) => documents,
            Ok(Err(e)) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to read corpus directory");
                return Arc::new(CorpusSnapshot::empty());
            }
            Err(e) => {
                warn!(error = %e, "Corpus scan task failed");
                return Arc::new(CorpusSnapshot::empty());
            }
        };

        self.scans.fetch_add(1, Ordering::Relaxed);
        let snapshot = Arc::new(CorpusSnapshot {
            documents,
            source_version: Some(version),
        });
        debug!(
            documents = snapshot.documents.len(),
            paragraphs = snapshot.paragraph_count(),
            "Corpus snapshot refreshed"
        );

        *self.cached.write().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        snapshot
    }

    fn cached(&self) -> Option<Arc<CorpusSnapshot>> {
        self.cached
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

async fn directory_version(dir: &Path) -> std::io::Result<SystemTime> {
    tokio::fs::metadata(dir).await?.modified()
}

/// Reads every recognized document directly inside `dir`, sorted by file name.
///
/// Fails only when the directory itself cannot be listed. Individual files
/// that cannot be read are logged and skipped.
pub fn scan_corpus(dir: &Path, include: &GlobSet) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let filename = entry.file_name().to_string_lossy().to_string();
        if !include.is_match(&filename) {
            continue;
        }

        match std::fs::read_to_string(entry.path()) {
            Ok(raw_content) => documents.push(Document {
                id: filename.clone(),
                paragraphs: split_paragraphs(&raw_content),
                filename,
                raw_content,
            }),
            Err(e) => {
                warn!(file = %filename, error = %e, "Failed to load document, skipping");
            }
        }
    }

    Ok(documents)
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
