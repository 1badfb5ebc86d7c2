//! Corpus extraction: turns backing-store rows into flat text documents.

mod sql;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sql::{render_faq, render_ticket, SqlCorpusExtractor};

/// One named category of source documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corpus {
    Faq,
    Ticket,
}

impl Corpus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Corpus::Faq => "faq",
            Corpus::Ticket => "ticket",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "faq" => Some(Corpus::Faq),
            "ticket" => Some(Corpus::Ticket),
            _ => None,
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered source row. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub corpus: Corpus,
}

impl Document {
    pub fn new(corpus: Corpus, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            corpus,
        }
    }
}

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("backing store for the {corpus} corpus is unreachable: {message}")]
    Unreachable { corpus: Corpus, message: String },
    #[error("query for the {corpus} corpus failed: {message}")]
    Query { corpus: Corpus, message: String },
}

/// Row source for a corpus. Not retried here; callers decide what a failure
/// means (fatal at start-up, failed rebuild afterwards).
#[async_trait]
pub trait CorpusExtractor: Send + Sync {
    async fn extract(&self, corpus: Corpus) -> Result<Vec<Document>, DataSourceError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Extractor over in-memory documents; a corpus can be switched to fail.
    #[derive(Default)]
    pub(crate) struct StaticExtractor {
        documents: Mutex<HashMap<Corpus, Vec<Document>>>,
        failing: Mutex<Vec<Corpus>>,
        calls: AtomicUsize,
    }

    impl StaticExtractor {
        pub(crate) fn new(faq: &[&str], tickets: &[&str]) -> Self {
            let extractor = Self::default();
            extractor.set(Corpus::Faq, faq);
            extractor.set(Corpus::Ticket, tickets);
            extractor
        }

        pub(crate) fn set(&self, corpus: Corpus, contents: &[&str]) {
            let documents = contents
                .iter()
                .map(|content| Document::new(corpus, *content))
                .collect();
            self.documents
                .lock()
                .unwrap()
                .insert(corpus, documents);
        }

        pub(crate) fn fail(&self, corpus: Corpus, failing: bool) {
            let mut guard = self.failing.lock().unwrap();
            guard.retain(|c| *c != corpus);
            if failing {
                guard.push(corpus);
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CorpusExtractor for StaticExtractor {
        async fn extract(&self, corpus: Corpus) -> Result<Vec<Document>, DataSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.lock().unwrap().contains(&corpus) {
                return Err(DataSourceError::Unreachable {
                    corpus,
                    message: "connection refused".to_string(),
                });
            }
            Ok(self
                .documents
                .lock()
                .unwrap()
                .get(&corpus)
                .cloned()
                .unwrap_or_default())
        }
    }
}
