//! Configuration sources.
//!
//! A source stores one document per `(document_id, group)` pair and pushes
//! changes to subscribers. The loader only talks to this trait; the crate
//! ships an in-memory source and a file-backed one (`watcher.rs`).
//!
//! # Design Decisions
//! - Callbacks receive `Result` so transport failures reach the loader
//!   instead of disappearing inside the source
//! - Dropping a `Subscription` unsubscribes
//! - Callbacks run outside any source lock and may call back into the source

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;

/// Errors reported by configuration sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("document `{document_id}` not found in group `{group}`")]
    NotFound { document_id: String, group: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Receives the new content of a document, or a transport error.
pub type ChangeCallback = Arc<dyn Fn(Result<Vec<u8>, SourceError>) + Send + Sync>;

/// Handle keeping a subscription alive. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Unsubscribe now instead of on drop.
    pub fn cancel(&self) {
        let cancel = match self.cancel.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(cancel) = cancel {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Storage and change feed for configuration documents.
pub trait ConfigSource: Send + Sync {
    /// Groups holding `document_id`, sorted.
    fn groups(&self, document_id: &str) -> Result<Vec<String>, SourceError>;

    /// Current content of a document.
    fn fetch(&self, document_id: &str, group: &str) -> Result<Vec<u8>, SourceError>;

    /// Watch a document for changes.
    fn subscribe(
        &self,
        document_id: &str,
        group: &str,
        callback: ChangeCallback,
    ) -> Result<Subscription, SourceError>;

    /// Replace a document's content.
    fn publish(&self, document_id: &str, group: &str, content: &[u8]) -> Result<(), SourceError>;
}

type DocumentKey = (String, String);
type Subscribers = DashMap<DocumentKey, Vec<(u64, ChangeCallback)>>;

fn key(document_id: &str, group: &str) -> DocumentKey {
    (document_id.to_string(), group.to_string())
}

/// In-process source. `publish` notifies subscribers before returning.
#[derive(Default)]
pub struct MemorySource {
    documents: DashMap<DocumentKey, Vec<u8>>,
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without notifying anyone.
    pub fn insert(&self, document_id: &str, group: &str, content: impl Into<Vec<u8>>) {
        self.documents.insert(key(document_id, group), content.into());
    }

    /// Deliver a transport error to the document's subscribers.
    pub fn report_error(&self, document_id: &str, group: &str, message: &str) {
        for callback in self.callbacks(&key(document_id, group)) {
            callback(Err(SourceError::Transport(message.to_string())));
        }
    }

    pub fn subscriber_count(&self, document_id: &str, group: &str) -> usize {
        self.subscribers
            .get(&key(document_id, group))
            .map_or(0, |subs| subs.len())
    }

    fn callbacks(&self, key: &DocumentKey) -> Vec<ChangeCallback> {
        self.subscribers
            .get(key)
            .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default()
    }
}

impl ConfigSource for MemorySource {
    fn groups(&self, document_id: &str) -> Result<Vec<String>, SourceError> {
        let mut groups: Vec<String> = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == document_id)
            .map(|entry| entry.key().1.clone())
            .collect();
        groups.sort();
        Ok(groups)
    }

    fn fetch(&self, document_id: &str, group: &str) -> Result<Vec<u8>, SourceError> {
        self.documents
            .get(&key(document_id, group))
            .map(|doc| doc.value().clone())
            .ok_or_else(|| SourceError::NotFound {
                document_id: document_id.to_string(),
                group: group.to_string(),
            })
    }

    fn subscribe(
        &self,
        document_id: &str,
        group: &str,
        callback: ChangeCallback,
    ) -> Result<Subscription, SourceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let doc_key = key(document_id, group);
        self.subscribers
            .entry(doc_key.clone())
            .or_default()
            .push((id, callback));

        let subscribers: Weak<Subscribers> = Arc::downgrade(&self.subscribers);
        Ok(Subscription::new(move || {
            if let Some(subscribers) = subscribers.upgrade() {
                if let Some(mut subs) = subscribers.get_mut(&doc_key) {
                    subs.retain(|(sub_id, _)| *sub_id != id);
                }
            }
        }))
    }

    fn publish(&self, document_id: &str, group: &str, content: &[u8]) -> Result<(), SourceError> {
        let doc_key = key(document_id, group);
        self.documents.insert(doc_key.clone(), content.to_vec());

        for callback in self.callbacks(&doc_key) {
            callback(Ok(content.to_vec()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySource")
            .field("documents", &self.documents.len())
            .finish_non_exhaustive()
    }
}
