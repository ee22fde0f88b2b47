//! File-backed configuration source with change watching.
//!
//! Layout on disk: `<root>/<group>/<document_id>`. Each group directory is
//! watched separately so a subscription only hears about its own document.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::source::{ChangeCallback, ConfigSource, SourceError, Subscription};

/// A source reading documents from a directory tree.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
    poll_interval: Duration,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Poll interval for watcher backends that poll.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a document within a group.
    pub fn path(&self, document_id: &str, group: &str) -> PathBuf {
        self.root.join(group).join(document_id)
    }
}

impl ConfigSource for FileSource {
    fn groups(&self, document_id: &str) -> Result<Vec<String>, SourceError> {
        let mut groups = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if !entry.path().join(document_id).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                groups.push(name.to_string());
            }
        }
        groups.sort();
        Ok(groups)
    }

    fn fetch(&self, document_id: &str, group: &str) -> Result<Vec<u8>, SourceError> {
        fs::read(self.path(document_id, group)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound {
                document_id: document_id.to_string(),
                group: group.to_string(),
            },
            _ => SourceError::Io(e),
        })
    }

    fn subscribe(
        &self,
        document_id: &str,
        group: &str,
        callback: ChangeCallback,
    ) -> Result<Subscription, SourceError> {
        let dir = self.root.join(group);
        let path = self.path(document_id, group);
        let file_name = path.file_name().map(|name| name.to_os_string());

        let watched = path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let touches_document = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !touches_document {
                        return;
                    }
                    tracing::debug!(path = ?watched, "Config document change detected");
                    callback(fs::read(&watched).map_err(SourceError::Io));
                }
                Err(e) => callback(Err(SourceError::Watch(e))),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Config watcher started");

        Ok(Subscription::new(move || {
            let mut watcher = watcher;
            if let Err(e) = watcher.unwatch(&dir) {
                tracing::debug!(path = ?dir, error = %e, "Config watcher already stopped");
            }
        }))
    }

    fn publish(&self, document_id: &str, group: &str, content: &[u8]) -> Result<(), SourceError> {
        let dir = self.root.join(group);
        fs::create_dir_all(&dir)?;

        // Write next to the target and rename so watchers never read a
        // half-written document.
        let temp = dir.join(format!(".{document_id}.tmp"));
        fs::write(&temp, content)?;
        fs::rename(&temp, self.path(document_id, group))?;
        Ok(())
    }
}
