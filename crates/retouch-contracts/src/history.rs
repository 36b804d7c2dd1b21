use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::artifact::ImageArtifact;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: String,
    pub thumbnail: ImageArtifact,
    pub created_at: DateTime<Utc>,
}

/// Append-only, in-memory record of explicitly saved artifacts, newest first.
///
/// There is no removal and no de-duplication: saving the same artifact twice
/// yields two entries with distinct ids. Timestamps never go backwards even
/// if the wall clock does.
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, artifact: ImageArtifact) -> HistoryEntry {
        let now = Utc::now();
        let created_at = match self.entries.front() {
            Some(newest) if newest.created_at > now => newest.created_at,
            _ => now,
        };
        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            thumbnail: artifact,
            created_at,
        };
        self.entries.push_front(entry.clone());
        entry
    }

    /// All entries, newest first.
    pub fn list(&self) -> Vec<&HistoryEntry> {
        self.entries.iter().collect()
    }

    pub fn recent(&self, limit: usize) -> Vec<&HistoryEntry> {
        self.entries.iter().take(limit).collect()
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
