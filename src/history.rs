//! Bounded history of submitted questions.
//!
//! Most recent first; re-submitting a question moves it to the front. The
//! list is persisted as JSON Lines, one record per question.

use crate::error::Text2SqlResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    capacity: usize,
    entries: Vec<HistoryEntry>,
}

impl HistoryStore {
    /// Open the history file. A missing or unreadable file yields an empty
    /// history; malformed lines are skipped.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let entries = match load(&path) {
            Ok(mut entries) => {
                entries.truncate(capacity);
                entries
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not load history");
                Vec::new()
            }
        };
        Self {
            path,
            capacity,
            entries,
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Up to `n` most recent questions.
    pub fn recent(&self, n: usize) -> Vec<&str> {
        self.entries.iter().take(n).map(|e| e.query.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `query` at the front and persist.
    pub fn push(&mut self, query: &str) -> Text2SqlResult<()> {
        self.entries.retain(|e| e.query != query);
        self.entries.insert(
            0,
            HistoryEntry {
                query: query.to_string(),
                submitted_at: Utc::now(),
            },
        );
        self.entries.truncate(self.capacity);
        self.save()
    }

    pub fn clear(&mut self) -> Text2SqlResult<()> {
        self.entries.clear();
        self.save()
    }

    fn save(&self) -> Text2SqlResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&self.path)?;
        for entry in &self.entries {
            serde_json::to_writer(&mut file, entry)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(())
    }
}

fn load(path: &Path) -> Text2SqlResult<Vec<HistoryEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(fs::File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(error = %e, "skipping malformed history line"),
        }
    }
    Ok(entries)
}
