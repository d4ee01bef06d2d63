use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::models::cost::TimeWindow;
use crate::core::models::usage::UsageEvent;

/// Read-only source of usage events. Implementations are injected into
/// whatever needs events; there is no global store.
pub trait EventStore {
    /// Events for `owner` (all owners when `None`) whose timestamp falls in
    /// `window`, oldest first.
    fn events_in(&self, owner: Option<&str>, window: &TimeWindow) -> Result<Vec<UsageEvent>>;
}

fn select(events: &[UsageEvent], owner: Option<&str>, window: &TimeWindow) -> Vec<UsageEvent> {
    let mut selected: Vec<UsageEvent> = events
        .iter()
        .filter(|e| owner.map_or(true, |o| e.owner_id == o))
        .filter(|e| window.contains(&e.timestamp))
        .cloned()
        .collect();
    selected.sort_by_key(|e| e.timestamp);
    selected
}

/// Store over events already in memory, e.g. test fixtures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    events: Vec<UsageEvent>,
}

impl InMemoryEventStore {
    pub fn new(events: Vec<UsageEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventStore for InMemoryEventStore {
    fn events_in(&self, owner: Option<&str>, window: &TimeWindow) -> Result<Vec<UsageEvent>> {
        Ok(select(&self.events, owner, window))
    }
}

/// Store backed by a JSON Lines file, one event object per line.
///
/// The file is re-read on every query. Blank lines are ignored and lines that
/// fail to parse or validate are skipped with a warning.
#[derive(Debug, Clone)]
pub struct JsonlEventStore {
    path: PathBuf,
}

/// Events parsed from a file plus the number of lines rejected.
#[derive(Debug, Clone, Default)]
pub struct ParsedEvents {
    pub events: Vec<UsageEvent>,
    pub rejected: usize,
}

impl JsonlEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the whole file.
    pub fn load(&self) -> Result<ParsedEvents> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let reader = std::io::BufReader::new(file);

        let mut parsed = ParsedEvents::default();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line
                .with_context(|| format!("Failed to read {}", self.path.display()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }
            match serde_json::from_str::<UsageEvent>(trimmed) {
                Ok(event) => parsed.events.push(event),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = line_no + 1,
                        error = %e,
                        "skipping malformed usage event"
                    );
                    parsed.rejected += 1;
                }
            }
        }

        debug!(
            path = %self.path.display(),
            events = parsed.events.len(),
            rejected = parsed.rejected,
            "loaded usage events"
        );
        Ok(parsed)
    }
}

impl EventStore for JsonlEventStore {
    fn events_in(&self, owner: Option<&str>, window: &TimeWindow) -> Result<Vec<UsageEvent>> {
        let parsed = self.load()?;
        Ok(select(&parsed.events, owner, window))
    }
}
