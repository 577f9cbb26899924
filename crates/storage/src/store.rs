// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Journey persistence and the completion ledger.

use jx_core::{CompletionRecord, Journey, JourneyId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from store operations.
///
/// Callers log these and continue on in-memory state; persistence failures
/// never abort the service.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

const JOURNEYS_DIR: &str = "journeys";
const LEDGER_FILE: &str = "completions.jsonl";

/// Durable persistence for live journeys plus the per-(user, campaign)
/// completion ledger.
///
/// Journey writes are atomic (temp file + rename). Corrupt or unreadable
/// records are treated as absent on read: a half-written file from a crash
/// costs one journey, not the store.
pub struct JourneyStore {
    root: PathBuf,
    cache: Mutex<HashMap<JourneyId, Journey>>,
    /// (distinct_id, campaign_id) → completion times, in append order.
    completions: Mutex<HashMap<(String, String), Vec<u64>>>,
}

impl JourneyStore {
    /// Open (or create) a store rooted at `root`, rebuilding the completion
    /// index from the ledger.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(JOURNEYS_DIR))?;
        let completions = read_ledger(&root.join(LEDGER_FILE));
        Ok(Self {
            root,
            cache: Mutex::new(HashMap::new()),
            completions: Mutex::new(completions),
        })
    }

    fn journey_path(&self, id: &JourneyId) -> PathBuf {
        self.root.join(JOURNEYS_DIR).join(format!("{id}.json"))
    }

    /// Persist a journey snapshot, overwriting any prior copy.
    pub fn save_journey(&self, journey: &Journey) -> Result<(), StoreError> {
        let path = self.journey_path(&journey.id);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(journey)?;
        fs::write(&tmp, &data)?;
        fs::rename(&tmp, &path)?;
        self.cache.lock().insert(journey.id, journey.clone());
        tracing::debug!(journey_id = %journey.id, status = %journey.status, "saved journey");
        Ok(())
    }

    /// Remove the persisted copy of a journey (terminal transition).
    pub fn delete_journey(&self, id: &JourneyId) -> Result<(), StoreError> {
        self.cache.lock().remove(id);
        match fs::remove_file(self.journey_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read all persisted journeys that are still live. Corrupt files are
    /// logged and skipped.
    pub fn load_active_journeys(&self) -> Result<Vec<Journey>, StoreError> {
        let mut journeys = Vec::new();
        for entry in fs::read_dir(self.root.join(JOURNEYS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_journey(&path) {
                Some(journey) if journey.is_live() => journeys.push(journey),
                _ => {}
            }
        }
        journeys.sort_by_key(|j| j.id);
        let mut cache = self.cache.lock();
        for journey in &journeys {
            cache.insert(journey.id, journey.clone());
        }
        Ok(journeys)
    }

    /// Live persisted journeys for one user (identity transitions).
    pub fn load_journeys_for(&self, distinct_id: &str) -> Result<Vec<Journey>, StoreError> {
        Ok(self
            .load_active_journeys()?
            .into_iter()
            .filter(|j| j.distinct_id == distinct_id)
            .collect())
    }

    /// Append a terminal record to the completion ledger.
    pub fn record_completion(&self, record: &CompletionRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(LEDGER_FILE))?;
        file.write_all(&line)?;
        self.completions
            .lock()
            .entry((record.distinct_id.clone(), record.campaign_id.clone()))
            .or_default()
            .push(record.completed_at);
        Ok(())
    }

    pub fn has_completed_campaign(&self, distinct_id: &str, campaign_id: &str) -> bool {
        self.completions
            .lock()
            .get(&(distinct_id.to_string(), campaign_id.to_string()))
            .is_some_and(|times| !times.is_empty())
    }

    /// Most recent completion time for a (user, campaign).
    pub fn last_completion_time(&self, distinct_id: &str, campaign_id: &str) -> Option<u64> {
        self.completions
            .lock()
            .get(&(distinct_id.to_string(), campaign_id.to_string()))
            .and_then(|times| times.iter().max().copied())
    }

    /// Cached live journey ids for a (user, campaign).
    pub fn active_journey_ids(&self, distinct_id: &str, campaign_id: &str) -> Vec<JourneyId> {
        let mut ids: Vec<JourneyId> = self
            .cache
            .lock()
            .values()
            .filter(|j| {
                j.is_live() && j.distinct_id == distinct_id && j.campaign_id == campaign_id
            })
            .map(|j| j.id)
            .collect();
        ids.sort();
        ids
    }

    /// Refresh the cached copy of a journey without touching disk.
    pub fn update_cache(&self, journey: &Journey) {
        self.cache.lock().insert(journey.id, journey.clone());
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

fn read_journey(path: &Path) -> Option<Journey> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable journey file");
            return None;
        }
    };
    match serde_json::from_slice(&data) {
        Ok(journey) => Some(journey),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt journey file, skipping");
            None
        }
    }
}

fn read_ledger(path: &Path) -> HashMap<(String, String), Vec<u64>> {
    let mut index: HashMap<(String, String), Vec<u64>> = HashMap::new();
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return index,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable completion ledger");
            return index;
        }
    };
    for line in data.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<CompletionRecord>(line) {
            Ok(record) => index
                .entry((record.distinct_id, record.campaign_id))
                .or_default()
                .push(record.completed_at),
            Err(e) => {
                tracing::warn!(error = %e, "corrupt ledger line, skipping");
            }
        }
    }
    index
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
