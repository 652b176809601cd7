//! Per-call registry of produced recording files
//!
//! Each processor records the files it creates here; the completion
//! checker reads snapshots while the processors are still running, and the
//! packager serializes the final list as `recordingFileInfoList.json`.

use crate::error::PackagingError;
use crate::media::MediaKind;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Manifest file name written into the call directory
pub const MANIFEST_FILE_NAME: &str = "recordingFileInfoList.json";

/// Audio key of the mixed channel
pub const ALL_SPEAKERS_KEY: &str = "all";

/// Platform timestamps are 100-ns ticks
const TICKS_PER_SECOND: i64 = 10_000_000;

/// One produced output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordingFileInfo {
    pub key: String,
    pub file_type: MediaKind,
    pub file_name: String,
    /// Earliest buffer timestamp (ticks), 0 until the first buffer
    pub recording_start_time: i64,
    /// Latest buffer timestamp (ticks)
    pub recording_end_time: i64,
    /// Buffers written to the file over the whole call
    pub frame_count: u64,
    pub is_process_done: bool,
}

impl RecordingFileInfo {
    /// Create an entry for a key; the file name follows from the kind
    pub fn new(kind: MediaKind, key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            file_name: kind.file_name(&key),
            key,
            file_type: kind,
            recording_start_time: 0,
            recording_end_time: 0,
            frame_count: 0,
            is_process_done: false,
        }
    }

    /// Widen the recorded interval to include a timestamp
    pub fn set_recording_time(&mut self, timestamp: i64) {
        if self.recording_start_time == 0 || timestamp < self.recording_start_time {
            self.recording_start_time = timestamp;
        }
        if timestamp > self.recording_end_time {
            self.recording_end_time = timestamp;
        }
    }

    /// Length of the recorded interval in whole seconds
    pub fn during_seconds(&self) -> i64 {
        (self.recording_end_time - self.recording_start_time) / TICKS_PER_SECOND
    }

    pub fn start_datetime(&self) -> DateTime<Utc> {
        ticks_to_datetime(self.recording_start_time)
    }

    pub fn end_datetime(&self) -> DateTime<Utc> {
        ticks_to_datetime(self.recording_end_time)
    }
}

/// Convert platform ticks (100 ns since the Unix epoch) to a UTC time
pub fn ticks_to_datetime(ticks: i64) -> DateTime<Utc> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .unwrap_or_default()
}

/// Thread-safe list of `RecordingFileInfo` for one call
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    entries: Mutex<Vec<RecordingFileInfo>>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RecordingFileInfo>> {
        // a panicking processor must not take the checker down with it
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a written buffer for a key, creating the entry on first use
    ///
    /// Returns true when the entry was created. Data arriving for an entry
    /// that was already finalized marks it incomplete again; the frame count
    /// keeps growing across lane restarts.
    pub fn record_buffer(&self, kind: MediaKind, key: &str, timestamp: i64) -> bool {
        let mut entries = self.lock();
        let created = match entries
            .iter_mut()
            .find(|e| e.file_type == kind && e.key == key)
        {
            Some(entry) => {
                entry.set_recording_time(timestamp);
                entry.frame_count += 1;
                entry.is_process_done = false;
                false
            }
            None => {
                let mut entry = RecordingFileInfo::new(kind, key);
                entry.set_recording_time(timestamp);
                entry.frame_count = 1;
                entries.push(entry);
                true
            }
        };
        if created {
            tracing::debug!("Registered {} recording '{}'", kind, key);
        }
        created
    }

    /// Mark a finalized file complete
    pub fn mark_done(&self, kind: MediaKind, key: &str) -> bool {
        let mut entries = self.lock();
        match entries
            .iter_mut()
            .find(|e| e.file_type == kind && e.key == key)
        {
            Some(entry) => {
                entry.is_process_done = true;
                true
            }
            None => false,
        }
    }

    /// Copy of all entries
    pub fn snapshot(&self) -> Vec<RecordingFileInfo> {
        self.lock().clone()
    }

    pub fn get(&self, kind: MediaKind, key: &str) -> Option<RecordingFileInfo> {
        self.lock()
            .iter()
            .find(|e| e.file_type == kind && e.key == key)
            .cloned()
    }

    /// The mixed audio entry, or the first audio entry if there is no mix
    pub fn audio_entry(&self) -> Option<RecordingFileInfo> {
        let entries = self.lock();
        entries
            .iter()
            .find(|e| e.file_type == MediaKind::Audio && e.key == ALL_SPEAKERS_KEY)
            .or_else(|| entries.iter().find(|e| e.file_type == MediaKind::Audio))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Write the manifest into a call directory
    pub fn save_manifest(&self, call_dir: &Path) -> Result<std::path::PathBuf, PackagingError> {
        let path = call_dir.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_string(&self.snapshot())?;
        std::fs::create_dir_all(call_dir)?;
        std::fs::write(&path, json)?;
        tracing::debug!("Wrote manifest: {:?}", path);
        Ok(path)
    }

    /// Rebuild a registry from a manifest left on disk
    pub fn load_manifest(call_dir: &Path) -> Result<Self, PackagingError> {
        let contents = std::fs::read_to_string(call_dir.join(MANIFEST_FILE_NAME))?;
        let entries: Vec<RecordingFileInfo> = serde_json::from_str(&contents)?;
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }
}
