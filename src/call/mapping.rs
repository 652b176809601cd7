//! Meeting mapping records in the blob store
//!
//! A scheduling service leaves one small JSON record per user under
//! `meetingmapping/{userObjectId}` before the recorder joins. When that user
//! shows up on a call, the recorder stamps the call id into the record and
//! uses the meeting id and subject to name the archive.

use crate::error::BlobError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// String get/put/delete by container and key
pub trait BlobStore: Send + Sync {
    fn get(&self, container: &str, key: &str) -> Result<Option<String>, BlobError>;

    fn put(&self, container: &str, key: &str, content: &str) -> Result<(), BlobError>;

    /// Returns whether something was deleted
    fn delete(&self, container: &str, key: &str) -> Result<bool, BlobError>;
}

/// Blob store backed by a directory: `{root}/{container}/{key}`
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, container: &str, key: &str) -> Result<PathBuf, BlobError> {
        for part in [container, key] {
            if part.is_empty()
                || part == "."
                || part == ".."
                || part.contains(['/', '\\'])
            {
                return Err(BlobError::InvalidKey(format!("{}/{}", container, key)));
            }
        }
        Ok(self.root.join(container).join(key))
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, container: &str, key: &str) -> Result<Option<String>, BlobError> {
        let path = self.path(container, key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, container: &str, key: &str, content: &str) -> Result<(), BlobError> {
        let path = self.path(container, key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(())
    }

    fn delete(&self, container: &str, key: &str) -> Result<bool, BlobError> {
        let path = self.path(container, key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Per-user meeting mapping record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MeetingMapping {
    #[serde(default)]
    pub meeting_id: Option<String>,
    #[serde(default)]
    pub meeting_subject: Option<String>,
    #[serde(default, rename = "AgentUPN")]
    pub agent_upn: Option<String>,
    #[serde(default)]
    pub user_object_id: Option<String>,
    #[serde(default)]
    pub call_id: Option<String>,
}

impl MeetingMapping {
    /// Name used for the archive: subject, then meeting id, then the call id
    pub fn display_name<'a>(&'a self, call_id: &'a str) -> &'a str {
        [self.meeting_subject.as_deref(), self.meeting_id.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or(call_id)
    }
}

/// Read a user's mapping record and stamp the call id into it
pub fn claim_meeting_mapping(
    store: &dyn BlobStore,
    container: &str,
    user_object_id: &str,
    call_id: &str,
) -> Result<Option<MeetingMapping>, BlobError> {
    let Some(json) = store.get(container, user_object_id)? else {
        return Ok(None);
    };
    if json.trim().is_empty() {
        return Ok(None);
    }

    let mut mapping: MeetingMapping = serde_json::from_str(&json)?;
    mapping.call_id = Some(call_id.to_string());
    store.put(container, user_object_id, &serde_json::to_string(&mapping)?)?;

    tracing::info!(
        "Call {} mapped to meeting {}",
        call_id,
        mapping.meeting_id.as_deref().unwrap_or("(none)")
    );
    Ok(Some(mapping))
}
