//! Shared participant roster of a call

use super::buffer::{participant_for_source, Participant};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Participants currently tracked on a call
///
/// Cloning shares the same roster. Readers are the media callbacks
/// (attribution at copy time) and the subscription logic.
#[derive(Debug, Default, Clone)]
pub struct Roster {
    inner: Arc<RwLock<Vec<Participant>>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Participant>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Participant>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a participant by id; returns true if it was new
    pub fn upsert(&self, participant: Participant) -> bool {
        let mut participants = self.write();
        match participants.iter_mut().find(|p| p.id == participant.id) {
            Some(existing) => {
                *existing = participant;
                false
            }
            None => {
                participants.push(participant);
                true
            }
        }
    }

    pub fn remove(&self, id: &str) -> Option<Participant> {
        let mut participants = self.write();
        let index = participants.iter().position(|p| p.id == id)?;
        Some(participants.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<Participant> {
        self.read().iter().find(|p| p.id == id).cloned()
    }

    /// Participant owning a media source id
    pub fn find_by_source(&self, source_id: u32) -> Option<Participant> {
        participant_for_source(&self.read(), source_id).cloned()
    }

    /// Run a closure against the current participants without cloning them
    pub fn with<R>(&self, f: impl FnOnce(&[Participant]) -> R) -> R {
        f(&self.read())
    }

    pub fn snapshot(&self) -> Vec<Participant> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaKind, MediaStreamInfo, StreamDirection};

    fn participant(id: &str, msi: u32) -> Participant {
        Participant {
            id: id.to_string(),
            user_id: Some(format!("user-{}", id)),
            media_streams: vec![MediaStreamInfo {
                modality: MediaKind::Video,
                direction: StreamDirection::SendReceive,
                source_id: msi,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_and_remove() {
        let roster = Roster::new();
        assert!(roster.upsert(participant("a", 1)));
        assert!(!roster.upsert(participant("a", 2)));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.find_by_source(2).map(|p| p.id), Some("a".to_string()));
        assert!(roster.find_by_source(1).is_none());

        let shared = roster.clone();
        assert!(shared.remove("a").is_some());
        assert!(roster.is_empty());
    }
}
