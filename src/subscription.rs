//! Socket subscription manager
//!
//! A call has a small fixed pool of receive-only video sockets and one
//! screen-share socket. This module decides which participant's video is
//! bound to which socket, keeping the most recently active sources when
//! there are more senders than sockets:
//!
//! - a socket id is always either in the free pool or bound to one MSI
//! - binding a socket to an MSI bumps that MSI's serial number, so a
//!   resubscription produces a new recording key
//! - a forced subscription with no free socket evicts the least recently
//!   touched MSI and hands its socket over
//!
//! All decisions are made under one mutex and produce `SocketCommand`s,
//! which are sent to the platform after the lock is released. Bindings that
//! end are queued as `RetiredSource`s for the media pipeline to close.

use crate::error::SubscriptionError;
use crate::media::{MediaKind, Participant, RetiredSource, Roster, SocketLookup};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Dominant speaker value meaning nobody is speaking
pub const DOMINANT_SPEAKER_NONE: u32 = u32::MAX;

/// Requested receive resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoResolution {
    Hd1080p,
    Hd720p,
    Vga,
}

/// Platform socket control
pub trait SocketControl: Send + Sync {
    fn subscribe(
        &self,
        kind: MediaKind,
        msi: u32,
        resolution: VideoResolution,
        socket_id: u32,
    ) -> Result<(), SubscriptionError>;

    fn unsubscribe(&self, kind: MediaKind, socket_id: u32) -> Result<(), SubscriptionError>;
}

/// A platform call decided under the subscription lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketCommand {
    Subscribe {
        kind: MediaKind,
        msi: u32,
        resolution: VideoResolution,
        socket_id: u32,
    },
    Unsubscribe {
        kind: MediaKind,
        socket_id: u32,
    },
}

/// A video source that lost its socket to a forced subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eviction {
    pub msi: u32,
    pub participant_id: Option<String>,
    pub socket_id: u32,
    pub replaced_by: u32,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Share {
    participant_id: String,
    msi: u32,
}

/// Pool, bindings and LRU order of one call
#[derive(Debug)]
struct SubscriptionState {
    capacity: usize,
    /// Free video sockets; the last entry is the most recently freed
    available: Vec<u32>,
    /// Bound MSIs, least recently touched first
    lru: VecDeque<u32>,
    video_sockets: HashMap<u32, u32>,
    /// Last socket each MSI was bound to, kept after release for late buffers
    video_history: HashMap<u32, u32>,
    video_serials: HashMap<u32, u32>,
    video_participants: HashMap<String, u32>,
    vbss_socket: Option<u32>,
    vbss: Option<Share>,
    vbss_serials: HashMap<u32, u32>,
    evictions: Vec<Eviction>,
    retired: Vec<RetiredSource>,
}

fn next_serial(serials: &mut HashMap<u32, u32>, msi: u32) -> u32 {
    let serial = serials.entry(msi).or_insert(0);
    *serial += 1;
    *serial
}

impl SubscriptionState {
    fn new(video_sockets: Vec<u32>, vbss_socket: Option<u32>) -> Self {
        Self {
            capacity: video_sockets.len(),
            available: video_sockets,
            lru: VecDeque::new(),
            video_sockets: HashMap::new(),
            video_history: HashMap::new(),
            video_serials: HashMap::new(),
            video_participants: HashMap::new(),
            vbss_socket,
            vbss: None,
            vbss_serials: HashMap::new(),
            evictions: Vec::new(),
            retired: Vec::new(),
        }
    }

    fn retire_video(&mut self, msi: u32, socket_id: u32) {
        if let Some(serial) = self.video_serials.get(&msi).copied() {
            self.retired.push(RetiredSource {
                kind: MediaKind::Video,
                msi,
                socket_id,
                serial,
            });
        }
    }

    fn retire_share(&mut self, msi: u32) {
        let (Some(socket_id), Some(serial)) =
            (self.vbss_socket, self.vbss_serials.get(&msi).copied())
        else {
            return;
        };
        self.retired.push(RetiredSource {
            kind: MediaKind::Vbss,
            msi,
            socket_id,
            serial,
        });
    }

    fn touch(&mut self, msi: u32) {
        if let Some(pos) = self.lru.iter().position(|m| *m == msi) {
            self.lru.remove(pos);
        }
        self.lru.push_back(msi);
    }

    fn bind(&mut self, participant_id: &str, msi: u32, socket_id: u32, out: &mut Vec<SocketCommand>) {
        let serial = next_serial(&mut self.video_serials, msi);
        self.video_sockets.insert(msi, socket_id);
        self.video_history.insert(msi, socket_id);
        self.video_participants.insert(participant_id.to_string(), msi);
        self.touch(msi);
        tracing::debug!(
            "Video msi {} of {} bound to socket {} (serial {})",
            msi,
            participant_id,
            socket_id,
            serial
        );
        out.push(SocketCommand::Subscribe {
            kind: MediaKind::Video,
            msi,
            resolution: VideoResolution::Hd1080p,
            socket_id,
        });
    }

    /// Unbind an MSI and return its socket to the pool
    fn release(&mut self, msi: u32) -> Option<u32> {
        let socket_id = self.video_sockets.remove(&msi)?;
        if let Some(pos) = self.lru.iter().position(|m| *m == msi) {
            self.lru.remove(pos);
        }
        self.video_participants.retain(|_, m| *m != msi);
        self.available.push(socket_id);
        self.retire_video(msi, socket_id);
        Some(socket_id)
    }

    fn release_participant_video(&mut self, participant_id: &str, out: &mut Vec<SocketCommand>) {
        let Some(msi) = self.video_participants.get(participant_id).copied() else {
            return;
        };
        if let Some(socket_id) = self.release(msi) {
            tracing::debug!("Video msi {} of {} released socket {}", msi, participant_id, socket_id);
            out.push(SocketCommand::Unsubscribe {
                kind: MediaKind::Video,
                socket_id,
            });
        }
    }

    fn plan_video(&mut self, participant: &Participant, force: bool, out: &mut Vec<SocketCommand>) {
        let Some(stream) = participant.sending_stream(MediaKind::Video) else {
            self.release_participant_video(&participant.id, out);
            return;
        };
        let msi = stream.source_id;

        // participant moved to a new source
        if let Some(old) = self.video_participants.get(&participant.id).copied() {
            if old != msi {
                self.release_participant_video(&participant.id, out);
            }
        }

        if self.video_sockets.contains_key(&msi) {
            self.touch(msi);
            return;
        }

        if self.video_sockets.len() < self.capacity {
            match self.available.pop() {
                Some(socket_id) => self.bind(&participant.id, msi, socket_id, out),
                None => tracing::debug!("No free video socket for msi {}", msi),
            }
        } else if force {
            let Some(evicted) = self.lru.pop_front() else {
                return;
            };
            let Some(socket_id) = self.video_sockets.remove(&evicted) else {
                return;
            };
            let owner = self
                .video_participants
                .iter()
                .find(|(_, m)| **m == evicted)
                .map(|(p, _)| p.clone());
            if let Some(owner) = &owner {
                self.video_participants.remove(owner);
            }
            self.retire_video(evicted, socket_id);
            tracing::info!(
                "Evicted video msi {} ({}) from socket {} for msi {}",
                evicted,
                owner.as_deref().unwrap_or("unknown"),
                socket_id,
                msi
            );
            self.evictions.push(Eviction {
                msi: evicted,
                participant_id: owner,
                socket_id,
                replaced_by: msi,
                at: Utc::now(),
            });
            self.bind(&participant.id, msi, socket_id, out);
        } else {
            tracing::debug!(
                "All {} video sockets busy, not subscribing msi {}",
                self.capacity,
                msi
            );
        }
    }

    fn stop_share(&mut self, participant_id: &str, out: &mut Vec<SocketCommand>) {
        if self.vbss.as_ref().map(|s| s.participant_id.as_str()) != Some(participant_id) {
            return;
        }
        if let Some(share) = self.vbss.take() {
            self.retire_share(share.msi);
        }
        if let Some(socket_id) = self.vbss_socket {
            tracing::debug!("Screen share of {} stopped", participant_id);
            out.push(SocketCommand::Unsubscribe {
                kind: MediaKind::Vbss,
                socket_id,
            });
        }
    }

    fn plan_vbss(&mut self, participant: &Participant, out: &mut Vec<SocketCommand>) {
        let Some(stream) = participant.sending_stream(MediaKind::Vbss) else {
            self.stop_share(&participant.id, out);
            return;
        };
        let msi = stream.source_id;

        if self.vbss.as_ref().map(|s| s.msi) == Some(msi) {
            return;
        }
        let Some(socket_id) = self.vbss_socket else {
            tracing::warn!("{}", SubscriptionError::NoVbssSocket);
            return;
        };

        if let Some(previous) = self.vbss.take() {
            tracing::info!(
                "Screen share moved from {} to {}",
                previous.participant_id,
                participant.id
            );
            self.retire_share(previous.msi);
        }
        let serial = next_serial(&mut self.vbss_serials, msi);
        self.vbss = Some(Share {
            participant_id: participant.id.clone(),
            msi,
        });
        tracing::debug!("Screen share msi {} on socket {} (serial {})", msi, socket_id, serial);
        out.push(SocketCommand::Subscribe {
            kind: MediaKind::Vbss,
            msi,
            resolution: VideoResolution::Hd1080p,
            socket_id,
        });
    }

    fn lookup(&self, kind: MediaKind, msi: u32) -> Option<(u32, u32)> {
        match kind {
            MediaKind::Video => {
                let socket_id = self
                    .video_sockets
                    .get(&msi)
                    .or_else(|| self.video_history.get(&msi))?;
                Some((*socket_id, *self.video_serials.get(&msi)?))
            }
            MediaKind::Vbss => Some((self.vbss_socket?, *self.vbss_serials.get(&msi)?)),
            MediaKind::Audio => None,
        }
    }
}

/// Per-call subscription manager
pub struct SubscriptionManager {
    state: Mutex<SubscriptionState>,
    control: Arc<dyn SocketControl>,
}

impl SubscriptionManager {
    /// Manager over the given video socket ids and optional screen-share socket
    pub fn new(video_sockets: Vec<u32>, vbss_socket: Option<u32>, control: Arc<dyn SocketControl>) -> Self {
        Self {
            state: Mutex::new(SubscriptionState::new(video_sockets, vbss_socket)),
            control,
        }
    }

    /// Sockets 0..n for video and n for screen sharing
    pub fn with_socket_count(multiview_sockets: u32, control: Arc<dyn SocketControl>) -> Self {
        Self::new((0..multiview_sockets).collect(), Some(multiview_sockets), control)
    }

    fn lock(&self) -> MutexGuard<'_, SubscriptionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn execute(&self, commands: Vec<SocketCommand>) -> Result<Vec<SocketCommand>, SubscriptionError> {
        let mut first_error = None;
        for command in &commands {
            let result = match *command {
                SocketCommand::Subscribe {
                    kind,
                    msi,
                    resolution,
                    socket_id,
                } => self.control.subscribe(kind, msi, resolution, socket_id),
                SocketCommand::Unsubscribe { kind, socket_id } => {
                    self.control.unsubscribe(kind, socket_id)
                }
            };
            if let Err(e) = result {
                tracing::error!("Socket command {:?} failed: {}", command, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(commands),
        }
    }

    /// Reconcile video and screen-share subscriptions with a participant's streams
    pub fn on_participant_updated(
        &self,
        participant: &Participant,
        force: bool,
    ) -> Result<Vec<SocketCommand>, SubscriptionError> {
        let mut commands = Vec::new();
        {
            let mut state = self.lock();
            state.plan_video(participant, force, &mut commands);
            state.plan_vbss(participant, &mut commands);
        }
        self.execute(commands)
    }

    /// Free everything held by a participant that left
    pub fn on_participant_removed(&self, participant_id: &str) -> Result<Vec<SocketCommand>, SubscriptionError> {
        let mut commands = Vec::new();
        {
            let mut state = self.lock();
            state.release_participant_video(participant_id, &mut commands);
            state.stop_share(participant_id, &mut commands);
        }
        self.execute(commands)
    }

    /// Force the dominant speaker's video onto a socket
    pub fn on_dominant_speaker_changed(
        &self,
        msi: u32,
        roster: &Roster,
    ) -> Result<Vec<SocketCommand>, SubscriptionError> {
        if msi == DOMINANT_SPEAKER_NONE {
            return Ok(Vec::new());
        }
        let Some(participant) = roster.find_by_source(msi) else {
            tracing::debug!("Dominant speaker msi {} has no participant", msi);
            return Ok(Vec::new());
        };
        if participant.in_lobby || !participant.has_user_identity() {
            return Ok(Vec::new());
        }
        tracing::debug!("Dominant speaker is {}", participant.id);
        self.on_participant_updated(&participant, true)
    }

    /// Bound video MSIs with their sockets, least recently touched first
    pub fn video_subscriptions(&self) -> Vec<(u32, u32)> {
        let state = self.lock();
        state
            .lru
            .iter()
            .filter_map(|msi| state.video_sockets.get(msi).map(|s| (*msi, *s)))
            .collect()
    }

    pub fn available_sockets(&self) -> usize {
        self.lock().available.len()
    }

    /// Current screen-share source
    pub fn vbss_source(&self) -> Option<u32> {
        self.lock().vbss.as_ref().map(|s| s.msi)
    }

    pub fn evictions(&self) -> Vec<Eviction> {
        self.lock().evictions.clone()
    }

    /// Bindings that ended since the last call, oldest first
    pub fn take_retired(&self) -> Vec<RetiredSource> {
        std::mem::take(&mut self.lock().retired)
    }
}

impl SocketLookup for SubscriptionManager {
    fn lookup(&self, kind: MediaKind, msi: u32) -> Option<(u32, u32)> {
        self.lock().lookup(kind, msi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaStreamInfo, StreamDirection};

    #[derive(Default)]
    struct RecordingControl {
        calls: Mutex<Vec<SocketCommand>>,
    }

    impl SocketControl for RecordingControl {
        fn subscribe(
            &self,
            kind: MediaKind,
            msi: u32,
            resolution: VideoResolution,
            socket_id: u32,
        ) -> Result<(), SubscriptionError> {
            if kind == MediaKind::Audio {
                return Err(SubscriptionError::InvalidMediaType(kind.to_string()));
            }
            self.calls.lock().unwrap().push(SocketCommand::Subscribe {
                kind,
                msi,
                resolution,
                socket_id,
            });
            Ok(())
        }

        fn unsubscribe(&self, kind: MediaKind, socket_id: u32) -> Result<(), SubscriptionError> {
            self.calls
                .lock()
                .unwrap()
                .push(SocketCommand::Unsubscribe { kind, socket_id });
            Ok(())
        }
    }

    fn sender(id: &str, audio_msi: u32, video_msi: Option<u32>) -> Participant {
        let mut streams = vec![MediaStreamInfo {
            modality: MediaKind::Audio,
            direction: StreamDirection::SendReceive,
            source_id: audio_msi,
        }];
        if let Some(msi) = video_msi {
            streams.push(MediaStreamInfo {
                modality: MediaKind::Video,
                direction: StreamDirection::SendReceive,
                source_id: msi,
            });
        }
        Participant {
            id: id.to_string(),
            user_id: Some(format!("user-{}", id)),
            display_name: Some(id.to_uppercase()),
            media_streams: streams,
            ..Default::default()
        }
    }

    fn sharer(id: &str, msi: u32) -> Participant {
        let mut p = sender(id, 500 + msi, None);
        p.media_streams.push(MediaStreamInfo {
            modality: MediaKind::Vbss,
            direction: StreamDirection::SendOnly,
            source_id: msi,
        });
        p
    }

    fn manager(sockets: u32) -> (SubscriptionManager, Arc<RecordingControl>) {
        let control = Arc::new(RecordingControl::default());
        (SubscriptionManager::with_socket_count(sockets, control.clone()), control)
    }

    #[test]
    fn test_subscribes_most_recently_freed_socket() {
        let (manager, control) = manager(3);

        let commands = manager.on_participant_updated(&sender("a", 1, Some(101)), false).unwrap();
        assert_eq!(
            commands,
            vec![SocketCommand::Subscribe {
                kind: MediaKind::Video,
                msi: 101,
                resolution: VideoResolution::Hd1080p,
                socket_id: 2,
            }]
        );
        assert_eq!(control.calls.lock().unwrap().len(), 1);
        assert_eq!(manager.lookup(MediaKind::Video, 101), Some((2, 1)));
        assert_eq!(manager.available_sockets(), 2);
    }

    #[test]
    fn test_already_mapped_only_touches() {
        let (manager, _) = manager(2);
        manager.on_participant_updated(&sender("a", 1, Some(101)), false).unwrap();
        manager.on_participant_updated(&sender("b", 2, Some(102)), false).unwrap();

        let commands = manager.on_participant_updated(&sender("a", 1, Some(101)), true).unwrap();
        assert!(commands.is_empty());
        // a is now most recent
        let order: Vec<u32> = manager.video_subscriptions().iter().map(|(m, _)| *m).collect();
        assert_eq!(order, vec![102, 101]);
    }

    #[test]
    fn test_full_without_force_is_noop() {
        let (manager, _) = manager(1);
        manager.on_participant_updated(&sender("a", 1, Some(101)), false).unwrap();
        let commands = manager.on_participant_updated(&sender("b", 2, Some(102)), false).unwrap();
        assert!(commands.is_empty());
        assert_eq!(manager.lookup(MediaKind::Video, 102), None);
        assert!(manager.evictions().is_empty());
    }

    #[test]
    fn test_force_evicts_least_recent() {
        let (manager, _) = manager(2);
        manager.on_participant_updated(&sender("a", 1, Some(101)), false).unwrap();
        manager.on_participant_updated(&sender("b", 2, Some(102)), false).unwrap();
        let a_socket = manager.lookup(MediaKind::Video, 101).unwrap().0;
        let b_socket = manager.lookup(MediaKind::Video, 102).unwrap().0;

        let commands = manager.on_participant_updated(&sender("c", 3, Some(103)), true).unwrap();
        assert_eq!(commands.len(), 1);

        let subscribed: Vec<(u32, u32)> = manager.video_subscriptions();
        assert_eq!(subscribed, vec![(102, b_socket), (103, a_socket)]);

        let evictions = manager.evictions();
        assert_eq!(evictions.len(), 1);
        assert_eq!(evictions[0].msi, 101);
        assert_eq!(evictions[0].participant_id.as_deref(), Some("a"));
        assert_eq!(evictions[0].replaced_by, 103);

        assert_eq!(
            manager.take_retired(),
            vec![RetiredSource {
                kind: MediaKind::Video,
                msi: 101,
                socket_id: a_socket,
                serial: 1,
            }]
        );
        assert!(manager.take_retired().is_empty());
    }

    #[test]
    fn test_video_off_releases_and_resubscribe_bumps_serial() {
        let (manager, control) = manager(2);
        manager.on_participant_updated(&sender("a", 1, Some(101)), false).unwrap();
        let (first_socket, first_serial) = manager.lookup(MediaKind::Video, 101).unwrap();

        let commands = manager.on_participant_updated(&sender("a", 1, None), false).unwrap();
        assert_eq!(
            commands,
            vec![SocketCommand::Unsubscribe {
                kind: MediaKind::Video,
                socket_id: first_socket,
            }]
        );
        assert_eq!(manager.available_sockets(), 2);
        assert_eq!(
            manager.take_retired(),
            vec![RetiredSource {
                kind: MediaKind::Video,
                msi: 101,
                socket_id: first_socket,
                serial: first_serial,
            }]
        );
        // late buffers still resolve to the old key
        assert_eq!(manager.lookup(MediaKind::Video, 101), Some((first_socket, first_serial)));

        manager.on_participant_updated(&sender("a", 1, Some(101)), false).unwrap();
        let (_, second_serial) = manager.lookup(MediaKind::Video, 101).unwrap();
        assert_eq!(first_serial, 1);
        assert_eq!(second_serial, 2);
        assert_eq!(control.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_socket_pool_invariant() {
        let (manager, _) = manager(3);
        for i in 0..10u32 {
            manager
                .on_participant_updated(&sender(&format!("p{}", i), i, Some(100 + i)), i % 2 == 0)
                .unwrap();
            if i % 3 == 0 {
                manager.on_participant_removed(&format!("p{}", i.saturating_sub(1))).unwrap();
            }
            let bound: Vec<u32> = manager.video_subscriptions().iter().map(|(_, s)| *s).collect();
            let mut all = bound;
            all.extend(manager.lock().available.iter().copied());
            all.sort_unstable();
            assert_eq!(all, vec![0, 1, 2], "socket lost or duplicated at step {}", i);
        }
    }

    #[test]
    fn test_dominant_speaker_forces_subscription() {
        let (manager, _) = manager(9);
        let roster = Roster::new();
        for i in 0..10u32 {
            let p = sender(&format!("p{}", i), i + 1, Some(100 + i));
            roster.upsert(p.clone());
            if i < 9 {
                manager.on_participant_updated(&p, false).unwrap();
            }
        }
        // p3 and p0 become active, leaving p1 least recent
        manager.on_dominant_speaker_changed(4, &roster).unwrap();
        manager.on_participant_updated(&roster.get("p0").unwrap(), true).unwrap();
        manager.on_dominant_speaker_changed(1, &roster).unwrap();

        // tenth participant speaks
        manager.on_dominant_speaker_changed(10, &roster).unwrap();

        let subscribed = manager.video_subscriptions();
        assert_eq!(subscribed.len(), 9);
        assert!(subscribed.iter().any(|(m, _)| *m == 109));
        assert!(!subscribed.iter().any(|(m, _)| *m == 101));
        assert_eq!(manager.evictions()[0].msi, 101);
    }

    #[test]
    fn test_dominant_speaker_none_and_lobby() {
        let (manager, control) = manager(2);
        let roster = Roster::new();
        let mut waiting = sender("a", 1, Some(101));
        waiting.in_lobby = true;
        roster.upsert(waiting);
        roster.upsert(Participant {
            user_id: None,
            ..sender("b", 2, Some(102))
        });

        manager.on_dominant_speaker_changed(DOMINANT_SPEAKER_NONE, &roster).unwrap();
        manager.on_dominant_speaker_changed(1, &roster).unwrap();
        manager.on_dominant_speaker_changed(2, &roster).unwrap();
        manager.on_dominant_speaker_changed(77, &roster).unwrap();
        assert!(control.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_vbss_single_sharer() {
        let (manager, _) = manager(2);

        let commands = manager.on_participant_updated(&sharer("a", 900), false).unwrap();
        assert_eq!(
            commands,
            vec![SocketCommand::Subscribe {
                kind: MediaKind::Vbss,
                msi: 900,
                resolution: VideoResolution::Hd1080p,
                socket_id: 2,
            }]
        );
        assert_eq!(manager.lookup(MediaKind::Vbss, 900), Some((2, 1)));

        // same share announced again
        assert!(manager.on_participant_updated(&sharer("a", 900), false).unwrap().is_empty());

        // b takes over
        manager.on_participant_updated(&sharer("b", 901), false).unwrap();
        assert_eq!(manager.vbss_source(), Some(901));

        // a stopping is not the current share
        assert!(manager.on_participant_updated(&sender("a", 1, None), false).unwrap().is_empty());

        let commands = manager.on_participant_removed("b").unwrap();
        assert_eq!(
            commands,
            vec![SocketCommand::Unsubscribe {
                kind: MediaKind::Vbss,
                socket_id: 2,
            }]
        );
        assert_eq!(manager.vbss_source(), None);

        let retired: Vec<(u32, u32)> = manager
            .take_retired()
            .iter()
            .map(|r| (r.msi, r.serial))
            .collect();
        assert_eq!(retired, vec![(900, 1), (901, 1)]);

        manager.on_participant_updated(&sharer("a", 900), false).unwrap();
        assert_eq!(manager.lookup(MediaKind::Vbss, 900), Some((2, 2)));
    }

    struct RejectingControl;

    impl SocketControl for RejectingControl {
        fn subscribe(
            &self,
            _kind: MediaKind,
            msi: u32,
            _resolution: VideoResolution,
            _socket_id: u32,
        ) -> Result<(), SubscriptionError> {
            Err(SubscriptionError::Platform(format!("msi {} not available", msi)))
        }

        fn unsubscribe(&self, _kind: MediaKind, _socket_id: u32) -> Result<(), SubscriptionError> {
            Ok(())
        }
    }

    #[test]
    fn test_platform_rejection_is_reported() {
        let manager = SubscriptionManager::with_socket_count(2, Arc::new(RejectingControl));

        let err = manager
            .on_participant_updated(&sender("a", 1, Some(101)), false)
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Platform(_)));
        // the binding stands so buffers that do arrive still get a key
        assert_eq!(manager.lookup(MediaKind::Video, 101), Some((1, 1)));
    }

    #[test]
    fn test_audio_lookup_is_none() {
        let (manager, _) = manager(1);
        assert_eq!(manager.lookup(MediaKind::Audio, 1), None);
    }
}
