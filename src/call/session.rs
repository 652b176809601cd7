//! One recorded call
//!
//! `CallSession` owns everything scoped to a single call: the roster, the
//! recording registry, the socket subscriptions and the media pipeline. The
//! platform adapter forwards roster and dominant speaker notifications to it
//! and calls [`CallSession::terminate`] once the call has ended.

use super::events::{AudioQualityReport, EventCapture, ParticipantEvent, RosterChange};
use super::mapping::{claim_meeting_mapping, BlobStore, MeetingMapping};
use super::packaging::{PackageReport, Packager};
use crate::config::Config;
use crate::error::{RecorderError, Result};
use crate::media::{IngressHandle, MediaStreamCoordinator, Participant, Roster};
use crate::recording::{CallLayout, RecordingRegistry};
use crate::subscription::{Eviction, SocketControl, SubscriptionManager};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Established,
    Terminated,
}

#[derive(Debug, Clone)]
struct ClaimedMapping {
    user_object_id: String,
    mapping: MeetingMapping,
}

pub struct CallSession {
    call_id: String,
    layout: CallLayout,
    registry: Arc<RecordingRegistry>,
    roster: Roster,
    subscriptions: Arc<SubscriptionManager>,
    coordinator: Arc<MediaStreamCoordinator>,
    blob_store: Arc<dyn BlobStore>,
    mapping_container: String,
    mapping: Mutex<Option<ClaimedMapping>>,
    events: Option<EventCapture>,
    state: Mutex<CallState>,
}

impl CallSession {
    /// Set up a session for an established call
    pub fn new(
        call_id: impl Into<String>,
        config: &Config,
        control: Arc<dyn SocketControl>,
        blob_store: Arc<dyn BlobStore>,
    ) -> Self {
        let call_id = call_id.into();
        let layout = CallLayout::new(&config.output, &call_id);
        let registry = Arc::new(RecordingRegistry::new());
        let subscriptions = Arc::new(SubscriptionManager::with_socket_count(
            config.sockets.multiview_sockets,
            control,
        ));
        let coordinator = Arc::new(MediaStreamCoordinator::new(
            &layout,
            &config.media,
            registry.clone(),
            subscriptions.clone(),
        ));
        let events = config
            .packaging
            .capture_events
            .then(|| EventCapture::new(config.output.events_dir(&call_id)));

        tracing::info!("Call {} established, recording to {:?}", call_id, layout.call_dir);

        Self {
            call_id,
            layout,
            registry,
            roster: Roster::new(),
            subscriptions,
            coordinator,
            blob_store,
            mapping_container: config.mapping.container.clone(),
            mapping: Mutex::new(None),
            events,
            state: Mutex::new(CallState::Established),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn layout(&self) -> &CallLayout {
        &self.layout
    }

    pub fn registry(&self) -> &RecordingRegistry {
        &self.registry
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn coordinator(&self) -> &Arc<MediaStreamCoordinator> {
        &self.coordinator
    }

    pub fn state(&self) -> CallState {
        *lock(&self.state)
    }

    /// Meeting record claimed for this call, if any
    pub fn meeting_mapping(&self) -> Option<MeetingMapping> {
        lock(&self.mapping).as_ref().map(|c| c.mapping.clone())
    }

    /// Name used for the archive
    pub fn meeting_name(&self) -> String {
        match lock(&self.mapping).as_ref() {
            Some(claimed) => claimed.mapping.display_name(&self.call_id).to_string(),
            None => self.call_id.clone(),
        }
    }

    /// Register a media callback source; detaches when the handle is dropped
    pub fn attach_ingress(&self) -> IngressHandle {
        self.coordinator.attach(self.roster.clone())
    }

    /// Socket evictions so far, oldest first
    pub fn evictions(&self) -> Vec<Eviction> {
        self.subscriptions.evictions()
    }

    fn is_terminated(&self) -> bool {
        self.state() == CallState::Terminated
    }

    fn capture(&self, change: RosterChange, participant_id: &str, display_name: Option<&str>) {
        let Some(events) = &self.events else {
            return;
        };
        let event = ParticipantEvent {
            change,
            participant_id: participant_id.to_string(),
            display_name: display_name.map(str::to_string),
            at: Utc::now(),
        };
        if let Err(e) = events.participant(&event) {
            tracing::warn!("Failed to capture participant event: {}", e);
        }
    }

    fn claim_mapping(&self, participant: &Participant) {
        let Some(user_object_id) = participant.user_id.as_deref() else {
            return;
        };
        let mut mapping = lock(&self.mapping);
        if mapping.is_some() {
            return;
        }
        match claim_meeting_mapping(
            self.blob_store.as_ref(),
            &self.mapping_container,
            user_object_id,
            &self.call_id,
        ) {
            Ok(Some(claimed)) => {
                *mapping = Some(ClaimedMapping {
                    user_object_id: user_object_id.to_string(),
                    mapping: claimed,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(
                "Failed to read meeting mapping for {}: {}",
                user_object_id,
                e
            ),
        }
    }

    /// Close the files of sources whose socket was released
    async fn retire_released(&self) {
        for source in self.subscriptions.take_retired() {
            tracing::debug!(
                "Retiring {} source {} (socket {}, serial {})",
                source.kind,
                source.msi,
                source.socket_id,
                source.serial
            );
            self.coordinator.retire(source).await;
        }
    }

    /// Roster delta from the platform
    pub async fn on_participants_updated(&self, added: &[Participant], removed: &[String]) {
        if self.is_terminated() {
            tracing::debug!("Ignoring roster update for terminated call {}", self.call_id);
            return;
        }

        for participant in added {
            if !participant.is_tracked() {
                tracing::debug!("Skipping untracked participant {}", participant.id);
                continue;
            }
            if self.roster.upsert(participant.clone()) {
                tracing::info!(
                    "Participant joined: {} ({})",
                    participant.id,
                    participant.name().unwrap_or("unknown")
                );
                self.capture(RosterChange::Added, &participant.id, participant.name());
                self.claim_mapping(participant);
            }
            if let Err(e) = self.subscriptions.on_participant_updated(participant, false) {
                tracing::warn!("Subscription update for {} failed: {}", participant.id, e);
            }
        }

        for id in removed {
            let Some(participant) = self.roster.remove(id) else {
                continue;
            };
            tracing::info!("Participant left: {}", id);
            self.capture(RosterChange::Removed, id, participant.name());
            if let Err(e) = self.subscriptions.on_participant_removed(id) {
                tracing::warn!("Releasing sockets of {} failed: {}", id, e);
            }
        }

        self.retire_released().await;
    }

    /// Stream or lobby state of a single participant changed
    pub async fn on_participant_updated(&self, participant: &Participant) {
        if self.is_terminated() || !participant.is_tracked() {
            return;
        }
        if self.roster.upsert(participant.clone()) {
            self.capture(RosterChange::Added, &participant.id, participant.name());
            self.claim_mapping(participant);
        } else {
            self.capture(RosterChange::Updated, &participant.id, participant.name());
        }
        if let Err(e) = self.subscriptions.on_participant_updated(participant, false) {
            tracing::warn!("Subscription update for {} failed: {}", participant.id, e);
        }
        self.retire_released().await;
    }

    pub async fn on_dominant_speaker_changed(&self, msi: u32) {
        if self.is_terminated() {
            return;
        }
        if let Err(e) = self.subscriptions.on_dominant_speaker_changed(msi, &self.roster) {
            tracing::warn!("Dominant speaker subscription failed: {}", e);
        }
        self.retire_released().await;
    }

    /// Call ended: drain every lane, then package and upload
    ///
    /// The meeting mapping record is removed whatever the packaging outcome.
    pub async fn terminate(
        &self,
        quality: Option<AudioQualityReport>,
        packager: &Packager,
    ) -> Result<PackageReport> {
        {
            let mut state = lock(&self.state);
            if *state == CallState::Terminated {
                return Err(RecorderError::CallTerminated(self.call_id.clone()));
            }
            *state = CallState::Terminated;
        }
        tracing::info!("Call {} terminated, stopping media", self.call_id);

        if let Some(report) = &quality {
            tracing::info!(
                "Audio quality: {} packets received, {:.1}% lost, {:.1}ms average jitter",
                report.received_packets,
                report.loss_rate() * 100.0,
                report.average_jitter_ms
            );
            if let Some(events) = &self.events {
                if let Err(e) = events.audio_quality(report) {
                    tracing::warn!("Failed to capture audio quality: {}", e);
                }
            }
        }

        self.coordinator.close().await;
        let stopped = self.coordinator.stop_all().await;
        tracing::debug!("Stopped {} lanes", stopped.len());

        let result = packager
            .package(
                &self.call_id,
                &self.layout,
                &self.registry,
                &self.meeting_name(),
            )
            .await;

        if let Some(claimed) = lock(&self.mapping).as_ref() {
            match self
                .blob_store
                .delete(&self.mapping_container, &claimed.user_object_id)
            {
                Ok(_) => tracing::debug!("Removed meeting mapping for {}", claimed.user_object_id),
                Err(e) => tracing::warn!("Failed to remove meeting mapping: {}", e),
            }
        }

        match &result {
            Ok(report) => tracing::info!("Call {} packaged: {:?}", self.call_id, report.archive),
            Err(e) => tracing::error!("Packaging call {} failed: {}", self.call_id, e),
        }
        result.map_err(RecorderError::from)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
