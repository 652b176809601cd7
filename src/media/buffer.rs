//! Media buffers and participant model
//!
//! The platform hands us frames that borrow its own memory and frees that
//! memory as soon as the callback returns. `AudioMediaBuffer` and
//! `VideoMediaBuffer` are the owned copies that travel through the lanes;
//! participant attribution is resolved at copy time against the roster.

use super::MediaKind;

/// Additional identity key carried by bots and other application instances
pub const APPLICATION_INSTANCE: &str = "applicationInstance";

/// Direction of a participant's media stream, from the participant's side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Inactive,
    SendOnly,
    ReceiveOnly,
    SendReceive,
}

/// One media stream advertised by a participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamInfo {
    pub modality: MediaKind,
    pub direction: StreamDirection,
    pub source_id: u32,
}

/// Identity that is not a directory user (application instance, guest, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalIdentity {
    /// Identity kind key, e.g. "applicationInstance"
    pub kind: String,
    pub id: String,
    pub display_name: Option<String>,
}

/// Call participant as seen in the roster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Participant {
    /// Platform participant id
    pub id: String,
    /// User identity object id, when the participant is a directory user
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub additional_identity: Option<AdditionalIdentity>,
    pub in_lobby: bool,
    pub media_streams: Vec<MediaStreamInfo>,
}

impl Participant {
    /// Participant carries a directory user identity
    pub fn has_user_identity(&self) -> bool {
        self.user_id.is_some()
    }

    /// Whether the session should track this participant at all
    pub fn is_tracked(&self) -> bool {
        if self.has_user_identity() {
            return true;
        }
        self.additional_identity
            .as_ref()
            .map(|identity| identity.kind != APPLICATION_INSTANCE)
            .unwrap_or(false)
    }

    /// Identity id used for per-speaker file names
    pub fn ad_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or_else(|| self.additional_identity.as_ref().map(|i| i.id.as_str()))
    }

    /// Display name from the user identity, falling back to the additional identity
    pub fn name(&self) -> Option<&str> {
        self.display_name.as_deref().or_else(|| {
            self.additional_identity
                .as_ref()
                .and_then(|i| i.display_name.as_deref())
        })
    }

    /// Whether any of this participant's streams uses the given source id
    pub fn owns_source(&self, source_id: u32) -> bool {
        self.media_streams.iter().any(|s| s.source_id == source_id)
    }

    /// The stream this participant is currently sending for a kind
    ///
    /// Video counts as sending for SendReceive and SendOnly; screen sharing
    /// only for SendOnly.
    pub fn sending_stream(&self, kind: MediaKind) -> Option<&MediaStreamInfo> {
        self.media_streams.iter().find(|s| {
            s.modality == kind
                && match kind {
                    MediaKind::Vbss => s.direction == StreamDirection::SendOnly,
                    _ => matches!(
                        s.direction,
                        StreamDirection::SendOnly | StreamDirection::SendReceive
                    ),
                }
        })
    }
}

/// Find the participant that owns a media source id
pub fn participant_for_source(roster: &[Participant], source_id: u32) -> Option<&Participant> {
    roster.iter().find(|p| p.owns_source(source_id))
}

/// Per-speaker audio sub-buffer as delivered by the platform
#[derive(Debug, Clone, Copy)]
pub struct UnmixedAudio<'a> {
    /// Media source id of the active speaker
    pub active_speaker_id: u32,
    pub data: &'a [u8],
}

/// Platform audio frame (16 kHz, 16-bit, mono PCM)
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    /// 100-ns ticks; zero marks a keep-alive
    pub timestamp: i64,
    pub data: &'a [u8],
    pub is_silence: bool,
    pub unmixed: &'a [UnmixedAudio<'a>],
}

/// Platform video or screen-share frame
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    pub timestamp: i64,
    pub media_source_id: u32,
    pub data: &'a [u8],
    pub stride: i32,
    pub width: i32,
    pub height: i32,
}

/// Owned per-speaker audio with its resolved identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmixedAudioBuffer {
    pub active_speaker_id: u32,
    pub ad_id: Option<String>,
    pub display_name: Option<String>,
    pub data: Vec<u8>,
}

impl UnmixedAudioBuffer {
    /// Speaker key when the buffer can be attributed (ad id and name present)
    pub fn speaker_key(&self) -> Option<&str> {
        let ad_id = self.ad_id.as_deref().filter(|id| !id.trim().is_empty())?;
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|_| ad_id)
    }
}

/// Owned audio buffer queued on the audio lane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMediaBuffer {
    pub timestamp: i64,
    pub data: Vec<u8>,
    pub is_silence: bool,
    pub unmixed: Vec<UnmixedAudioBuffer>,
}

impl AudioMediaBuffer {
    /// Copy a platform frame, resolving unmixed speakers against the roster
    pub fn from_frame(frame: &AudioFrame<'_>, roster: &[Participant]) -> Self {
        let unmixed = frame
            .unmixed
            .iter()
            .map(|u| {
                let participant = participant_for_source(roster, u.active_speaker_id);
                UnmixedAudioBuffer {
                    active_speaker_id: u.active_speaker_id,
                    ad_id: participant.and_then(|p| p.ad_id()).map(str::to_string),
                    display_name: participant.and_then(|p| p.name()).map(str::to_string),
                    data: u.data.to_vec(),
                }
            })
            .collect();

        Self {
            timestamp: frame.timestamp,
            data: frame.data.to_vec(),
            is_silence: frame.is_silence,
            unmixed,
        }
    }
}

/// Owned video or screen-share buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMediaBuffer {
    pub timestamp: i64,
    pub media_source_id: u32,
    pub data: Vec<u8>,
    pub stride: i32,
    pub width: i32,
    pub height: i32,
    /// Owning participant, resolved from the roster at copy time
    pub participant_id: Option<String>,
    pub ad_id: Option<String>,
}

impl VideoMediaBuffer {
    /// Copy a platform frame, resolving the owning participant by source id
    pub fn from_frame(frame: &VideoFrame<'_>, roster: &[Participant]) -> Self {
        let participant = participant_for_source(roster, frame.media_source_id);
        Self {
            timestamp: frame.timestamp,
            media_source_id: frame.media_source_id,
            data: frame.data.to_vec(),
            stride: frame.stride,
            width: frame.width,
            height: frame.height,
            participant_id: participant.map(|p| p.id.clone()),
            ad_id: participant.and_then(|p| p.ad_id()).map(str::to_string),
        }
    }
}
