//! Real-time media ingestion
//!
//! Buffers arrive from the conferencing platform on its own callback
//! threads, are copied into owned values (`buffer`), queued on one bounded
//! lane per media kind (`coordinator`), and written to disk by a single
//! consumer per lane (`processor`).

pub mod buffer;
pub mod coordinator;
pub mod processor;
pub mod roster;

pub use buffer::{
    AdditionalIdentity, AudioFrame, AudioMediaBuffer, MediaStreamInfo, Participant,
    StreamDirection, UnmixedAudio, UnmixedAudioBuffer, VideoFrame, VideoMediaBuffer,
};
pub use coordinator::{IngressHandle, LaneState, MediaStreamCoordinator};
pub use processor::{
    AudioProcessor, BufferProcessor, RetiredSource, SocketLookup, VideoProcessor,
};
pub use roster::Roster;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media stream, also the manifest file type
///
/// Serialized as its integer code (Audio=0, Video=1, VBSS=2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MediaKind {
    Audio,
    Video,
    Vbss,
}

impl MediaKind {
    /// Short label used in logs and errors
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Vbss => "vbss",
        }
    }

    /// On-disk file name for a recording key of this kind
    pub fn file_name(&self, key: &str) -> String {
        match self {
            MediaKind::Audio => format!("{}.wav", key),
            MediaKind::Video => format!("V_{}.h264", key),
            MediaKind::Vbss => format!("VB_{}.h264", key),
        }
    }

    /// All kinds, in lane order
    pub fn all() -> [MediaKind; 3] {
        [MediaKind::Audio, MediaKind::Video, MediaKind::Vbss]
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<MediaKind> for u8 {
    fn from(kind: MediaKind) -> u8 {
        match kind {
            MediaKind::Audio => 0,
            MediaKind::Video => 1,
            MediaKind::Vbss => 2,
        }
    }
}

impl TryFrom<u8> for MediaKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MediaKind::Audio),
            1 => Ok(MediaKind::Video),
            2 => Ok(MediaKind::Vbss),
            other => Err(format!("unknown file type {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(MediaKind::Audio.file_name("all"), "all.wav");
        assert_eq!(MediaKind::Video.file_name("p1_7_3_1"), "V_p1_7_3_1.h264");
        assert_eq!(MediaKind::Vbss.file_name("p1_9_10_2"), "VB_p1_9_10_2.h264");
    }

    #[test]
    fn test_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&MediaKind::Vbss).unwrap(), "2");
        let kind: MediaKind = serde_json::from_str("1").unwrap();
        assert_eq!(kind, MediaKind::Video);
        assert!(serde_json::from_str::<MediaKind>("7").is_err());
    }
}
