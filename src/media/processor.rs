//! Per-kind buffer processors
//!
//! A processor is driven by exactly one lane consumer. It routes each
//! buffer to the file for its recording key, keeps the registry entry for
//! that key current, and closes everything in `finalise`.

use super::buffer::{AudioMediaBuffer, VideoMediaBuffer};
use super::MediaKind;
use crate::error::MediaError;
use crate::recording::{IdentityWriter, RecordingRegistry, ALL_SPEAKERS_KEY};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Socket assignment lookup for video and screen-share sources
pub trait SocketLookup: Send + Sync {
    /// Socket id and serial number currently assigned to a source
    fn lookup(&self, kind: MediaKind, msi: u32) -> Option<(u32, u32)>;
}

/// A source whose socket binding ended: unsubscribed, evicted or replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetiredSource {
    pub kind: MediaKind,
    pub msi: u32,
    pub socket_id: u32,
    pub serial: u32,
}

/// Consumer side of one media lane
pub trait BufferProcessor: Send + 'static {
    type Buffer: Send + 'static;

    fn kind(&self) -> MediaKind;

    /// Handle one buffer; an error loses only this buffer
    fn process(&mut self, buffer: Self::Buffer) -> Result<(), MediaError>;

    /// Close the file of a source that no longer has a socket
    fn retire(&mut self, _source: &RetiredSource) -> Result<(), MediaError> {
        Ok(())
    }

    /// Close all files, mark closed entries done, return the output directory
    fn finalise(self) -> PathBuf;
}

/// Writes the mixed channel and per-speaker WAV files
pub struct AudioProcessor {
    writer: IdentityWriter,
    registry: Arc<RecordingRegistry>,
    write_silence: bool,
}

impl AudioProcessor {
    pub fn new(dir: PathBuf, registry: Arc<RecordingRegistry>, write_silence: bool) -> Self {
        Self::with_writer(IdentityWriter::new(MediaKind::Audio, dir), registry, write_silence)
    }

    pub fn with_writer(
        writer: IdentityWriter,
        registry: Arc<RecordingRegistry>,
        write_silence: bool,
    ) -> Self {
        Self {
            writer,
            registry,
            write_silence,
        }
    }

    fn write(&mut self, key: &str, data: &[u8], timestamp: i64) -> Result<(), MediaError> {
        self.writer.write(key, data)?;
        self.registry.record_buffer(MediaKind::Audio, key, timestamp);
        Ok(())
    }
}

impl BufferProcessor for AudioProcessor {
    type Buffer = AudioMediaBuffer;

    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn process(&mut self, buffer: AudioMediaBuffer) -> Result<(), MediaError> {
        if buffer.timestamp == 0 {
            return Ok(());
        }
        if buffer.is_silence && !self.write_silence {
            return Ok(());
        }

        let has_mix = !buffer.data.is_empty();
        if has_mix {
            self.write(ALL_SPEAKERS_KEY, &buffer.data, buffer.timestamp)?;
        }

        for unmixed in &buffer.unmixed {
            let Some(key) = unmixed.speaker_key() else {
                continue;
            };
            self.write(key, &unmixed.data, buffer.timestamp)?;
            if !has_mix {
                self.write(ALL_SPEAKERS_KEY, &unmixed.data, buffer.timestamp)?;
            }
        }

        Ok(())
    }

    fn finalise(self) -> PathBuf {
        finish(self.writer, &self.registry, MediaKind::Audio)
    }
}

/// Writes one `.h264` file per participant, source, socket and serial
///
/// Serves both the video and the screen-share lane.
pub struct VideoProcessor {
    kind: MediaKind,
    writer: IdentityWriter,
    registry: Arc<RecordingRegistry>,
    sockets: Arc<dyn SocketLookup>,
    /// (msi, socket, serial) of every open file
    bindings: HashMap<(u32, u32, u32), String>,
}

impl VideoProcessor {
    pub fn new(
        kind: MediaKind,
        dir: PathBuf,
        registry: Arc<RecordingRegistry>,
        sockets: Arc<dyn SocketLookup>,
    ) -> Self {
        Self {
            kind,
            writer: IdentityWriter::new(kind, dir),
            registry,
            sockets,
            bindings: HashMap::new(),
        }
    }

    /// Recording key for a buffer and the socket binding it was written under
    fn resolve(&self, buffer: &VideoMediaBuffer) -> Result<(String, (u32, u32, u32)), MediaError> {
        let msi = buffer.media_source_id;
        let participant = buffer
            .participant_id
            .as_deref()
            .ok_or(MediaError::UnknownParticipant(msi))?;
        let (socket_id, serial) =
            self.sockets
                .lookup(self.kind, msi)
                .ok_or(MediaError::UnmappedSource {
                    kind: self.kind.label(),
                    msi,
                })?;
        Ok((
            format!("{}_{}_{}_{}", participant, msi, socket_id, serial),
            (msi, socket_id, serial),
        ))
    }
}

impl BufferProcessor for VideoProcessor {
    type Buffer = VideoMediaBuffer;

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn process(&mut self, buffer: VideoMediaBuffer) -> Result<(), MediaError> {
        if buffer.timestamp == 0 || buffer.data.is_empty() {
            return Ok(());
        }

        let (key, binding) = self.resolve(&buffer)?;
        self.writer.write(&key, &buffer.data)?;
        self.registry.record_buffer(self.kind, &key, buffer.timestamp);
        self.bindings.entry(binding).or_insert(key);
        Ok(())
    }

    fn retire(&mut self, source: &RetiredSource) -> Result<(), MediaError> {
        let binding = (source.msi, source.socket_id, source.serial);
        let Some(key) = self.bindings.remove(&binding) else {
            return Ok(());
        };
        match self.writer.close(&key) {
            Some(Ok(closed)) => {
                self.registry.mark_done(self.kind, &closed.key);
                tracing::info!(
                    "Closed {} recording '{}' after its socket was released",
                    self.kind,
                    closed.key
                );
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Ok(()),
        }
    }

    fn finalise(self) -> PathBuf {
        finish(self.writer, &self.registry, self.kind)
    }
}

fn finish(writer: IdentityWriter, registry: &RecordingRegistry, kind: MediaKind) -> PathBuf {
    let report = writer.finalize();
    for closed in &report.closed {
        registry.mark_done(kind, &closed.key);
    }
    tracing::info!(
        "Finalized {} recordings in {:?}: {} closed, {} failed",
        kind,
        report.dir,
        report.closed.len(),
        report.failed.len()
    );
    report.dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::buffer::UnmixedAudioBuffer;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct FixedSockets(HashMap<u32, (u32, u32)>);

    impl SocketLookup for FixedSockets {
        fn lookup(&self, _kind: MediaKind, msi: u32) -> Option<(u32, u32)> {
            self.0.get(&msi).copied()
        }
    }

    fn audio(timestamp: i64, data: &[u8]) -> AudioMediaBuffer {
        AudioMediaBuffer {
            timestamp,
            data: data.to_vec(),
            is_silence: false,
            unmixed: Vec::new(),
        }
    }

    fn video(timestamp: i64, msi: u32, owner: Option<&str>, data: &[u8]) -> VideoMediaBuffer {
        VideoMediaBuffer {
            timestamp,
            media_source_id: msi,
            data: data.to_vec(),
            stride: 0,
            width: 1920,
            height: 1080,
            participant_id: owner.map(str::to_string),
            ad_id: None,
        }
    }

    #[test]
    fn test_zero_timestamp_is_discarded() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(RecordingRegistry::new());
        let mut processor = AudioProcessor::new(temp.path().to_path_buf(), registry.clone(), true);

        processor.process(audio(0, &[1, 2, 3, 4])).unwrap();

        assert!(registry.is_empty());
        assert!(!temp.path().join("all.wav").exists());
    }

    #[test]
    fn test_silence_suppressed_when_disabled() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(RecordingRegistry::new());
        let mut processor = AudioProcessor::new(temp.path().to_path_buf(), registry.clone(), false);

        let mut buffer = audio(10, &[0, 0]);
        buffer.is_silence = true;
        processor.process(buffer).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_audio_routes_mix_and_speakers() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(RecordingRegistry::new());
        let mut processor = AudioProcessor::new(temp.path().to_path_buf(), registry.clone(), true);

        let mut buffer = audio(10, &[1, 0, 2, 0]);
        buffer.unmixed = vec![
            UnmixedAudioBuffer {
                active_speaker_id: 5,
                ad_id: Some("ad-1".into()),
                display_name: Some("Ann".into()),
                data: vec![3, 0],
            },
            UnmixedAudioBuffer {
                active_speaker_id: 6,
                ad_id: Some("ad-2".into()),
                display_name: None,
                data: vec![4, 0],
            },
        ];
        processor.process(buffer).unwrap();
        let dir = processor.finalise();
        assert_eq!(dir, temp.path());

        let keys: Vec<String> = registry.snapshot().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["all".to_string(), "ad-1".to_string()]);
        assert!(registry.snapshot().iter().all(|e| e.is_process_done));
        assert!(temp.path().join("ad-1.wav").exists());
        assert!(!temp.path().join("ad-2.wav").exists());
    }

    #[test]
    fn test_video_key_and_frame_count() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(RecordingRegistry::new());
        let sockets = Arc::new(FixedSockets([(7, (3, 1))].into_iter().collect()));
        let mut processor =
            VideoProcessor::new(MediaKind::Video, temp.path().to_path_buf(), registry.clone(), sockets);

        let frames: Vec<Vec<u8>> = vec![vec![1; 10], vec![2; 20], vec![3; 5]];
        for (i, data) in frames.iter().enumerate() {
            processor.process(video(100 + i as i64, 7, Some("p1"), data)).unwrap();
        }
        processor.finalise();

        let entry = registry.get(MediaKind::Video, "p1_7_3_1").unwrap();
        assert_eq!(entry.frame_count, 3);
        assert!(entry.is_process_done);
        assert_eq!(entry.recording_start_time, 100);
        assert_eq!(entry.recording_end_time, 102);

        let len = std::fs::metadata(temp.path().join("V_p1_7_3_1.h264")).unwrap().len();
        assert_eq!(len, 35);
    }

    #[test]
    fn test_retire_closes_only_that_binding() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(RecordingRegistry::new());
        let sockets = Arc::new(FixedSockets([(7, (3, 1)), (8, (4, 2))].into_iter().collect()));
        let mut processor =
            VideoProcessor::new(MediaKind::Video, temp.path().to_path_buf(), registry.clone(), sockets);

        processor.process(video(1, 7, Some("p1"), &[1, 1])).unwrap();
        processor.process(video(2, 8, Some("p2"), &[2])).unwrap();

        let retired = RetiredSource {
            kind: MediaKind::Video,
            msi: 7,
            socket_id: 3,
            serial: 1,
        };
        processor.retire(&retired).unwrap();
        assert!(registry.get(MediaKind::Video, "p1_7_3_1").unwrap().is_process_done);
        assert!(!registry.get(MediaKind::Video, "p2_8_4_2").unwrap().is_process_done);

        // stale serial is a no-op
        let stale = RetiredSource { serial: 9, ..retired };
        processor.retire(&stale).unwrap();

        processor.finalise();
        assert!(registry.snapshot().iter().all(|e| e.is_process_done));
        assert_eq!(std::fs::read(temp.path().join("V_p1_7_3_1.h264")).unwrap(), vec![1, 1]);
    }

    #[test]
    fn test_unmapped_source_is_transient() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(RecordingRegistry::new());
        let sockets = Arc::new(FixedSockets(HashMap::new()));
        let mut processor =
            VideoProcessor::new(MediaKind::Vbss, temp.path().to_path_buf(), registry.clone(), sockets);

        let err = processor.process(video(5, 9, Some("p1"), &[1])).unwrap_err();
        assert!(matches!(err, MediaError::UnmappedSource { msi: 9, .. }));

        let err = processor.process(video(5, 9, None, &[1])).unwrap_err();
        assert!(matches!(err, MediaError::UnknownParticipant(9)));
        assert!(registry.is_empty());
    }
}
