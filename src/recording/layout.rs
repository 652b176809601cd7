//! On-disk layout of one call's working directory
//!
//! ```text
//! {root}/{callId}/
//!   {audio}/all.wav, {adId}.wav
//!   {video}/V_{key}.h264
//!   {vbss}/VB_{key}.h264
//!   recordingFileInfoList.json
//!   {meeting}_{start}_{end}.zip
//! ```

use super::file_info::{RecordingFileInfo, MANIFEST_FILE_NAME};
use crate::config::OutputConfig;
use crate::media::MediaKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLayout {
    pub call_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub video_dir: PathBuf,
    pub vbss_dir: PathBuf,
}

impl CallLayout {
    /// Layout of a call under the configured output root
    pub fn new(output: &OutputConfig, call_id: &str) -> Self {
        Self::from_dir(output.call_dir(call_id), output)
    }

    /// Layout rooted at an explicit call directory
    pub fn from_dir(call_dir: PathBuf, output: &OutputConfig) -> Self {
        Self {
            audio_dir: call_dir.join(&output.audio_folder),
            video_dir: call_dir.join(&output.video_folder),
            vbss_dir: call_dir.join(&output.vbss_folder),
            call_dir,
        }
    }

    pub fn dir_for(&self, kind: MediaKind) -> &Path {
        match kind {
            MediaKind::Audio => &self.audio_dir,
            MediaKind::Video => &self.video_dir,
            MediaKind::Vbss => &self.vbss_dir,
        }
    }

    /// Where a registry entry's file lives
    pub fn file_path(&self, entry: &RecordingFileInfo) -> PathBuf {
        self.dir_for(entry.file_type).join(&entry.file_name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.call_dir.join(MANIFEST_FILE_NAME)
    }

    /// Call id, taken from the directory name
    pub fn call_id(&self) -> Option<&str> {
        self.call_dir.file_name().and_then(|n| n.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let output = OutputConfig {
            root: "/rec".into(),
            ..Default::default()
        };
        let layout = CallLayout::new(&output, "call-1");
        assert_eq!(layout.audio_dir, PathBuf::from("/rec/call-1/audio"));
        assert_eq!(layout.dir_for(MediaKind::Vbss), Path::new("/rec/call-1/vbss"));
        assert_eq!(layout.call_id(), Some("call-1"));

        let entry = RecordingFileInfo::new(MediaKind::Video, "p_1_2_1");
        assert_eq!(
            layout.file_path(&entry),
            PathBuf::from("/rec/call-1/video/V_p_1_2_1.h264")
        );
        assert_eq!(
            layout.manifest_path(),
            PathBuf::from("/rec/call-1/recordingFileInfoList.json")
        );
    }
}
