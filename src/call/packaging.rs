//! Call completion packaging
//!
//! Once every lane of a finished call has been drained, the packager waits
//! for all recording files to be finalized, writes the manifest, zips the
//! call directory and hands the archive to an uploader. The working
//! directory is only removed after a successful upload.

use crate::config::{Config, PackagingConfig, UploadBackend};
use crate::error::PackagingError;
use crate::media::MediaKind;
use crate::recording::{CallLayout, RecordingFileInfo, RecordingRegistry};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Whether every known file is finalized and present on disk
///
/// A call without an audio entry is never complete.
pub fn files_complete(registry: &RecordingRegistry, layout: &CallLayout) -> bool {
    let entries = registry.snapshot();
    if !entries.iter().any(|e| e.file_type == MediaKind::Audio) {
        tracing::debug!("No audio recording registered yet");
        return false;
    }

    let mut complete = true;
    for entry in &entries {
        let path = layout.file_path(entry);
        if !entry.is_process_done || !path.exists() {
            tracing::debug!(
                "{} file not done: {:?} (done: {})",
                entry.file_type,
                path,
                entry.is_process_done
            );
            complete = false;
        }
    }
    complete
}

/// Poll until all files are complete or the timeout elapses
pub async fn check_file_generated(
    registry: &RecordingRegistry,
    layout: &CallLayout,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if files_complete(registry, layout) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

/// Replace characters that are not allowed in file names
fn sanitize_file_stem(name: &str) -> String {
    let cleaned = match Regex::new(r#"[\\/:*?"<>|\x00-\x1F]+"#) {
        Ok(re) => re.replace_all(name.trim(), "_").into_owned(),
        Err(e) => {
            tracing::warn!("File name pattern failed to compile: {}", e);
            name.trim()
                .chars()
                .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
                .collect()
        }
    };
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "recording".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `{meeting}_{start:%Y%m%d%H%M%S}_{end:%Y%m%d%H%M%S}.zip`
pub fn archive_name(meeting: &str, audio: &RecordingFileInfo) -> String {
    format!(
        "{}_{}_{}.zip",
        sanitize_file_stem(meeting),
        audio.start_datetime().format("%Y%m%d%H%M%S"),
        audio.end_datetime().format("%Y%m%d%H%M%S")
    )
}

/// Files that go into the archive: the call directory and its direct subdirectories
pub fn collect_archive_inputs(call_dir: &Path) -> Result<Vec<PathBuf>, PackagingError> {
    fn push_files(dir: &Path, files: &mut Vec<PathBuf>, subdirs: Option<&mut Vec<PathBuf>>) -> std::io::Result<()> {
        let mut subdirs = subdirs;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                if let Some(subdirs) = subdirs.as_deref_mut() {
                    subdirs.push(path);
                }
            } else if path.extension().and_then(|e| e.to_str()) != Some("zip") {
                files.push(path);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    push_files(call_dir, &mut files, Some(&mut subdirs))?;
    for dir in &subdirs {
        push_files(dir, &mut files, None)?;
    }
    files.sort();
    Ok(files)
}

/// Result of handing an archive to the document library
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub succeeded: bool,
    pub item_id: Option<String>,
    pub web_url: Option<String>,
}

/// Creates zip archives
#[async_trait::async_trait]
pub trait Archiver: Send + Sync {
    /// Create `archive` holding `files` under their bare file names
    async fn create(&self, archive: &Path, files: &[PathBuf]) -> Result<(), PackagingError>;
}

/// Archiver shelling out to `zip -j`
#[derive(Debug, Clone)]
pub struct ZipCommandArchiver {
    command: String,
}

impl ZipCommandArchiver {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn resolve(&self) -> Result<PathBuf, PackagingError> {
        which::which(&self.command).map_err(|_| PackagingError::ArchiverNotFound)
    }
}

impl Default for ZipCommandArchiver {
    fn default() -> Self {
        Self::new("zip")
    }
}

#[async_trait::async_trait]
impl Archiver for ZipCommandArchiver {
    async fn create(&self, archive: &Path, files: &[PathBuf]) -> Result<(), PackagingError> {
        if files.is_empty() {
            return Err(PackagingError::Archive("no files to archive".to_string()));
        }
        let program = self.resolve()?;

        if archive.exists() {
            std::fs::remove_file(archive)?;
            tracing::debug!("Replaced existing archive: {:?}", archive);
        }
        if let Some(parent) = archive.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let output = Command::new(&program)
            .arg("-j")
            .arg("-q")
            .arg(archive)
            .args(files)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PackagingError::Archive(format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!("Created archive {:?} ({} files)", archive, files.len());
        Ok(())
    }
}

/// Sends the finished archive to the document library
#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, local: &Path, relative_path: &str) -> Result<UploadOutcome, PackagingError>;
}

/// Copies archives into a mounted document library folder
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    root: PathBuf,
}

impl DirectoryUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl Uploader for DirectoryUploader {
    async fn upload(&self, local: &Path, relative_path: &str) -> Result<UploadOutcome, PackagingError> {
        let file_name = local
            .file_name()
            .ok_or_else(|| PackagingError::Upload(format!("not a file: {:?}", local)))?;
        let dest_dir = self.root.join(relative_path.trim_matches('/'));
        tokio::fs::create_dir_all(&dest_dir).await?;

        let dest = dest_dir.join(file_name);
        let bytes = tokio::fs::copy(local, &dest).await?;
        tracing::info!("Uploaded {:?} to {:?} ({} bytes)", file_name, dest_dir, bytes);

        Ok(UploadOutcome {
            succeeded: true,
            item_id: Some(file_name.to_string_lossy().into_owned()),
            web_url: Some(format!("file://{}", dest.display())),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DriveItem {
    id: Option<String>,
    #[serde(rename = "webUrl")]
    web_url: Option<String>,
}

/// PUTs archives to `{endpoint}/{relative_path}/{file}`
#[derive(Debug, Clone)]
pub struct HttpUploader {
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            timeout,
        }
    }

    fn url(&self, relative_path: &str, file_name: &str) -> String {
        let relative = relative_path.trim_matches('/');
        if relative.is_empty() {
            format!("{}/{}", self.endpoint.trim_end_matches('/'), file_name)
        } else {
            format!("{}/{}/{}", self.endpoint.trim_end_matches('/'), relative, file_name)
        }
    }

    fn put_blocking(&self, url: &str, local: &Path) -> Result<UploadOutcome, PackagingError> {
        let file = std::fs::File::open(local)?;
        let client = ureq::AgentBuilder::new().timeout(self.timeout).build();

        let mut request = client
            .put(url)
            .set("Content-Type", "application/zip");
        if let Some(ref key) = self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }

        let response = request.send(file).map_err(|e| match e {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                PackagingError::Upload(format!("Server returned {}: {}", code, body))
            }
            ureq::Error::Transport(t) => PackagingError::Upload(format!("Request failed: {}", t)),
        })?;

        let item: DriveItem = response
            .into_json()
            .map_err(|e| PackagingError::Upload(format!("Failed to parse response: {}", e)))?;

        Ok(UploadOutcome {
            succeeded: item.id.is_some(),
            item_id: item.id,
            web_url: item.web_url,
        })
    }
}

#[async_trait::async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, local: &Path, relative_path: &str) -> Result<UploadOutcome, PackagingError> {
        let file_name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PackagingError::Upload(format!("not a file: {:?}", local)))?;
        let url = self.url(relative_path, file_name);
        tracing::debug!("Uploading {:?} to {}", local, url);

        let this = self.clone();
        let local = local.to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || this.put_blocking(&url, &local))
            .await
            .map_err(|e| PackagingError::Upload(format!("Upload task failed: {}", e)))??;

        if let Some(ref web_url) = outcome.web_url {
            tracing::info!("Uploaded archive: {}", web_url);
        }
        Ok(outcome)
    }
}

/// What packaging produced
#[derive(Debug, Clone)]
pub struct PackageReport {
    pub manifest: PathBuf,
    pub archive: PathBuf,
    /// None when uploads are disabled
    pub upload: Option<UploadOutcome>,
    pub cleaned_up: bool,
}

/// Waits for files, then manifest, archive, upload and cleanup
pub struct Packager {
    config: PackagingConfig,
    relative_path: String,
    archiver: Arc<dyn Archiver>,
    uploader: Option<Arc<dyn Uploader>>,
}

impl Packager {
    pub fn new(
        config: PackagingConfig,
        relative_path: impl Into<String>,
        archiver: Arc<dyn Archiver>,
        uploader: Option<Arc<dyn Uploader>>,
    ) -> Self {
        Self {
            config,
            relative_path: relative_path.into(),
            archiver,
            uploader,
        }
    }

    /// Packager with the archiver and upload backend from the config
    pub fn from_config(config: &Config) -> Self {
        let uploader: Option<Arc<dyn Uploader>> = match config.upload.backend {
            UploadBackend::Directory => {
                Some(Arc::new(DirectoryUploader::new(config.upload.target_path())))
            }
            UploadBackend::Http => Some(Arc::new(HttpUploader::new(
                config.upload.target.clone(),
                config.upload.api_key.clone(),
                Duration::from_secs(config.upload.timeout_secs),
            ))),
            UploadBackend::Disabled => None,
        };

        Self::new(
            config.packaging.clone(),
            config.upload.relative_path.clone(),
            Arc::new(ZipCommandArchiver::new(config.packaging.archiver.clone())),
            uploader,
        )
    }

    /// Package one finished call
    ///
    /// Fails without creating an archive when files are still incomplete
    /// after the configured wait. Upload failures are not errors: the
    /// working directory is kept for manual recovery.
    pub async fn package(
        &self,
        call_id: &str,
        layout: &CallLayout,
        registry: &RecordingRegistry,
        meeting_name: &str,
    ) -> Result<PackageReport, PackagingError> {
        if registry.audio_entry().is_none() {
            return Err(PackagingError::MissingAudio(call_id.to_string()));
        }

        let timeout = Duration::from_secs(self.config.wait_for_files_secs);
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        if !check_file_generated(registry, layout, timeout, interval).await {
            return Err(PackagingError::FilesIncomplete {
                call_id: call_id.to_string(),
                waited_secs: self.config.wait_for_files_secs,
            });
        }

        let manifest = registry.save_manifest(&layout.call_dir)?;

        let audio = registry
            .audio_entry()
            .ok_or_else(|| PackagingError::MissingAudio(call_id.to_string()))?;
        let archive = layout.call_dir.join(archive_name(meeting_name, &audio));
        let files = collect_archive_inputs(&layout.call_dir)?;
        self.archiver.create(&archive, &files).await?;

        let Some(uploader) = &self.uploader else {
            tracing::info!("Uploads disabled, archive kept at {:?}", archive);
            return Ok(PackageReport {
                manifest,
                archive,
                upload: None,
                cleaned_up: false,
            });
        };

        let outcome = match uploader.upload(&archive, &self.relative_path).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Upload of call {} failed: {}", call_id, e);
                UploadOutcome::default()
            }
        };

        let mut cleaned_up = false;
        if outcome.succeeded {
            match std::fs::remove_dir_all(&layout.call_dir) {
                Ok(()) => {
                    cleaned_up = true;
                    tracing::debug!("Removed working directory {:?}", layout.call_dir);
                }
                Err(e) => tracing::warn!(
                    "Failed to remove working directory {:?}: {}",
                    layout.call_dir,
                    e
                ),
            }
        } else {
            tracing::warn!(
                "Upload of call {} did not succeed, keeping {:?}",
                call_id,
                layout.call_dir
            );
        }

        Ok(PackageReport {
            manifest,
            archive,
            upload: Some(outcome),
            cleaned_up,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn layout(temp: &TempDir) -> CallLayout {
        CallLayout::from_dir(temp.path().join("call-1"), &OutputConfig::default())
    }

    fn finished_audio(registry: &RecordingRegistry, layout: &CallLayout) {
        std::fs::create_dir_all(&layout.audio_dir).unwrap();
        std::fs::write(layout.audio_dir.join("all.wav"), b"RIFF").unwrap();
        registry.record_buffer(MediaKind::Audio, "all", 1_704_164_645 * 10_000_000);
        registry.record_buffer(MediaKind::Audio, "all", 1_704_168_245 * 10_000_000);
        registry.mark_done(MediaKind::Audio, "all");
    }

    /// Archiver that records its inputs and writes a placeholder archive
    #[derive(Default)]
    struct FakeArchiver {
        created: Mutex<Vec<(PathBuf, Vec<PathBuf>)>>,
    }

    #[async_trait::async_trait]
    impl Archiver for FakeArchiver {
        async fn create(&self, archive: &Path, files: &[PathBuf]) -> Result<(), PackagingError> {
            std::fs::write(archive, b"PK")?;
            self.created
                .lock()
                .unwrap()
                .push((archive.to_path_buf(), files.to_vec()));
            Ok(())
        }
    }

    struct FixedUploader(bool);

    #[async_trait::async_trait]
    impl Uploader for FixedUploader {
        async fn upload(&self, _local: &Path, _relative: &str) -> Result<UploadOutcome, PackagingError> {
            if self.0 {
                Ok(UploadOutcome {
                    succeeded: true,
                    item_id: Some("item".into()),
                    web_url: None,
                })
            } else {
                Err(PackagingError::Upload("503".into()))
            }
        }
    }

    fn fast_config() -> PackagingConfig {
        PackagingConfig {
            wait_for_files_secs: 0,
            poll_interval_ms: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_files_complete_requires_audio() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let registry = RecordingRegistry::new();
        assert!(!files_complete(&registry, &layout));

        finished_audio(&registry, &layout);
        assert!(files_complete(&registry, &layout));

        // a done entry whose file is missing
        registry.record_buffer(MediaKind::Video, "p_1_2_1", 5);
        registry.mark_done(MediaKind::Video, "p_1_2_1");
        assert!(!files_complete(&registry, &layout));
    }

    #[tokio::test]
    async fn test_check_file_generated_times_out() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let registry = RecordingRegistry::new();
        registry.record_buffer(MediaKind::Audio, "all", 10);

        let start = Instant::now();
        let ok = check_file_generated(
            &registry,
            &layout,
            Duration::from_millis(100),
            Duration::from_millis(20),
        )
        .await;
        assert!(!ok);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_check_file_generated_sees_late_completion() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let registry = Arc::new(RecordingRegistry::new());
        registry.record_buffer(MediaKind::Audio, "all", 10);
        std::fs::create_dir_all(&layout.audio_dir).unwrap();
        std::fs::write(layout.audio_dir.join("all.wav"), b"RIFF").unwrap();

        let finisher = {
            let registry = registry.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                registry.mark_done(MediaKind::Audio, "all");
            })
        };

        let ok = check_file_generated(
            &registry,
            &layout,
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .await;
        finisher.await.unwrap();
        assert!(ok);
    }

    #[test]
    fn test_archive_name() {
        let mut audio = RecordingFileInfo::new(MediaKind::Audio, "all");
        audio.set_recording_time(1_704_164_645 * 10_000_000);
        audio.set_recording_time(1_704_168_245 * 10_000_000);

        assert_eq!(
            archive_name("Weekly: sync/plan", &audio),
            "Weekly_ sync_plan_20240102030405_20240102040405.zip"
        );
        assert_eq!(
            archive_name("  ", &audio),
            "recording_20240102030405_20240102040405.zip"
        );
    }

    #[test]
    fn test_collect_archive_inputs_flattens_one_level() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        std::fs::create_dir_all(dir.join("audio/nested")).unwrap();
        std::fs::write(dir.join("recordingFileInfoList.json"), "[]").unwrap();
        std::fs::write(dir.join("old.zip"), "PK").unwrap();
        std::fs::write(dir.join("audio/all.wav"), "x").unwrap();
        std::fs::write(dir.join("audio/nested/deep.wav"), "x").unwrap();

        let files = collect_archive_inputs(dir).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.strip_prefix(dir).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["audio/all.wav", "recordingFileInfoList.json"]);
    }

    #[tokio::test]
    async fn test_incomplete_audio_fails_without_archive() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let registry = RecordingRegistry::new();
        std::fs::create_dir_all(&layout.audio_dir).unwrap();
        std::fs::write(layout.audio_dir.join("all.wav"), b"RIFF").unwrap();
        registry.record_buffer(MediaKind::Audio, "all", 10);

        let archiver = Arc::new(FakeArchiver::default());
        let packager = Packager::new(fast_config(), "recordings", archiver.clone(), None);

        let err = packager
            .package("call-1", &layout, &registry, "Meeting")
            .await
            .unwrap_err();
        assert!(matches!(err, PackagingError::FilesIncomplete { .. }));
        assert!(archiver.created.lock().unwrap().is_empty());
        assert!(!layout.manifest_path().exists());
    }

    #[tokio::test]
    async fn test_missing_audio_fails() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let packager = Packager::new(fast_config(), "r", Arc::new(FakeArchiver::default()), None);
        let err = packager
            .package("call-1", &layout, &RecordingRegistry::new(), "m")
            .await
            .unwrap_err();
        assert!(matches!(err, PackagingError::MissingAudio(_)));
    }

    #[tokio::test]
    async fn test_successful_upload_removes_directory() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let registry = RecordingRegistry::new();
        finished_audio(&registry, &layout);

        let archiver = Arc::new(FakeArchiver::default());
        let packager = Packager::new(
            fast_config(),
            "recordings",
            archiver.clone(),
            Some(Arc::new(FixedUploader(true))),
        );

        let report = packager
            .package("call-1", &layout, &registry, "Weekly")
            .await
            .unwrap();
        assert!(report.cleaned_up);
        assert!(!layout.call_dir.exists());
        assert_eq!(
            report.archive.file_name().unwrap(),
            "Weekly_20240102030405_20240102040405.zip"
        );

        let created = archiver.created.lock().unwrap();
        let inputs = &created[0].1;
        assert!(inputs.iter().any(|p| p.ends_with("recordingFileInfoList.json")));
        assert!(inputs.iter().any(|p| p.ends_with("all.wav")));
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_directory() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let registry = RecordingRegistry::new();
        finished_audio(&registry, &layout);

        let packager = Packager::new(
            fast_config(),
            "recordings",
            Arc::new(FakeArchiver::default()),
            Some(Arc::new(FixedUploader(false))),
        );

        let report = packager
            .package("call-1", &layout, &registry, "Weekly")
            .await
            .unwrap();
        assert!(!report.cleaned_up);
        assert_eq!(report.upload, Some(UploadOutcome::default()));
        assert!(layout.manifest_path().exists());
        assert!(report.archive.exists());
    }

    #[tokio::test]
    async fn test_directory_uploader_copies() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("a.zip");
        std::fs::write(&archive, b"PK").unwrap();

        let uploader = DirectoryUploader::new(temp.path().join("library"));
        let outcome = uploader.upload(&archive, "/recordings/").await.unwrap();
        assert!(outcome.succeeded);
        assert_eq!(outcome.item_id.as_deref(), Some("a.zip"));
        assert!(temp.path().join("library/recordings/a.zip").exists());
    }

    #[test]
    fn test_http_upload_url() {
        let uploader = HttpUploader::new("https://docs.example.com/upload/", None, Duration::from_secs(1));
        assert_eq!(
            uploader.url("/recordings/", "a.zip"),
            "https://docs.example.com/upload/recordings/a.zip"
        );
        assert_eq!(uploader.url("", "a.zip"), "https://docs.example.com/upload/a.zip");
    }

    #[tokio::test]
    async fn test_zip_archiver_rejects_empty_input() {
        let temp = TempDir::new().unwrap();
        let archiver = ZipCommandArchiver::default();
        let result = archiver.create(&temp.path().join("x.zip"), &[]).await;
        assert!(matches!(result, Err(PackagingError::Archive(_))));
    }
}
