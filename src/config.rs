//! Configuration loading and types for callrecorder
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/callrecorder/config.toml)
//! 3. Environment variables (CALLRECORDER_*)
//! 4. CLI arguments (highest priority)

use crate::error::RecorderError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Callrecorder Configuration
#
# Location: ~/.config/callrecorder/config.toml
# All settings can be overridden via CLI flags

[output]
# Root directory for per-call working directories.
# "auto" uses ~/.local/share/callrecorder/calls
root = "auto"

# Sub-folders created inside each call directory
audio_folder = "audio"
video_folder = "video"
vbss_folder = "vbss"

# Folder (under root) for captured call events
events_folder = "events"

[media]
# Buffers that may wait in each lane (audio, video, vbss) before
# producers are made to wait
queue_capacity = 1024

# Write buffers the platform flags as silence to the WAV files
write_silence = true

# Consecutive per-buffer failures before a lane consumer is restarted
max_consecutive_errors = 50

# Consumer restarts per lane and call before that media kind is dropped
max_lane_restarts = 3

[sockets]
# Number of receive-only video sockets requested per call
multiview_sockets = 9

[packaging]
# How long to wait for every recording file to be finalized
wait_for_files_secs = 60

# Interval between completeness checks
poll_interval_ms = 1000

# Append participant and audio quality events as JSON lines
capture_events = false

# Archiver executable (must support: zip -j <archive> <files...>)
archiver = "zip"

[upload]
# Upload backend: "directory", "http" or "disabled"
backend = "directory"

# Directory path (directory backend) or base URL (http backend)
target = "auto"

# Folder inside the document library
relative_path = "recordings"

# Request timeout for the http backend
timeout_secs = 600

# [mapping]
# Blob store used for the per-user meeting mapping record
# root = "auto"
# container = "meetingmapping"
"#;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub output: OutputConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub sockets: SocketConfig,

    #[serde(default)]
    pub packaging: PackagingConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub mapping: MappingConfig,
}

/// Output layout configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Root directory for call working directories, or "auto"
    #[serde(default = "default_auto")]
    pub root: String,

    #[serde(default = "default_audio_folder")]
    pub audio_folder: String,

    #[serde(default = "default_video_folder")]
    pub video_folder: String,

    #[serde(default = "default_vbss_folder")]
    pub vbss_folder: String,

    #[serde(default = "default_events_folder")]
    pub events_folder: String,
}

/// Media pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    /// Bounded channel capacity per media lane
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Write buffers flagged as silence
    #[serde(default = "default_true")]
    pub write_silence: bool,

    /// Consecutive per-buffer failures before the consumer restarts
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Consumer restarts per lane before it gives up for the call
    #[serde(default = "default_max_lane_restarts")]
    pub max_lane_restarts: u32,
}

/// Decoder socket configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SocketConfig {
    /// Receive-only video sockets per call
    #[serde(default = "default_multiview_sockets")]
    pub multiview_sockets: u32,
}

/// Completion and packaging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PackagingConfig {
    #[serde(default = "default_wait_for_files_secs")]
    pub wait_for_files_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub capture_events: bool,

    #[serde(default = "default_archiver")]
    pub archiver: String,
}

/// Upload backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UploadBackend {
    /// Copy the archive into a mounted document library folder
    #[default]
    Directory,
    /// PUT the archive to an HTTP document library endpoint
    Http,
    /// Keep the archive in the working directory
    Disabled,
}

/// Document library upload configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub backend: UploadBackend,

    /// Directory path or base URL, "auto" for the default uploads directory
    #[serde(default = "default_auto")]
    pub target: String,

    #[serde(default = "default_relative_path")]
    pub relative_path: String,

    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,

    /// Bearer token for the http backend (or CALLRECORDER_UPLOAD_TOKEN)
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Meeting mapping blob store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingConfig {
    #[serde(default = "default_auto")]
    pub root: String,

    #[serde(default = "default_mapping_container")]
    pub container: String,
}

fn default_auto() -> String {
    "auto".to_string()
}

fn default_audio_folder() -> String {
    "audio".to_string()
}

fn default_video_folder() -> String {
    "video".to_string()
}

fn default_vbss_folder() -> String {
    "vbss".to_string()
}

fn default_events_folder() -> String {
    "events".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_consecutive_errors() -> u32 {
    50
}

fn default_max_lane_restarts() -> u32 {
    3
}

fn default_multiview_sockets() -> u32 {
    9
}

fn default_wait_for_files_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_archiver() -> String {
    "zip".to_string()
}

fn default_relative_path() -> String {
    "recordings".to_string()
}

fn default_upload_timeout() -> u64 {
    600 // archives of long calls can be large
}

fn default_mapping_container() -> String {
    "meetingmapping".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_auto(),
            audio_folder: default_audio_folder(),
            video_folder: default_video_folder(),
            vbss_folder: default_vbss_folder(),
            events_folder: default_events_folder(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            write_silence: true,
            max_consecutive_errors: default_max_consecutive_errors(),
            max_lane_restarts: default_max_lane_restarts(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            multiview_sockets: default_multiview_sockets(),
        }
    }
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            wait_for_files_secs: default_wait_for_files_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            capture_events: false,
            archiver: default_archiver(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            backend: UploadBackend::default(),
            target: default_auto(),
            relative_path: default_relative_path(),
            timeout_secs: default_upload_timeout(),
            api_key: None,
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            root: default_auto(),
            container: default_mapping_container(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            media: MediaConfig::default(),
            sockets: SocketConfig::default(),
            packaging: PackagingConfig::default(),
            upload: UploadConfig::default(),
            mapping: MappingConfig::default(),
        }
    }
}

impl OutputConfig {
    /// Resolve the output root ("auto" → data dir)
    pub fn root_dir(&self) -> PathBuf {
        resolve_auto(&self.root, || Config::data_dir().join("calls"))
    }

    /// Working directory of one call
    pub fn call_dir(&self, call_id: &str) -> PathBuf {
        self.root_dir().join(call_id)
    }

    /// Directory for captured events of one call
    pub fn events_dir(&self, call_id: &str) -> PathBuf {
        self.root_dir().join(&self.events_folder).join(call_id)
    }
}

impl UploadConfig {
    /// Resolve the upload target ("auto" → data dir uploads folder)
    pub fn target_path(&self) -> PathBuf {
        resolve_auto(&self.target, || Config::data_dir().join("uploads"))
    }
}

impl MappingConfig {
    /// Resolve the blob store root ("auto" → data dir blobs folder)
    pub fn root_dir(&self) -> PathBuf {
        resolve_auto(&self.root, || Config::data_dir().join("blobs"))
    }
}

fn resolve_auto(value: &str, default: impl FnOnce() -> PathBuf) -> PathBuf {
    if value.eq_ignore_ascii_case("auto") || value.is_empty() {
        default()
    } else {
        PathBuf::from(value)
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "callrecorder")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "callrecorder")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the data directory path (call output, uploads, blobs)
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "callrecorder")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the config and output directories exist
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        if let Some(config_dir) = Self::config_dir() {
            std::fs::create_dir_all(&config_dir)?;
            tracing::debug!("Ensured config directory exists: {:?}", config_dir);
        }

        let root = self.output.root_dir();
        std::fs::create_dir_all(&root)?;
        tracing::debug!("Ensured output directory exists: {:?}", root);

        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, RecorderError> {
    // Start with defaults
    let mut config = Config::default();

    // Determine config file path
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    // Load from file if it exists
    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| RecorderError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| RecorderError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    Ok(config)
}

/// Override config values from CALLRECORDER_* variables
fn apply_env_overrides(
    config: &mut Config,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), RecorderError> {
    if let Some(root) = var("CALLRECORDER_OUTPUT_ROOT") {
        config.output.root = root;
    }
    if let Some(secs) = var("CALLRECORDER_WAIT_FOR_FILES_SECS") {
        config.packaging.wait_for_files_secs = secs.parse().map_err(|_| {
            RecorderError::Config(format!("CALLRECORDER_WAIT_FOR_FILES_SECS is not a number: {}", secs))
        })?;
    }
    if let Some(backend) = var("CALLRECORDER_UPLOAD_BACKEND") {
        config.upload.backend = match backend.to_lowercase().as_str() {
            "http" => UploadBackend::Http,
            "disabled" | "none" | "off" => UploadBackend::Disabled,
            _ => UploadBackend::Directory,
        };
    }
    if let Some(target) = var("CALLRECORDER_UPLOAD_TARGET") {
        config.upload.target = target;
    }
    if let Some(token) = var("CALLRECORDER_UPLOAD_TOKEN") {
        config.upload.api_key = Some(token);
    }
    Ok(())
}

/// Save configuration to file
pub fn save_config(config: &Config, path: &Path) -> Result<(), RecorderError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| RecorderError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| RecorderError::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, contents)
        .map_err(|e| RecorderError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}
