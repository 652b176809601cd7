//! Identity-keyed file writer
//!
//! Appends buffers to one container per recording key: a 16 kHz, 16-bit,
//! mono WAV file for audio and a raw `.h264` elementary stream for video
//! and screen sharing. A writer is owned by exactly one processor.

use crate::error::MediaError;
use crate::media::MediaKind;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sample rate of platform audio
pub const SAMPLE_RATE: u32 = 16000;

/// WAV format of every audio file
pub fn wav_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Container a processor appends buffers to
pub trait StreamSink: Send {
    /// Append a whole buffer and flush it
    fn write(&mut self, data: &[u8]) -> Result<(), MediaError>;

    /// Flush and close the container
    fn finish(self: Box<Self>) -> Result<(), MediaError>;
}

/// Opens sinks for new recording keys
pub trait SinkFactory: Send {
    fn open(&self, kind: MediaKind, path: &Path) -> Result<Box<dyn StreamSink>, MediaError>;
}

/// Default factory: WAV for audio, raw append for video and VBSS
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerSinks;

impl SinkFactory for ContainerSinks {
    fn open(&self, kind: MediaKind, path: &Path) -> Result<Box<dyn StreamSink>, MediaError> {
        match kind {
            MediaKind::Audio => Ok(Box::new(WavStreamWriter::open(path)?)),
            MediaKind::Video | MediaKind::Vbss => Ok(Box::new(H264StreamWriter::open(path)?)),
        }
    }
}

/// WAV writer fed with little-endian PCM bytes
pub struct WavStreamWriter {
    writer: hound::WavWriter<BufWriter<File>>,
    /// Odd trailing byte from the previous buffer
    carry: Option<u8>,
}

impl WavStreamWriter {
    /// Create the file, or append to it when a previous lane run left one
    pub fn open(path: &Path) -> Result<Self, MediaError> {
        let existing = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        let writer = if existing {
            hound::WavWriter::append(path)?
        } else {
            hound::WavWriter::create(path, wav_spec())?
        };
        Ok(Self {
            writer,
            carry: None,
        })
    }
}

impl StreamSink for WavStreamWriter {
    fn write(&mut self, data: &[u8]) -> Result<(), MediaError> {
        let mut bytes = data;

        if let Some(low) = self.carry.take() {
            match bytes.split_first() {
                Some((&high, rest)) => {
                    self.writer.write_sample(i16::from_le_bytes([low, high]))?;
                    bytes = rest;
                }
                None => {
                    self.carry = Some(low);
                    return Ok(());
                }
            }
        }

        let mut chunks = bytes.chunks_exact(2);
        for pair in &mut chunks {
            self.writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        self.carry = chunks.remainder().first().copied();

        self.writer.flush()?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), MediaError> {
        if self.carry.is_some() {
            tracing::debug!("Dropping trailing half sample at end of WAV stream");
        }
        self.writer.finalize()?;
        Ok(())
    }
}

/// Raw H.264 elementary stream, opened in append mode
pub struct H264StreamWriter {
    file: File,
}

impl H264StreamWriter {
    pub fn open(path: &Path) -> Result<Self, MediaError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl StreamSink for H264StreamWriter {
    fn write(&mut self, data: &[u8]) -> Result<(), MediaError> {
        self.file.write_all(data)?;
        self.file.flush()?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), MediaError> {
        self.file.sync_all()?;
        Ok(())
    }
}

struct OpenSink {
    sink: Box<dyn StreamSink>,
    frames: u64,
    bytes: u64,
}

/// A file that closed cleanly during finalize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedFile {
    pub key: String,
    pub frames: u64,
    pub bytes: u64,
}

/// Outcome of `IdentityWriter::finalize`
#[derive(Debug, Default)]
pub struct FinalizeReport {
    pub dir: PathBuf,
    pub closed: Vec<ClosedFile>,
    pub failed: Vec<String>,
}

/// Writer keeping one open sink per recording key
pub struct IdentityWriter {
    kind: MediaKind,
    dir: PathBuf,
    factory: Box<dyn SinkFactory>,
    sinks: HashMap<String, OpenSink>,
}

impl IdentityWriter {
    /// Writer for a kind into a directory, using the container sinks
    pub fn new(kind: MediaKind, dir: PathBuf) -> Self {
        Self::with_factory(kind, dir, Box::new(ContainerSinks))
    }

    pub fn with_factory(kind: MediaKind, dir: PathBuf, factory: Box<dyn SinkFactory>) -> Self {
        Self {
            kind,
            dir,
            factory,
            sinks: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file a key is written to
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(self.kind.file_name(key))
    }

    pub fn open_keys(&self) -> usize {
        self.sinks.len()
    }

    /// Append a buffer to the file for `key`, opening it on first use
    pub fn write(&mut self, key: &str, data: &[u8]) -> Result<(), MediaError> {
        if !self.sinks.contains_key(key) {
            std::fs::create_dir_all(&self.dir)?;
            let path = self.path_for(key);
            let sink = self.factory.open(self.kind, &path).map_err(|e| MediaError::Write {
                key: key.to_string(),
                message: e.to_string(),
            })?;
            tracing::debug!("Opened {} file: {:?}", self.kind, path);
            self.sinks.insert(
                key.to_string(),
                OpenSink {
                    sink,
                    frames: 0,
                    bytes: 0,
                },
            );
        }

        let Some(open) = self.sinks.get_mut(key) else {
            return Err(MediaError::Write {
                key: key.to_string(),
                message: "sink missing after open".to_string(),
            });
        };

        open.sink.write(data).map_err(|e| MediaError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        open.frames += 1;
        open.bytes += data.len() as u64;
        Ok(())
    }

    /// Close the file for one key before the writer finishes
    ///
    /// Returns `None` when the key has no open file. A later write for the
    /// same key reopens the file in append mode.
    pub fn close(&mut self, key: &str) -> Option<Result<ClosedFile, MediaError>> {
        let open = self.sinks.remove(key)?;
        let result = self.finish_sink(key.to_string(), open);
        tracing::debug!("{} files still open in {:?}", self.open_keys(), self.dir);
        Some(result)
    }

    fn finish_sink(&self, key: String, open: OpenSink) -> Result<ClosedFile, MediaError> {
        match open.sink.finish() {
            Ok(()) => {
                tracing::debug!(
                    "Closed {} '{}' ({} frames, {} bytes)",
                    self.kind,
                    key,
                    open.frames,
                    open.bytes
                );
                Ok(ClosedFile {
                    key,
                    frames: open.frames,
                    bytes: open.bytes,
                })
            }
            Err(e) => {
                let err = MediaError::Finalize {
                    key,
                    message: e.to_string(),
                };
                tracing::error!("{}", err);
                Err(err)
            }
        }
    }

    /// Close every sink; failures are logged and reported, never raised
    pub fn finalize(mut self) -> FinalizeReport {
        let sinks = std::mem::take(&mut self.sinks);
        let mut report = FinalizeReport {
            dir: self.dir.clone(),
            ..Default::default()
        };

        for (key, open) in sinks {
            match self.finish_sink(key.clone(), open) {
                Ok(closed) => report.closed.push(closed),
                Err(_) => report.failed.push(key),
            }
        }

        report
    }
}
