//! Call event capture
//!
//! Appends participant roster changes and the end-of-call audio quality
//! report as JSON lines, one file per stream of events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Audio quality summary reported by the platform when the call ends
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioQualityReport {
    pub call_id: String,
    pub received_packets: u64,
    pub lost_packets: u64,
    pub average_jitter_ms: f64,
    pub max_jitter_ms: f64,
}

impl AudioQualityReport {
    /// Fraction of packets lost, 0.0 when nothing was received
    pub fn loss_rate(&self) -> f64 {
        let total = self.received_packets + self.lost_packets;
        if total == 0 {
            0.0
        } else {
            self.lost_packets as f64 / total as f64
        }
    }
}

/// Roster change kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterChange {
    Added,
    Removed,
    Updated,
}

/// One roster change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantEvent {
    pub change: RosterChange,
    pub participant_id: String,
    pub display_name: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Serialize)]
struct Line<'a, T: Serialize> {
    event: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

/// Append-only JSON lines writer for a call's events
#[derive(Debug, Clone)]
pub struct EventCapture {
    dir: PathBuf,
}

impl EventCapture {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append<T: Serialize>(&self, file: &str, event: &str, body: &T) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut line = serde_json::to_string(&Line { event, body })
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))?;
        out.write_all(line.as_bytes())
    }

    pub fn participant(&self, event: &ParticipantEvent) -> std::io::Result<()> {
        self.append("participants.jsonl", "participant", event)
    }

    pub fn audio_quality(&self, report: &AudioQualityReport) -> std::io::Result<()> {
        self.append("quality.jsonl", "audioQuality", report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_appends_json_lines() {
        let temp = TempDir::new().unwrap();
        let capture = EventCapture::new(temp.path().join("events/call-1"));

        for change in [RosterChange::Added, RosterChange::Removed] {
            capture
                .participant(&ParticipantEvent {
                    change,
                    participant_id: "p1".into(),
                    display_name: Some("Ann".into()),
                    at: Utc::now(),
                })
                .unwrap();
        }

        let contents =
            std::fs::read_to_string(temp.path().join("events/call-1/participants.jsonl")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "participant");
        assert_eq!(first["change"], "added");
        assert_eq!(first["participantId"], "p1");
    }

    #[test]
    fn test_quality_report() {
        let temp = TempDir::new().unwrap();
        let capture = EventCapture::new(temp.path());
        let report = AudioQualityReport {
            call_id: "c".into(),
            received_packets: 90,
            lost_packets: 10,
            ..Default::default()
        };
        assert!((report.loss_rate() - 0.1).abs() < f64::EPSILON);
        capture.audio_quality(&report).unwrap();
        assert!(temp.path().join("quality.jsonl").exists());
    }
}
