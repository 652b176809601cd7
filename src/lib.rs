//! Callrecorder: silent-participant call recorder
//!
//! This library provides the core functionality for:
//! - Copying real-time audio, video and screen-share buffers off platform callbacks
//! - Writing one file per speaker and per video source, keyed by identity
//! - Keeping a bounded pool of video sockets pointed at the most relevant participants
//! - Packaging a finished call into a manifest and zip, then uploading it
//!
//! # Architecture
//!
//! ```text
//!                            ┌─────────────────────────────────────┐
//!                            │            CallSession              │
//!                            └─────────────────────────────────────┘
//!                                            │
//!                   ┌────────────────────────┼────────────────────────┐
//!                   │                        │                        │
//!                   ▼                        ▼                        ▼
//!          ┌──────────────┐         ┌──────────────┐         ┌──────────────┐
//!          │    Roster    │         │ Subscription │         │   Meeting    │
//!          │              │         │ Manager (LRU)│         │   Mapping    │
//!          └──────────────┘         └──────────────┘         └──────────────┘
//!                   │                        │ (socket, serial)
//!                   │ attribution            │
//!                   ▼                        ▼
//!          ┌─────────────────────────────────────────────────────────────────┐
//!          │                   MediaStreamCoordinator                        │
//!          │   audio lane ─▶ AudioProcessor ─▶ {adId}.wav, all.wav           │
//!          │   video lane ─▶ VideoProcessor ─▶ V_{key}.h264                  │
//!          │   vbss lane  ─▶ VideoProcessor ─▶ VB_{key}.h264                 │
//!          └─────────────────────────────────────────────────────────────────┘
//!                                            │
//!                                            ▼ file info
//!                                   ┌──────────────┐
//!                                   │  Recording   │
//!                                   │   Registry   │
//!                                   └──────────────┘
//!                                            │
//!                                            ▼ call terminated
//!                                   ┌──────────────┐
//!                                   │   Packager   │ manifest, zip
//!                                   └──────────────┘
//!                                            │
//!                                            ▼
//!                                   ┌──────────────┐
//!                                   │   Uploader   │ directory / http
//!                                   └──────────────┘
//! ```

pub mod call;
pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod recording;
pub mod subscription;

pub use call::{CallSession, Packager};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{RecorderError, Result};
pub use media::MediaKind;
