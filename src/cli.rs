// Command-line interface definitions for callrecorder
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "callrecorder")]
#[command(author, version, about = "Silent-participant call recorder")]
#[command(long_about = "
Callrecorder joins conference calls as a silent participant and records
every speaker, camera and screen share to its own file. When a call ends
the recordings are listed in a manifest, zipped and uploaded to a document
library.

WORKING FILES:
  {root}/{callId}/audio/all.wav        mixed audio
  {root}/{callId}/audio/{adId}.wav     one file per speaker
  {root}/{callId}/video/V_{key}.h264   one file per camera source
  {root}/{callId}/vbss/VB_{key}.h264   one file per screen share

RECOVERY:
  Working directories are kept when an upload fails.
  Run: callrecorder calls (to list them)
  Run: callrecorder package <CALL_ID> (to retry packaging and upload)
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the recording output root
    #[arg(long, value_name = "DIR")]
    pub output_root: Option<std::path::PathBuf>,

    /// Skip uploading, keep archives on disk
    #[arg(long)]
    pub no_upload: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show current configuration
    Config,

    /// List call working directories left on disk
    Calls,

    /// Package and upload a call from its on-disk manifest
    Package {
        /// Call id (name of the working directory)
        call_id: String,

        /// Meeting name used for the archive (defaults to the call id)
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
    },

    /// Write the default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}
