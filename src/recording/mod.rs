//! Recording files and their on-disk containers

pub mod file_info;
pub mod layout;
pub mod writer;

pub use file_info::{
    RecordingFileInfo, RecordingRegistry, ALL_SPEAKERS_KEY, MANIFEST_FILE_NAME,
};
pub use layout::CallLayout;
pub use writer::{IdentityWriter, SinkFactory, StreamSink};
