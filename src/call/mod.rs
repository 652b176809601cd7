//! Call lifecycle: session state, meeting mapping, event capture and packaging

pub mod events;
pub mod mapping;
pub mod packaging;
pub mod session;

pub use events::{AudioQualityReport, EventCapture, ParticipantEvent, RosterChange};
pub use mapping::{claim_meeting_mapping, BlobStore, FsBlobStore, MeetingMapping};
pub use packaging::{
    archive_name, check_file_generated, files_complete, Archiver, DirectoryUploader,
    HttpUploader, PackageReport, Packager, UploadOutcome, Uploader, ZipCommandArchiver,
};
pub use session::{CallSession, CallState};
