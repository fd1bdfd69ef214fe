//! Typed wrapper over the upstream document service.
//!
//! Exposes exactly the operations the rest of the system needs: start-page
//! tokens, watch/stop subscription management, paged change listing with a
//! pinned field projection, shared-drive enumeration, and file
//! download/export for the copier.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DriveClient, CHANGES_FIELDS, CHANGES_PAGE_SIZE};
pub use error::UpstreamError;
pub use types::{
    ChangeListResponse, DownloadResult, DriveListResponse, WatchResponse, WireChange, WireDrive,
    WireFile, WireUser,
};
