//! Core domain types: identifiers, the durable channel record, and the
//! emitted event payload shapes.

pub mod channel;
pub mod event;
pub mod ids;

pub use channel::{Channel, ChannelState};
pub use event::{Change, Detail, Drive, Entity, File, S3Copy, User};
pub use ids::{ChannelId, DriveId, ResourceId, DEFAULT_DRIVE_ID, DEFAULT_DRIVE_NAME};
