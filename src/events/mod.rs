//! Shaping of upstream changes into emitted events.

pub mod shape;

pub use shape::{detail_type, event_source, to_detail, DetailType};
