//! Type definitions

pub mod import;
pub mod messages;
pub mod wizard;
