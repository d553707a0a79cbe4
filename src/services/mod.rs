//! Business logic services

pub mod commit;
pub mod import;
pub mod job_history;
pub mod mapping;
pub mod parser;
pub mod preview;
pub mod schema;
pub mod transform;
pub mod wizard;
