//! Database queries

pub mod client;
pub mod invoice;
