//! Persistent time-series store

pub mod repository;
pub mod schema;

pub use repository::{
    FlowRecord, PruneReport, QueryEntity, QueryRows, Repository, TickBatch, TimeRange,
};
