#![forbid(unsafe_code)]

pub mod config;
pub mod data_store;
pub mod fetch;
pub mod human;
pub mod ingest;
pub mod ingest_error;
pub mod map;
pub mod normalize;
pub mod raw_node;
pub mod record;
pub mod report;
pub mod retry;
pub mod row;
pub mod runner;
pub mod subset;
pub mod system;

pub use ingest_error::{IngestError, IngestResult};
