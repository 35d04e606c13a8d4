#![forbid(unsafe_code)]

mod graph;
mod source;

pub use graph::{mondo_curie, parse_document};
pub use source::{DEFAULT_SOURCE_URL, FileFetcher, HttpFetcher};
