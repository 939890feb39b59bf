//! Playlist ingestion module
//!
//! - Incremental M3U parsing tolerant of reversed entry ordering
//! - Process-lifetime cache keyed by playlist URL
//! - Multi-identity upstream fetch with optional early partial reply

pub mod cache;
pub mod ingest;
pub mod parser;

pub use ingest::{PlaylistIngestor, PlaylistQuery, PlaylistReply};
