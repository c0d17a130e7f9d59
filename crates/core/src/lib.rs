//! File manager core.
//!
//! Upload orchestration, variant handling, deletion and moves over pluggable
//! object storage, with persistence delegated to a host-provided connector.
//!
//! # Modules
//!
//! - `fm` - File manager service, rows, and request types
//! - `connector` - Persistence boundary and the in-memory connector
//! - `storage` - Storage adapters (local filesystem, S3-compatible, memory)
//! - `storage_key` - `{bucket}/{object_key}` codec with traversal checks
//! - `policy` - Per-purpose extension, MIME, and size allowlists
//! - `sniff` - MIME and image dimension detection from magic bytes
//! - `links` - Content link extraction, reconciliation, and tracking

pub mod connector;
pub mod fm;
pub mod links;
pub mod policy;
pub mod sniff;
pub mod storage;
pub mod storage_key;
