//! Common types used across the file manager.

pub mod id;
pub mod pagination;

pub use id::*;
pub use pagination::{FileOrder, MAX_PAGE_SIZE, PageRequest, PageResponse};
