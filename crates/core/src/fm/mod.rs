//! File manager domain: rows, request types, object layout, and the service.

mod hooks;
pub mod layout;
mod service;
mod types;

pub use hooks::{WriteAction, WriteEvent, WriteHook};
pub use service::FmService;
pub use types::*;
