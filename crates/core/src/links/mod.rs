//! Tracking which content references which files.
//!
//! Rendered content is scanned for file URLs, and the link table is
//! reconciled against the result whenever the content changes.

mod extract;
mod reconcile;
mod tracker;

pub use extract::extract_fm_file_uids;
pub use reconcile::{ReconcileOutcome, reconcile_fm_links};
pub use tracker::{
    CmsLinkTracker, CmsLinkTrackerConfig, ContentEventKind, ContentWriteEvent,
    create_cms_fm_link_tracker,
};
