//! File reference extraction from rendered content.

use std::collections::HashSet;
use std::sync::LazyLock;

use fm_shared::types::FileUid;
use regex::Regex;

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:src|href)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute pattern compiles")
});

static FILE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:/files/([A-Za-z0-9_-]{10,30})/content|/(?:fm|media)/([A-Za-z0-9_-]{10,30}))(?:[?#]|$)",
    )
    .expect("file url pattern compiles")
});

/// Finds the file uids referenced by `src` and `href` attributes.
///
/// Two URL shapes are recognized: the admin content route
/// `.../files/{uid}/content` and the short forms `/fm/{uid}` and
/// `/media/{uid}`, each optionally followed by a query string or fragment.
/// Uids are 10 to 30 characters of `[A-Za-z0-9_-]`. Results are in order of
/// first appearance with duplicates removed.
#[must_use]
pub fn extract_fm_file_uids(content: &str) -> Vec<FileUid> {
    let mut seen = HashSet::new();
    let mut uids = Vec::new();

    for attribute in ATTRIBUTE.captures_iter(content) {
        let Some(value) = attribute
            .get(1)
            .or_else(|| attribute.get(2))
            .or_else(|| attribute.get(3))
        else {
            continue;
        };
        for url in FILE_URL.captures_iter(value.as_str()) {
            let Some(uid) = url.get(1).or_else(|| url.get(2)) else {
                continue;
            };
            if seen.insert(uid.as_str()) {
                uids.push(FileUid::new(uid.as_str()));
            }
        }
    }
    uids
}


#[cfg(test)]
#[path = "extract_props.rs"]
mod props;
