//! Property-based tests for link extraction.

use proptest::prelude::*;

use super::*;

fn uid_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{10,30}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// A uid referenced any number of times yields exactly one entry.
    #[test]
    fn prop_repeated_reference_collapses(uid in uid_strategy(), repeats in 1usize..5) {
        let html = format!(r#"<img src="/fm/{uid}?w=1"> "#).repeat(repeats);
        let found = extract_fm_file_uids(&html);
        prop_assert_eq!(found, vec![FileUid::new(uid)]);
    }

    /// Content without an attribute assignment references nothing.
    #[test]
    fn prop_plain_text_has_no_references(text in "[^=]{0,200}") {
        prop_assert!(extract_fm_file_uids(&text).is_empty());
    }

    /// Every extracted uid is within the accepted length window.
    #[test]
    fn prop_extracted_uids_in_window(text in r#"(<img src="/fm/[A-Za-z0-9]{0,40}"> ?){0,6}"#) {
        for uid in extract_fm_file_uids(&text) {
            prop_assert!((10..=30).contains(&uid.as_str().len()));
        }
    }
}
