//! Property-based tests for upload policy validation.

use proptest::prelude::*;

use super::*;

fn purpose_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(Purpose::ALL.iter().map(Purpose::as_str).collect::<Vec<_>>())
            .prop_map(str::to_string),
        "[a-z_]{0,12}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// A non-positive size is rejected as a validation error whatever else is sent.
    #[test]
    fn prop_non_positive_size_rejected(
        purpose in purpose_strategy(),
        filename in ".{0,40}",
        mime in ".{0,40}",
        size in i64::MIN..=0i64,
    ) {
        let result = PolicyTable::builtin().validate(&purpose, &filename, &mime, size);
        prop_assert!(matches!(result, Err(FmError::Validation(_))));
    }

    /// Extension checks only look at the final path segment.
    #[test]
    fn prop_extension_ignores_directories(
        dirs in prop::collection::vec("[a-z.]{1,8}", 0..4),
        stem in "[a-z]{1,8}",
        separator in prop::sample::select(vec!["/", "\\"]),
    ) {
        let mut path = dirs.join(separator);
        if !path.is_empty() {
            path.push_str(separator);
        }
        path.push_str(&stem);
        path.push_str(".PDF");
        let extension = extract_extension(&path);
        prop_assert_eq!(extension.as_deref(), Some("pdf"));
    }
}
