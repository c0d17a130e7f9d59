//! Property-based tests for the storage key codec.

use proptest::prelude::*;

use super::*;

fn bucket_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9._-]{0,30}"
}

fn object_key_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Za-z0-9_-][A-Za-z0-9._ -]{0,12}", 1..6)
        .prop_map(|segments| segments.join("/"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Decoding an encoded reference yields the original reference.
    #[test]
    fn prop_encode_decode_roundtrip(
        bucket in bucket_strategy(),
        object_key in object_key_strategy(),
    ) {
        let original = StorageRef::new(bucket, object_key);
        let key = encode(&original).expect("valid components encode");
        prop_assert_eq!(decode(&key).expect("encoded key decodes"), original);
    }

    /// Any key with a leading traversal segment is rejected.
    #[test]
    fn prop_leading_traversal_rejected(
        bucket in bucket_strategy(),
        object_key in object_key_strategy(),
        depth in 1usize..4,
    ) {
        let escaping = format!("{}{}", "../".repeat(depth), object_key);
        prop_assert!(encode(&StorageRef::new(bucket.clone(), escaping.clone())).is_err());
        let storage_key = format!("{bucket}/{escaping}");
        prop_assert!(try_decode(&storage_key).is_none());
    }

    /// `try_decode` agrees with `decode` on arbitrary input.
    #[test]
    fn prop_try_decode_matches_decode(input in ".{0,40}") {
        prop_assert_eq!(try_decode(&input), decode(&input).ok());
    }
}
