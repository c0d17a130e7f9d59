use super::*;
use std::collections::HashSet;
use std::str::FromStr;

#[test]
fn test_generated_uid_shape() {
    let uid = FileUid::generate();
    assert_eq!(uid.as_str().len(), GENERATED_UID_LEN);
    assert!(uid.as_str().bytes().all(|b| b.is_ascii_alphanumeric()));
}

#[test]
fn test_generated_uids_differ() {
    let uids: HashSet<_> = (0..100).map(|_| VariantUid::generate()).collect();
    assert_eq!(uids.len(), 100);
}

#[test]
fn test_typed_uid_display() {
    let uid = UserUid::new("user_0001");
    assert_eq!(format!("{uid}"), "user_0001");
    assert_eq!(uid.clone().into_inner(), "user_0001");
}

#[test]
fn test_typed_uid_from_str() {
    let uid = FileUid::from_str("abc-DEF_123").unwrap();
    assert_eq!(uid.as_str(), "abc-DEF_123");
}

#[test]
fn test_typed_uid_from_str_error() {
    assert!(FileUid::from_str("").is_err());
    assert!(FileUid::from_str("has space").is_err());
    assert!(FileUid::from_str("../etc").is_err());
    assert!(LinkId::from_str(&"x".repeat(MAX_UID_LEN + 1)).is_err());
}

#[test]
fn test_typed_uid_serde_transparent() {
    let uid = FileUid::new("f1234567890");
    let json = serde_json::to_string(&uid).unwrap();
    assert_eq!(json, "\"f1234567890\"");
    let back: FileUid = serde_json::from_str(&json).unwrap();
    assert_eq!(back, uid);
}
