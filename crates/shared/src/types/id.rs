//! Typed uids for type-safe entity references.
//!
//! Using typed uids prevents accidentally passing a `VariantUid` where a `FileUid` is expected.
//! Uids are opaque strings; generated ones are short enough to be recognized
//! inside rendered content.

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of generated uids.
pub const GENERATED_UID_LEN: usize = 20;

/// Longest uid accepted when parsing.
pub const MAX_UID_LEN: usize = 64;

/// Error returned when parsing a malformed uid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid uid: {0:?}")]
pub struct InvalidUid(pub String);

fn generate_uid() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_UID_LEN)
        .map(char::from)
        .collect()
}

fn is_valid_uid(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_UID_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Macro to generate typed uid wrappers.
macro_rules! typed_uid {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new random uid.
            #[must_use]
            pub fn generate() -> Self {
                Self(generate_uid())
            }

            /// Wraps an existing value without validation.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the uid as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidUid;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if is_valid_uid(s) {
                    Ok(Self(s.to_string()))
                } else {
                    Err(InvalidUid(s.to_string()))
                }
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_uid!(FileUid, "Unique identifier for a managed file.");
typed_uid!(VariantUid, "Unique identifier for a file variant.");
typed_uid!(LinkId, "Unique identifier for a file link.");
typed_uid!(UserUid, "Unique identifier for a user.");

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
