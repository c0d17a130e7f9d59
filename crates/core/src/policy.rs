//! Per-purpose upload allowlists.
//!
//! Each [`Purpose`] selects an [`UploadPolicy`] describing which extensions,
//! MIME types, and sizes an upload may have. Callers may override the built-in
//! table with their own policies.

use std::collections::HashMap;
use std::fmt;

use fm_shared::{FmError, FmResult};
use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Caller-declared upload category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Profile picture.
    Avatar,
    /// Job application document.
    Resume,
    /// Office documents and plain text.
    Document,
    /// Still image.
    Image,
    /// Video clip.
    Video,
    /// Generic attachment.
    Attachment,
    /// Media embedded in CMS content.
    CmsMedia,
}

impl Purpose {
    /// Every built-in purpose.
    pub const ALL: [Self; 7] = [
        Self::Avatar,
        Self::Resume,
        Self::Document,
        Self::Image,
        Self::Video,
        Self::Attachment,
        Self::CmsMedia,
    ];

    /// Convert to the persisted string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Avatar => "avatar",
            Self::Resume => "resume",
            Self::Document => "document",
            Self::Image => "image",
            Self::Video => "video",
            Self::Attachment => "attachment",
            Self::CmsMedia => "cms_media",
        }
    }

    /// Parse from the persisted string value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload constraints for one purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    /// Lowercase extensions without the dot.
    pub allowed_extensions: Vec<String>,
    /// Exact lowercase MIME types.
    pub allowed_mime_types: Vec<String>,
    /// MIME prefixes such as `image/`.
    pub allowed_mime_prefixes: Vec<String>,
    /// Largest accepted object in bytes.
    pub max_bytes: u64,
}

impl UploadPolicy {
    /// Builds a policy from string slices.
    #[must_use]
    pub fn new(extensions: &[&str], mime_types: &[&str], mime_prefixes: &[&str], max_bytes: u64) -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| (*s).to_string()).collect() };
        Self {
            allowed_extensions: owned(extensions),
            allowed_mime_types: owned(mime_types),
            allowed_mime_prefixes: owned(mime_prefixes),
            max_bytes,
        }
    }

    /// Check if an already-normalized extension is allowed.
    #[must_use]
    pub fn allows_extension(&self, ext: &str) -> bool {
        self.allowed_extensions.iter().any(|e| e == ext)
    }

    /// Check if an already-normalized MIME type is allowed.
    #[must_use]
    pub fn allows_mime_type(&self, mime_type: &str) -> bool {
        self.allowed_mime_types.iter().any(|m| m == mime_type)
            || self
                .allowed_mime_prefixes
                .iter()
                .any(|p| mime_type.starts_with(p.as_str()))
    }
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    /// Lowercase extension without the dot.
    pub ext: String,
    /// Lowercase MIME type without parameters.
    pub normalized_mime_type: String,
    /// Purpose whose policy accepted the upload.
    pub effective_purpose: Purpose,
    /// Declared size in bytes.
    pub size_bytes: u64,
}

/// Purpose to policy lookup table.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<Purpose, UploadPolicy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
const IMAGE_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];
const OFFICE_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];
const OFFICE_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

fn concat(parts: &[&[&'static str]]) -> Vec<&'static str> {
    parts.iter().flat_map(|p| p.iter().copied()).collect()
}

impl PolicyTable {
    /// The built-in policy table.
    #[must_use]
    pub fn builtin() -> Self {
        let mut policies = HashMap::new();

        policies.insert(
            Purpose::Avatar,
            UploadPolicy::new(IMAGE_EXTENSIONS, IMAGE_MIME_TYPES, &[], 5 * MIB),
        );
        policies.insert(
            Purpose::Resume,
            UploadPolicy::new(OFFICE_EXTENSIONS, OFFICE_MIME_TYPES, &[], 10 * MIB),
        );

        let doc_ext = concat(&[OFFICE_EXTENSIONS, &["xls", "xlsx", "txt", "csv"][..]]);
        let doc_mime = concat(&[
            OFFICE_MIME_TYPES,
            &[
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "text/plain",
                "text/csv",
            ][..],
        ]);
        policies.insert(
            Purpose::Document,
            UploadPolicy::new(&doc_ext, &doc_mime, &[], 25 * MIB),
        );

        let image_ext = concat(&[IMAGE_EXTENSIONS, &["avif", "svg"][..]]);
        policies.insert(
            Purpose::Image,
            UploadPolicy::new(&image_ext, &[], &["image/"], 20 * MIB),
        );

        policies.insert(
            Purpose::Video,
            UploadPolicy::new(&["mp4", "webm"], &[], &["video/"], 500 * MIB),
        );

        let media_ext = concat(&[&image_ext[..], &["mp4", "webm", "pdf"][..]]);
        policies.insert(
            Purpose::CmsMedia,
            UploadPolicy::new(&media_ext, &["application/pdf"], &["image/", "video/"], 100 * MIB),
        );

        let attach_ext = concat(&[&doc_ext[..], &media_ext[..], &["zip"][..]]);
        let attach_mime = concat(&[&doc_mime[..], &["application/zip"][..]]);
        policies.insert(
            Purpose::Attachment,
            UploadPolicy::new(&attach_ext, &attach_mime, &["image/", "video/"], 50 * MIB),
        );

        Self { policies }
    }

    /// Replace the policy for a purpose.
    #[must_use]
    pub fn with_policy(mut self, purpose: Purpose, policy: UploadPolicy) -> Self {
        self.policies.insert(purpose, policy);
        self
    }

    /// Get the policy for a purpose.
    #[must_use]
    pub fn get(&self, purpose: Purpose) -> Option<&UploadPolicy> {
        self.policies.get(&purpose)
    }

    /// Resolves a purpose name to its policy.
    ///
    /// # Errors
    ///
    /// Returns [`FmError::Policy`] for unknown purposes or purposes with no policy.
    pub fn resolve(&self, purpose: &str) -> FmResult<(Purpose, &UploadPolicy)> {
        let parsed = Purpose::parse(purpose)
            .ok_or_else(|| FmError::policy(format!("unknown upload purpose {purpose:?}")))?;
        let policy = self
            .get(parsed)
            .ok_or_else(|| FmError::policy(format!("no upload policy for purpose {parsed}")))?;
        Ok((parsed, policy))
    }

    /// Validates an upload request against the purpose's policy.
    ///
    /// Checks run in a fixed order so the first failure reported is stable:
    /// size sanity, purpose, size limit, extension, MIME type.
    ///
    /// # Errors
    ///
    /// Returns [`FmError::Validation`] for a non-positive size and
    /// [`FmError::Policy`] for every allowlist violation.
    pub fn validate(
        &self,
        purpose: &str,
        filename: &str,
        mime_type: &str,
        size_bytes: i64,
    ) -> FmResult<ValidatedUpload> {
        let Some(size) = u64::try_from(size_bytes).ok().filter(|s| *s > 0) else {
            return Err(FmError::validation(format!(
                "invalid upload size {size_bytes}"
            )));
        };

        let (effective_purpose, policy) = self.resolve(purpose)?;

        if size > policy.max_bytes {
            return Err(FmError::policy(format!(
                "file size {size} bytes exceeds maximum {} bytes for {effective_purpose}",
                policy.max_bytes
            )));
        }

        let ext = check_extension(policy, effective_purpose, filename)?;
        let normalized_mime_type = check_mime_type(policy, effective_purpose, mime_type)?;

        Ok(ValidatedUpload {
            ext,
            normalized_mime_type,
            effective_purpose,
            size_bytes: size,
        })
    }
}

/// Checks a filename's extension against a policy, returning the extension.
///
/// # Errors
///
/// Returns [`FmError::Policy`] if the extension is missing or not allowed.
pub fn check_extension(policy: &UploadPolicy, purpose: Purpose, filename: &str) -> FmResult<String> {
    let ext = extract_extension(filename)
        .ok_or_else(|| FmError::policy(format!("file {filename:?} has no extension")))?;
    if !policy.allows_extension(&ext) {
        return Err(FmError::policy(format!(
            "extension {ext:?} is not allowed for {purpose}"
        )));
    }
    Ok(ext)
}

/// Checks a MIME type against a policy, returning its normalized form.
///
/// # Errors
///
/// Returns [`FmError::Policy`] if the MIME type is not allowed.
pub fn check_mime_type(policy: &UploadPolicy, purpose: Purpose, mime_type: &str) -> FmResult<String> {
    let normalized = normalize_mime_type(mime_type);
    if normalized.is_empty() || !policy.allows_mime_type(&normalized) {
        return Err(FmError::policy(format!(
            "MIME type {normalized:?} is not allowed for {purpose}"
        )));
    }
    Ok(normalized)
}

/// Final path segment of a client-supplied filename.
#[must_use]
pub fn base_name(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

/// Lowercase extension of the filename's final segment.
#[must_use]
pub fn extract_extension(filename: &str) -> Option<String> {
    let (stem, ext) = base_name(filename).rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Lowercases a MIME type and strips parameters such as `charset`.
#[must_use]
pub fn normalize_mime_type(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}


#[cfg(test)]
#[path = "policy_props.rs"]
mod props;
