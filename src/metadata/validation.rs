use super::MetadataError;
use regex::Regex;
use std::sync::LazyLock;

pub const MAX_FILE_SIZE_BYTES: u64 = 100 * 1024 * 1024;
pub const MAX_FILENAME_LEN: usize = 255;

pub const ACCEPTED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "video/mp4",
    "video/webm",
    "video/ogg",
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
    "application/pdf",
    "text/plain",
];

static UNSAFE_FILENAME_CHARS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9.-]").ok());
static UNDERSCORE_RUNS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"_{2,}").ok());
static CID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(Qm[a-zA-Z0-9]{44}|[a-z2-7]{59})$").ok());

/// Size and MIME limits applied before anything is pinned.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    /// Exact MIME types, or `type/*` to accept a whole family.
    pub allowed_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_FILE_SIZE_BYTES,
            allowed_types: ACCEPTED_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl UploadPolicy {
    pub fn allows_type(&self, content_type: &str) -> bool {
        self.allowed_types.iter().any(|allowed| {
            match allowed.strip_suffix("/*") {
                Some(family) => content_type.starts_with(family),
                None => content_type == allowed,
            }
        })
    }

    pub fn check(&self, size: u64, content_type: &str) -> Result<(), MetadataError> {
        if size > self.max_bytes {
            return Err(MetadataError::InvalidUpload(format!(
                "File size exceeds {}MB limit",
                self.max_bytes / (1024 * 1024)
            )));
        }
        if !self.allows_type(content_type) {
            return Err(MetadataError::InvalidUpload(format!(
                "File type not allowed: {content_type}"
            )));
        }
        Ok(())
    }
}

/// Replaces anything outside `[A-Za-z0-9.-]` with `_`, collapses runs of
/// underscores and caps the length.
pub fn sanitize_filename(filename: &str) -> String {
    let (Some(unsafe_chars), Some(runs)) =
        (UNSAFE_FILENAME_CHARS.as_ref(), UNDERSCORE_RUNS.as_ref())
    else {
        return filename.chars().take(MAX_FILENAME_LEN).collect();
    };

    let replaced = unsafe_chars.replace_all(filename, "_");
    let collapsed = runs.replace_all(&replaced, "_");
    collapsed.chars().take(MAX_FILENAME_LEN).collect()
}

/// CIDv0 (`Qm…`, 46 chars) or a base32 CIDv1 (59 chars).
pub fn is_valid_cid(cid: &str) -> bool {
    CID_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(cid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_filenames() {
        assert_eq!(sanitize_filename("my cat (1).png"), "my_cat_1_.png");
        assert_eq!(sanitize_filename("a   b"), "a_b");
        assert_eq!(sanitize_filename("ok-name.v2.txt"), "ok-name.v2.txt");
        assert_eq!(sanitize_filename(&"x".repeat(300)).len(), MAX_FILENAME_LEN);
    }

    #[test]
    fn wildcard_types_match_family() {
        let policy = UploadPolicy {
            max_bytes: 10,
            allowed_types: vec!["image/*".to_string(), "text/plain".to_string()],
        };
        assert!(policy.allows_type("image/png"));
        assert!(policy.allows_type("text/plain"));
        assert!(!policy.allows_type("text/html"));
        assert!(!policy.allows_type("video/mp4"));
    }

    #[test]
    fn rejects_oversized_and_unknown_uploads() {
        let policy = UploadPolicy::default();
        assert!(policy.check(1024, "image/png").is_ok());
        assert!(matches!(
            policy.check(MAX_FILE_SIZE_BYTES + 1, "image/png"),
            Err(MetadataError::InvalidUpload(msg)) if msg.contains("100MB")
        ));
        assert!(matches!(
            policy.check(1024, "application/x-msdownload"),
            Err(MetadataError::InvalidUpload(_))
        ));
    }

    #[test]
    fn recognizes_cid_shapes() {
        assert!(is_valid_cid(&format!("Qm{}", "a".repeat(44))));
        assert!(is_valid_cid(&"b".repeat(59)));
        assert!(!is_valid_cid("Qmshort"));
        assert!(!is_valid_cid(&"B".repeat(59)));
    }
}
