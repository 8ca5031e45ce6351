//! Attachment references and their storage estimate
//!
//! Attachments dominate local storage, so the eviction engine needs a byte figure
//! for each one. The client only holds a base64 preview, which decodes to
//! roughly three quarters of its encoded length.

use serde::{Deserialize, Serialize};

/// Opaque handle to an attachment preview (usually an inline base64 payload)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewHandle(pub String);

impl PreviewHandle {
    /// Encoded length in bytes
    #[inline]
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.0.len()
    }
}

/// Decoded size of a base64 preview, rounded up.
///
/// Padding characters are counted as payload, so the result never falls below
/// the true decoded size.
#[inline]
#[must_use]
pub fn estimate_preview_bytes(encoded_len: usize) -> u64 {
    (encoded_len as u64 * 3).div_ceil(4)
}

/// Attachment owned by exactly one draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    /// Attachment identifier (unique within its draft)
    pub id: String,
    /// Bytes charged against the attachment cap
    pub byte_estimate: u64,
    /// Preview shown by the wizard
    pub preview_handle: PreviewHandle,
}

impl AttachmentRef {
    /// Build from a base64 preview, estimating size from the encoding
    #[must_use]
    pub fn from_preview(id: impl Into<String>, preview: impl Into<String>) -> Self {
        let preview_handle = PreviewHandle(preview.into());
        Self {
            id: id.into(),
            byte_estimate: estimate_preview_bytes(preview_handle.encoded_len()),
            preview_handle,
        }
    }

    /// Record the exact stored size once it is known.
    ///
    /// The estimate is only ever raised so the cap cannot be undercounted.
    #[inline]
    #[must_use]
    pub fn with_exact_size(mut self, stored_bytes: u64) -> Self {
        self.byte_estimate = self.byte_estimate.max(stored_bytes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_preview_bytes(0), 0);
        assert_eq!(estimate_preview_bytes(1), 1);
        assert_eq!(estimate_preview_bytes(4), 3);
        assert_eq!(estimate_preview_bytes(5), 4);
    }

    #[test]
    fn from_preview_estimates_decoded_size() {
        // "hello" encodes to "aGVsbG8=" (8 chars, 5 decoded bytes)
        let attachment = AttachmentRef::from_preview("a", "aGVsbG8=");
        assert_eq!(attachment.byte_estimate, 6);
        assert!(attachment.byte_estimate >= 5);
    }

    #[test]
    fn exact_size_never_lowers_estimate() {
        let attachment = AttachmentRef::from_preview("a", "aGVsbG8=").with_exact_size(2);
        assert_eq!(attachment.byte_estimate, 6);

        let attachment = AttachmentRef::from_preview("a", "aGVsbG8=").with_exact_size(4096);
        assert_eq!(attachment.byte_estimate, 4096);
    }

    proptest! {
        #[test]
        fn prop_estimate_covers_decoded_len(decoded in 0usize..10_000) {
            // Padded base64 of `decoded` bytes is 4 * ceil(decoded / 3) chars.
            let encoded = decoded.div_ceil(3) * 4;
            prop_assert!(estimate_preview_bytes(encoded) >= decoded as u64);
        }
    }
}
