use anyhow::{Context, Result};
use blake3::Hasher;
use serde::Serialize;

use crate::error::LaneaError;
use crate::types::FileType;

/// Emit a value as JCS-canonical JSON (RFC 8785).
///
/// This is the standard way to emit JSON for every persisted artifact kind
/// (committee outputs, status, decision packets, sufficiency records): JCS
/// guarantees deterministic output regardless of field ordering in the
/// source struct, which is what makes the round-trip idempotence property
/// achievable rather than merely asserted.
///
/// # Example
///
/// ```rust,no_run
/// use lanea_utils::canonicalization::emit_jcs;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct MyOutput {
///     name: String,
///     value: i32,
/// }
///
/// let output = MyOutput { name: "test".into(), value: 42 };
/// let json = emit_jcs(&output).expect("serialization should succeed");
/// println!("{}", json);
/// ```
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}

pub const CANON_VERSION: &str = "jcs-v1,md-v1";
pub const CANONICALIZATION_BACKEND: &str = "jcs-rfc8785";

/// Deterministic canonicalization and content hashing for the three file
/// kinds this core persists: JSON (every structured artifact), Markdown
/// (human-facing renders), and plain text.
pub struct Canonicalizer {
    version: String,
}

impl Canonicalizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: CANON_VERSION.to_string(),
        }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub const fn backend(&self) -> &'static str {
        CANONICALIZATION_BACKEND
    }

    /// Canonicalize already-serialized JSON text via JCS (RFC 8785).
    pub fn canonicalize_json(&self, content: &str) -> Result<String> {
        let value: serde_json::Value =
            serde_json::from_str(content).with_context(|| "Failed to parse JSON content")?;
        let bytes = serde_json_canonicalizer::to_vec(&value)
            .with_context(|| "Failed to canonicalize JSON using JCS")?;
        String::from_utf8(bytes).with_context(|| "JCS output contained invalid UTF-8")
    }

    /// Normalize Markdown content.
    ///
    /// Rules: normalize line endings to `\n`, trim trailing whitespace per
    /// line, collapse trailing blank lines to exactly one, normalize `~~~`
    /// fences to ``` ``` ``` while preserving the language tag, and enforce
    /// a single final newline.
    pub fn normalize_markdown(&self, content: &str) -> Result<String> {
        let normalized = self.normalize_line_endings(content);

        let mut cleaned_lines: Vec<String> = normalized
            .lines()
            .map(|line| line.trim_end().to_string())
            .collect();

        for line in &mut cleaned_lines {
            if line.starts_with("~~~") {
                let lang_tag = line.trim_start_matches('~').trim();
                *line = if lang_tag.is_empty() {
                    "```".to_string()
                } else {
                    format!("```{lang_tag}")
                };
            }
        }

        let mut joined = cleaned_lines.join("\n");
        while joined.ends_with("\n\n\n") {
            joined = joined.trim_end_matches('\n').to_string() + "\n\n";
        }
        joined = joined.trim_end_matches('\n').to_string() + "\n";

        Ok(joined)
    }

    /// Normalize plain text content (line endings only).
    #[must_use]
    pub fn normalize_text(&self, content: &str) -> String {
        self.normalize_line_endings(content)
    }

    /// Compute the BLAKE3 hash of canonicalized content, dispatching
    /// normalization by [`FileType`].
    pub fn hash_canonicalized(&self, content: &str, file_type: FileType) -> Result<String> {
        let hash_input = match file_type {
            FileType::Json => self.canonicalize_json(content)?,
            FileType::Markdown => self.normalize_markdown(content)?,
            FileType::Text => self.normalize_text(content),
        };

        let mut hasher = Hasher::new();
        hasher.update(hash_input.as_bytes());
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Like [`Self::hash_canonicalized`] but wraps failures as a
    /// [`LaneaError::Fatal`] tagged with the calling phase.
    pub fn hash_canonicalized_with_context(
        &self,
        content: &str,
        file_type: FileType,
        phase: &str,
    ) -> Result<String, LaneaError> {
        self.hash_canonicalized(content, file_type)
            .map_err(|e| LaneaError::Fatal(format!("canonicalization failed in {phase}: {e}")))
    }

    fn normalize_line_endings(&self, content: &str) -> String {
        content.replace("\r\n", "\n").replace('\r', "\n")
    }
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_normalization_trims_and_collapses() {
        let canonicalizer = Canonicalizer::new();
        let content = "# Title\r\n\r\nSome content with trailing spaces   \r\n\r\n\r\n\r\n";
        let normalized = canonicalizer.normalize_markdown(content).unwrap();
        assert_eq!(normalized, "# Title\n\nSome content with trailing spaces\n");
    }

    #[test]
    fn markdown_fence_normalization_preserves_language_tag() {
        let canonicalizer = Canonicalizer::new();
        let content = "~~~rust\nfn main() {}\n~~~\n";
        let normalized = canonicalizer.normalize_markdown(content).unwrap();
        assert!(normalized.contains("```rust"));
        assert!(!normalized.contains("~~~"));
    }

    #[test]
    fn text_normalization_strips_carriage_returns() {
        let canonicalizer = Canonicalizer::new();
        let normalized = canonicalizer.normalize_text("line1\r\nline2\rline3\n");
        assert_eq!(normalized, "line1\nline2\nline3\n");
    }

    #[test]
    fn json_hash_is_stable_across_key_order() {
        let canonicalizer = Canonicalizer::new();
        let a = r#"{"b":1,"a":2}"#;
        let b = r#"{"a":2,"b":1}"#;
        let hash_a = canonicalizer.hash_canonicalized(a, FileType::Json).unwrap();
        let hash_b = canonicalizer.hash_canonicalized(b, FileType::Json).unwrap();
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn markdown_hash_is_stable_across_line_endings() {
        let canonicalizer = Canonicalizer::new();
        let md1 = "# Title\n\nContent with trailing spaces   \n\n\n";
        let md2 = "# Title\r\n\r\nContent with trailing spaces\r\n";
        let hash1 = canonicalizer
            .hash_canonicalized(md1, FileType::Markdown)
            .unwrap();
        let hash2 = canonicalizer
            .hash_canonicalized(md2, FileType::Markdown)
            .unwrap();
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn invalid_json_fails_canonicalization() {
        let canonicalizer = Canonicalizer::new();
        let result = canonicalizer.hash_canonicalized("{not valid", FileType::Json);
        assert!(result.is_err());
    }

    #[test]
    fn version_and_backend_strings() {
        let canonicalizer = Canonicalizer::new();
        assert_eq!(canonicalizer.version(), "jcs-v1,md-v1");
        assert_eq!(canonicalizer.backend(), "jcs-rfc8785");
    }
}
