//! Text validation before embedding, adapted from
//! `crates/backend/src/embedding/validation.rs`. Extended per spec.md §4.4:
//! empty or whitespace-only chunk text is substituted with a sentinel token
//! rather than sent to the provider as-is (some providers reject/`NaN` on
//! blank input).

use tracing::warn;

/// Conservative estimate; real tokenizers vary, but this keeps the size
/// check cheap and provider-agnostic.
const CHARS_PER_TOKEN: usize = 4;

/// Placeholder embedded in place of an empty or whitespace-only chunk, so a
/// later regex/vector search over "nothing" still has a defined embedding
/// rather than being skipped silently.
pub const EMPTY_TEXT_SENTINEL: &str = "[[empty]]";

#[derive(Debug, Clone)]
pub struct TextValidationConfig {
  pub max_tokens: usize,
  pub chars_per_token: usize,
}

impl TextValidationConfig {
  pub fn for_context_length(context_length: usize) -> Self {
    Self {
      max_tokens: context_length,
      chars_per_token: CHARS_PER_TOKEN,
    }
  }

  pub fn max_chars(&self) -> usize {
    self.max_tokens * self.chars_per_token
  }

  pub fn estimate_tokens(&self, text: &str) -> usize {
    text.len() / self.chars_per_token
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
  Valid,
  SentinelSubstituted,
  Truncated {
    original_len: usize,
    truncated_len: usize,
    estimated_original_tokens: usize,
  },
}

/// Validate and, if needed, truncate or substitute `text` before it's sent
/// to an embedding provider. Truncation happens at character boundaries to
/// avoid splitting multi-byte UTF-8.
pub fn validate_and_truncate(text: &str, config: &TextValidationConfig) -> (String, ValidationResult) {
  if text.trim().is_empty() {
    return (EMPTY_TEXT_SENTINEL.to_string(), ValidationResult::SentinelSubstituted);
  }

  let estimated_tokens = config.estimate_tokens(text);
  if estimated_tokens <= config.max_tokens {
    return (text.to_string(), ValidationResult::Valid);
  }

  let max_chars = config.max_chars();
  let truncated: String = text.chars().take(max_chars).collect();
  let truncated_len = truncated.len();

  warn!(
    original_len = text.len(),
    truncated_len, estimated_tokens, max_tokens = config.max_tokens, "text exceeds embedding context limit, truncating"
  );

  (
    truncated,
    ValidationResult::Truncated {
      original_len: text.len(),
      truncated_len,
      estimated_original_tokens: estimated_tokens,
    },
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn for_context_length_computes_max_chars() {
    let config = TextValidationConfig::for_context_length(4096);
    assert_eq!(config.max_tokens, 4096);
    assert_eq!(config.max_chars(), 4096 * 4);
  }

  #[test]
  fn valid_text_passes_through() {
    let config = TextValidationConfig::for_context_length(100);
    let text = "Hello, world!";
    let (result, validation) = validate_and_truncate(text, &config);
    assert_eq!(result, text);
    assert_eq!(validation, ValidationResult::Valid);
  }

  #[test]
  fn empty_text_gets_sentinel() {
    let config = TextValidationConfig::for_context_length(100);
    let (result, validation) = validate_and_truncate("   \n\t  ", &config);
    assert_eq!(result, EMPTY_TEXT_SENTINEL);
    assert_eq!(validation, ValidationResult::SentinelSubstituted);
  }

  #[test]
  fn truncated_text_respects_char_limit() {
    let config = TextValidationConfig {
      max_tokens: 2,
      chars_per_token: 4,
    };
    let text = "Hello, wonderful world!";
    let (result, validation) = validate_and_truncate(text, &config);
    assert_eq!(result, "Hello, w");
    match validation {
      ValidationResult::Truncated { original_len, truncated_len, .. } => {
        assert_eq!(original_len, 23);
        assert_eq!(truncated_len, 8);
      }
      _ => panic!("expected Truncated"),
    }
  }

  #[test]
  fn unicode_truncation_stays_on_char_boundaries() {
    let config = TextValidationConfig {
      max_tokens: 1,
      chars_per_token: 4,
    };
    let text = "Hello 世界!";
    let (result, _) = validate_and_truncate(text, &config);
    assert_eq!(result.chars().count(), 4);
  }
}
