//! Parser Capability: `parse(language_tag, bytes) -> [Chunk draft]`, a
//! pluggable per-language extractor behind an explicit trait + registry
//! (spec.md §4.2, §9).

pub mod error;
pub mod fallback;
pub mod registry;
pub mod treesitter;

pub use error::ParserError;
pub use registry::{ChunkDraft, ExtractOutcome, ExtractorRegistry, LanguageExtractor};
pub use sourcelens_core::Language;
use treesitter::TreeSitterExtractor;

/// Build the registry this workspace ships by default: tree-sitter
/// extractors for every tier-1 grammar linked into this crate, plus
/// fallback extractors for the data/markup languages spec.md's Chunk Store
/// still needs to tag with a language (even if it can't semantically
/// chunk them).
pub fn default_registry() -> ExtractorRegistry {
  let mut registry = ExtractorRegistry::new();
  for &language in TreeSitterExtractor::supported_languages() {
    if let Some(extractor) = TreeSitterExtractor::new(language) {
      registry.register(Box::new(extractor));
    }
  }
  registry.register(Box::new(fallback::MarkdownExtractor));
  for language in [
    Language::Json,
    Language::Yaml,
    Language::Toml,
    Language::Html,
    Language::Css,
  ] {
    registry.register(Box::new(fallback::WholeFileExtractor(language)));
  }
  registry
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_registry_supports_tier1_and_fallback_languages() {
    let registry = default_registry();
    assert!(registry.supports(Language::Rust));
    assert!(registry.supports(Language::Python));
    assert!(registry.supports(Language::Markdown));
    assert!(registry.supports(Language::Json));
    assert!(!registry.supports(Language::Scala));
  }
}
