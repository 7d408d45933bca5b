//! Non-AST extractors for languages with no linked tree-sitter grammar.
//! Markdown gets heading-bounded chunks (spec.md's `header` kind exists
//! precisely for this); everything else is one whole-file `code-block`.

use sourcelens_core::{ChunkType, Language};

use crate::registry::{ChunkDraft, ExtractOutcome, LanguageExtractor};

pub struct MarkdownExtractor;

impl LanguageExtractor for MarkdownExtractor {
  fn language(&self) -> Language {
    Language::Markdown
  }

  fn extract(&self, source: &str) -> ExtractOutcome {
    let lines: Vec<&str> = source.lines().collect();
    let heading_starts: Vec<usize> = lines
      .iter()
      .enumerate()
      .filter(|(_, l)| l.trim_start().starts_with('#'))
      .map(|(i, _)| i)
      .collect();

    if heading_starts.is_empty() {
      if source.trim().is_empty() {
        return ExtractOutcome::default();
      }
      return ExtractOutcome {
        chunks: vec![ChunkDraft {
          kind: ChunkType::CodeBlock,
          symbol: "document".to_string(),
          start_line: 1,
          end_line: lines.len().max(1) as u32,
          code: source.to_string(),
        }],
        soft_errors: Vec::new(),
      };
    }

    let mut chunks = Vec::new();
    for (idx, &start) in heading_starts.iter().enumerate() {
      let end = heading_starts.get(idx + 1).copied().unwrap_or(lines.len());
      let symbol = lines[start].trim_start_matches('#').trim().to_string();
      let code = lines[start..end].join("\n");
      if code.trim().is_empty() {
        continue;
      }
      chunks.push(ChunkDraft {
        kind: ChunkType::Header,
        symbol: if symbol.is_empty() { "untitled".to_string() } else { symbol },
        start_line: start as u32 + 1,
        end_line: end as u32,
        code,
      });
    }

    ExtractOutcome {
      chunks,
      soft_errors: Vec::new(),
    }
  }
}

/// Treats the whole file as a single opaque block. Used for data/config
/// languages (JSON, YAML, TOML, HTML, CSS) where the corpus has no query
/// grounding for meaningful sub-file spans.
pub struct WholeFileExtractor(pub Language);

impl LanguageExtractor for WholeFileExtractor {
  fn language(&self) -> Language {
    self.0
  }

  fn extract(&self, source: &str) -> ExtractOutcome {
    if source.trim().is_empty() {
      return ExtractOutcome::default();
    }
    ExtractOutcome {
      chunks: vec![ChunkDraft {
        kind: ChunkType::CodeBlock,
        symbol: "file".to_string(),
        start_line: 1,
        end_line: source.lines().count().max(1) as u32,
        code: source.to_string(),
      }],
      soft_errors: Vec::new(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn markdown_splits_on_headings() {
    let extractor = MarkdownExtractor;
    let source = "# Title\nintro\n\n## Section\nbody\n";
    let outcome = extractor.extract(source);
    assert_eq!(outcome.chunks.len(), 2);
    assert_eq!(outcome.chunks[0].symbol, "Title");
    assert_eq!(outcome.chunks[1].symbol, "Section");
  }

  #[test]
  fn markdown_without_headings_is_one_block() {
    let extractor = MarkdownExtractor;
    let outcome = extractor.extract("just prose, no headings\n");
    assert_eq!(outcome.chunks.len(), 1);
    assert_eq!(outcome.chunks[0].kind, ChunkType::CodeBlock);
  }

  #[test]
  fn empty_file_yields_no_chunks() {
    let extractor = WholeFileExtractor(Language::Json);
    let outcome = extractor.extract("   \n  \n");
    assert!(outcome.chunks.is_empty());
  }
}
