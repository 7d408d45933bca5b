//! Tree-sitter backed `LanguageExtractor` implementations. Grounded in
//! `crates/parser/src/parser.rs`'s query-capture-to-`DefinitionKind` dance
//! and `crates/parser/src/queries/{rust,python}.rs`'s definitions queries,
//! generalized to directly emit `ChunkDraft`s instead of an intermediate
//! `Definition` type the coordinator would have to re-walk.

use std::sync::Mutex;

use sourcelens_core::{ChunkType, Language};
use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};

use crate::error::ParserError;
use crate::registry::{ChunkDraft, ExtractOutcome, LanguageExtractor};

/// Maps a query capture name's `definition.<suffix>` to a chunk kind.
fn chunk_type_for_capture(name: &str) -> Option<ChunkType> {
  match name.strip_prefix("definition.")? {
    "function" => Some(ChunkType::Function),
    "method" => Some(ChunkType::Method),
    "class" => Some(ChunkType::Class),
    "struct" => Some(ChunkType::Struct),
    "enum" => Some(ChunkType::Enum),
    "trait" | "interface" => Some(ChunkType::Interface),
    "module" => Some(ChunkType::Module),
    _ => None,
  }
}

fn definitions_query_for(language: Language) -> Option<&'static str> {
  match language {
    Language::Rust => Some(
      r#"
(function_item name: (identifier) @name) @definition.function
(impl_item body: (declaration_list (function_item name: (identifier) @name) @definition.method))
(struct_item name: (type_identifier) @name) @definition.struct
(enum_item name: (type_identifier) @name) @definition.enum
(trait_item name: (type_identifier) @name) @definition.trait
(mod_item name: (identifier) @name) @definition.module
"#,
    ),
    Language::Python => Some(
      r#"
(function_definition name: (identifier) @name) @definition.function
(class_definition name: (identifier) @name) @definition.class
(class_definition body: (block (function_definition name: (identifier) @name) @definition.method))
"#,
    ),
    Language::JavaScript | Language::Jsx => Some(
      r#"
(function_declaration name: (identifier) @name) @definition.function
(class_declaration name: (identifier) @name) @definition.class
(method_definition name: (property_identifier) @name) @definition.method
"#,
    ),
    Language::TypeScript | Language::Tsx => Some(
      r#"
(function_declaration name: (identifier) @name) @definition.function
(class_declaration name: (type_identifier) @name) @definition.class
(interface_declaration name: (type_identifier) @name) @definition.interface
(method_definition name: (property_identifier) @name) @definition.method
"#,
    ),
    Language::Go => Some(
      r#"
(function_declaration name: (identifier) @name) @definition.function
(method_declaration name: (field_identifier) @name) @definition.method
(type_spec name: (type_identifier) @name type: (struct_type)) @definition.struct
(type_spec name: (type_identifier) @name type: (interface_type)) @definition.interface
"#,
    ),
    Language::Java => Some(
      r#"
(class_declaration name: (identifier) @name) @definition.class
(interface_declaration name: (identifier) @name) @definition.interface
(method_declaration name: (identifier) @name) @definition.method
"#,
    ),
    Language::C => Some(
      r#"
(function_definition declarator: (function_declarator declarator: (identifier) @name)) @definition.function
(struct_specifier name: (type_identifier) @name) @definition.struct
"#,
    ),
    Language::Cpp => Some(
      r#"
(function_definition declarator: (function_declarator declarator: (identifier) @name)) @definition.function
(class_specifier name: (type_identifier) @name) @definition.class
(struct_specifier name: (type_identifier) @name) @definition.struct
"#,
    ),
    _ => None,
  }
}

fn grammar_for(language: Language) -> Option<tree_sitter::Language> {
  match language {
    Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
    Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
    Language::JavaScript | Language::Jsx => Some(tree_sitter_javascript::LANGUAGE.into()),
    Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
    Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
    Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
    Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
    Language::C => Some(tree_sitter_c::LANGUAGE.into()),
    Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
    _ => None,
  }
}

/// A `LanguageExtractor` backed by a tree-sitter grammar and a single
/// compiled definitions query. One instance per language; `Parser` and
/// `QueryCursor` are not `Sync`, so they're held behind a `Mutex` the way
/// the registry's `Send + Sync` bound requires (the teacher avoids this by
/// taking `&mut self` throughout `TreeSitterParser`; the registry here
/// needs shared, read-only extractors, so the mutex moves to the leaf).
pub struct TreeSitterExtractor {
  language: Language,
  query: Query,
  parser: Mutex<Parser>,
}

impl TreeSitterExtractor {
  pub fn new(language: Language) -> Option<Self> {
    let grammar = grammar_for(language)?;
    let query_source = definitions_query_for(language)?;
    let query = Query::new(&grammar, query_source).ok()?;
    let mut parser = Parser::new();
    parser.set_language(&grammar).ok()?;
    Some(Self {
      language,
      query,
      parser: Mutex::new(parser),
    })
  }

  /// Languages this extractor can be constructed for today (tier-1 grammars
  /// linked into this crate).
  pub fn supported_languages() -> &'static [Language] {
    &[
      Language::Rust,
      Language::Python,
      Language::JavaScript,
      Language::Jsx,
      Language::TypeScript,
      Language::Tsx,
      Language::Go,
      Language::Java,
      Language::C,
      Language::Cpp,
    ]
  }
}

impl LanguageExtractor for TreeSitterExtractor {
  fn language(&self) -> Language {
    self.language
  }

  fn extract(&self, source: &str) -> ExtractOutcome {
    let mut parser = self.parser.lock().expect("tree-sitter parser mutex poisoned");
    let Some(tree) = parser.parse(source, None) else {
      return ExtractOutcome {
        chunks: Vec::new(),
        soft_errors: vec![ParserError::ParseError {
          start: 1,
          end: source.lines().count().max(1) as u32,
          message: "tree-sitter failed to produce a parse tree".to_string(),
        }],
      };
    };

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&self.query, tree.root_node(), source.as_bytes());
    let mut chunks = Vec::new();
    let mut covered: Vec<(u32, u32)> = Vec::new();

    while let Some(m) = matches.next() {
      let mut name = None;
      let mut kind = None;
      let mut start_line = 0u32;
      let mut end_line = 0u32;

      for cap in m.captures {
        let cap_name = self.query.capture_names()[cap.index as usize];
        if cap_name == "name" {
          name = cap.node.utf8_text(source.as_bytes()).ok().map(str::to_string);
          continue;
        }
        if let Some(ct) = chunk_type_for_capture(cap_name) {
          kind = Some(ct);
          start_line = cap.node.start_position().row as u32 + 1;
          end_line = cap.node.end_position().row as u32 + 1;
        }
      }

      let (Some(symbol), Some(kind)) = (name, kind) else {
        continue;
      };

      // Nested definitions (e.g. a method already covered by its impl's
      // definition span) are skipped, mirroring the teacher's
      // contained-in-already-covered-lines guard in `chunk_by_definitions`.
      if covered.iter().any(|&(s, e)| start_line >= s && end_line <= e) {
        continue;
      }

      let code = line_range(source, start_line, end_line);
      if code.trim().is_empty() {
        continue;
      }
      covered.push((start_line, end_line));
      chunks.push(ChunkDraft {
        kind,
        symbol,
        start_line,
        end_line,
        code,
      });
    }

    chunks.sort_by_key(|c| c.start_line);

    if chunks.is_empty() && !source.trim().is_empty() {
      // No recognizable definitions: fall back to one whole-file block so
      // the file is still searchable, matching the teacher's
      // `chunk_by_lines` fallback intent.
      chunks.push(ChunkDraft {
        kind: ChunkType::Block,
        symbol: "module".to_string(),
        start_line: 1,
        end_line: source.lines().count().max(1) as u32,
        code: source.to_string(),
      });
    }

    ExtractOutcome {
      chunks,
      soft_errors: Vec::new(),
    }
  }
}

fn line_range(source: &str, start_line: u32, end_line: u32) -> String {
  source
    .lines()
    .skip(start_line as usize - 1)
    .take((end_line - start_line + 1) as usize)
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rust_extracts_function_and_struct() {
    let extractor = TreeSitterExtractor::new(Language::Rust).unwrap();
    let source = "fn greet() -> String {\n    \"hi\".to_string()\n}\n\nstruct Point {\n    x: i32,\n}\n";
    let outcome = extractor.extract(source);
    let kinds: Vec<_> = outcome.chunks.iter().map(|c| (c.kind, c.symbol.as_str())).collect();
    assert!(kinds.contains(&(ChunkType::Function, "greet")));
    assert!(kinds.contains(&(ChunkType::Struct, "Point")));
  }

  #[test]
  fn rust_method_not_duplicated_with_impl() {
    let extractor = TreeSitterExtractor::new(Language::Rust).unwrap();
    let source = "impl Point {\n    fn new() -> Self {\n        Self { x: 0 }\n    }\n}\n";
    let outcome = extractor.extract(source);
    assert_eq!(outcome.chunks.len(), 1);
    assert_eq!(outcome.chunks[0].kind, ChunkType::Method);
  }

  #[test]
  fn python_extracts_class_and_method() {
    let extractor = TreeSitterExtractor::new(Language::Python).unwrap();
    let source = "class Greeter:\n    def greet(self):\n        return \"hi\"\n";
    let outcome = extractor.extract(source);
    let kinds: Vec<_> = outcome.chunks.iter().map(|c| c.kind).collect();
    assert!(kinds.contains(&ChunkType::Class));
  }

  #[test]
  fn python_create_search_scenario() {
    // Mirrors spec.md §8 scenario 1: a two-line top-level function.
    let extractor = TreeSitterExtractor::new(Language::Python).unwrap();
    let source = "def greet():\n    return \"hi\"\n";
    let outcome = extractor.extract(source);
    assert_eq!(outcome.chunks.len(), 1);
    assert_eq!(outcome.chunks[0].symbol, "greet");
    assert_eq!(outcome.chunks[0].start_line, 1);
    assert_eq!(outcome.chunks[0].end_line, 2);
  }

  #[test]
  fn falls_back_to_whole_file_block_when_no_definitions() {
    let extractor = TreeSitterExtractor::new(Language::Rust).unwrap();
    let source = "// just a comment\nlet _ = 1;\n";
    let outcome = extractor.extract(source);
    assert_eq!(outcome.chunks.len(), 1);
    assert_eq!(outcome.chunks[0].kind, ChunkType::Block);
  }

  #[test]
  fn extraction_is_deterministic() {
    let extractor = TreeSitterExtractor::new(Language::Go).unwrap();
    let source = "package main\n\nfunc main() {\n\tprintln(\"hi\")\n}\n";
    let a = extractor.extract(source);
    let b = extractor.extract(source);
    assert_eq!(a, b);
  }
}
