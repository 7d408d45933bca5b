//! Domain entities shared across the workspace: `File`, `Chunk`,
//! `EmbeddingRow`, and the language/chunk-kind vocabulary they're tagged
//! with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A stable identity hash over a chunk's (or file's) bytes, truncated to 16
/// hex characters. Used to detect identity across edits, not for security.
pub fn compute_content_hash(content: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(content.as_bytes());
  let digest = hasher.finalize();
  hex::encode(&digest[..8])
}

/// Languages the parser capability can be asked to handle. Detection is
/// extension-only (see Open Question #3 in DESIGN.md); content sniffing for
/// ambiguous extensions like `.m` is left as a future extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
  Rust,
  Python,
  TypeScript,
  Tsx,
  JavaScript,
  Jsx,
  Go,
  Java,
  Kotlin,
  CSharp,
  Cpp,
  C,
  Ruby,
  Php,
  Ocaml,
  Bash,
  Scala,
  Lua,
  Zig,
  Json,
  Yaml,
  Toml,
  Html,
  Css,
  Markdown,
}

impl Language {
  /// Resolve a language tag from a file extension. Unknown extensions
  /// return `None` and are silently ignored by the watcher/coordinator, per
  /// spec.md §4.2.
  pub fn from_extension(ext: &str) -> Option<Self> {
    Some(match ext.to_ascii_lowercase().as_str() {
      "rs" => Self::Rust,
      "py" | "pyi" => Self::Python,
      "ts" | "mts" | "cts" => Self::TypeScript,
      "tsx" => Self::Tsx,
      "js" | "mjs" | "cjs" => Self::JavaScript,
      "jsx" => Self::Jsx,
      "go" => Self::Go,
      "java" => Self::Java,
      "kt" | "kts" => Self::Kotlin,
      "cs" => Self::CSharp,
      "cpp" | "cc" | "cxx" | "hpp" | "hh" => Self::Cpp,
      "c" | "h" => Self::C,
      "rb" => Self::Ruby,
      "php" => Self::Php,
      "ml" | "mli" => Self::Ocaml,
      "sh" | "bash" => Self::Bash,
      "scala" => Self::Scala,
      "lua" => Self::Lua,
      "zig" => Self::Zig,
      "json" => Self::Json,
      "yaml" | "yml" => Self::Yaml,
      "toml" => Self::Toml,
      "html" | "htm" => Self::Html,
      "css" | "scss" | "sass" => Self::Css,
      "md" | "markdown" => Self::Markdown,
      _ => return None,
    })
  }

  /// Resolve a language tag from a shebang line, used as an override for
  /// extensionless scripts (spec.md §4.2's "shebang override for scripts").
  pub fn from_shebang(line: &str) -> Option<Self> {
    if line.contains("python") {
      Some(Self::Python)
    } else if line.contains("bash") || line.contains("/sh") {
      Some(Self::Bash)
    } else if line.contains("node") {
      Some(Self::JavaScript)
    } else if line.contains("ruby") {
      Some(Self::Ruby)
    } else {
      None
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Rust => "rust",
      Self::Python => "python",
      Self::TypeScript => "typescript",
      Self::Tsx => "tsx",
      Self::JavaScript => "javascript",
      Self::Jsx => "jsx",
      Self::Go => "go",
      Self::Java => "java",
      Self::Kotlin => "kotlin",
      Self::CSharp => "csharp",
      Self::Cpp => "cpp",
      Self::C => "c",
      Self::Ruby => "ruby",
      Self::Php => "php",
      Self::Ocaml => "ocaml",
      Self::Bash => "bash",
      Self::Scala => "scala",
      Self::Lua => "lua",
      Self::Zig => "zig",
      Self::Json => "json",
      Self::Yaml => "yaml",
      Self::Toml => "toml",
      Self::Html => "html",
      Self::Css => "css",
      Self::Markdown => "markdown",
    }
  }
}

/// The kind of span a `Chunk` represents. Wider than the teacher's
/// five-variant `ChunkType` (Function, Class, Module, Block, Import) to
/// match spec.md §3's full kind set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
  Function,
  Method,
  Class,
  Closure,
  Trait,
  Interface,
  Enum,
  Struct,
  Module,
  Header,
  CodeBlock,
  Script,
  Block,
}

/// A source file under watch. One row per canonicalized absolute path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
  pub id: Uuid,
  pub path: String,
  pub language: Language,
  pub mtime: DateTime<Utc>,
  pub content_hash: String,
}

/// A contiguous, semantically meaningful slice of a source file, identified
/// by its span plus a content hash (see spec.md's Fingerprint glossary
/// entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
  pub id: Uuid,
  pub file_id: Uuid,
  pub symbol: String,
  pub start_line: u32,
  pub end_line: u32,
  pub kind: ChunkType,
  pub code: String,
  pub content_hash: String,
  pub language: Language,
}

impl Chunk {
  /// The `(kind, symbol, content_hash)` identity used by the Indexing
  /// Coordinator's diff algorithm (spec.md §4.3) to decide kept vs.
  /// added/removed across a file's chunk set.
  pub fn identity(&self) -> (ChunkType, &str, &str) {
    (self.kind, self.symbol.as_str(), self.content_hash.as_str())
  }
}

/// One row of a `(provider, model, dimension)` embedding table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRow {
  pub chunk_id: Uuid,
  pub provider: String,
  pub model: String,
  pub dimension: usize,
  pub vector: Vec<f32>,
}

/// The logical key identifying one physically separate embedding table +
/// ANN index (spec.md's "Tuple" glossary entry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnKey {
  pub provider: String,
  pub model: String,
  pub dimension: usize,
  pub distance: DistanceMetric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
  Cosine,
  L2,
}

impl AnnKey {
  /// The LanceDB table name for this tuple, e.g.
  /// `embeddings_ollama_qwen3-embedding_4096`.
  pub fn table_name(&self) -> String {
    format!("embeddings_{}_{}_{}", self.provider, self.model, self.dimension)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn content_hash_is_stable_and_16_hex_chars() {
    let a = compute_content_hash("fn main() {}");
    let b = compute_content_hash("fn main() {}");
    assert_eq!(a, b);
    assert_eq!(a.len(), 16);
  }

  #[test]
  fn content_hash_differs_on_change() {
    let a = compute_content_hash("fn main() {}");
    let b = compute_content_hash("fn main() { }");
    assert_ne!(a, b);
  }

  #[test]
  fn language_from_extension_known() {
    assert_eq!(Language::from_extension("rs"), Some(Language::Rust));
    assert_eq!(Language::from_extension("PY"), Some(Language::Python));
  }

  #[test]
  fn language_from_extension_unknown_is_none() {
    assert_eq!(Language::from_extension("xyz123"), None);
  }

  #[test]
  fn language_from_shebang() {
    assert_eq!(Language::from_shebang("#!/usr/bin/env python3"), Some(Language::Python));
    assert_eq!(Language::from_shebang("#!/bin/bash"), Some(Language::Bash));
    assert_eq!(Language::from_shebang("#!/bin/sh"), Some(Language::Bash));
    assert_eq!(Language::from_shebang("#!/usr/bin/weird"), None);
  }

  #[test]
  fn ann_key_table_name() {
    let key = AnnKey {
      provider: "ollama".to_string(),
      model: "qwen3-embedding".to_string(),
      dimension: 4096,
      distance: DistanceMetric::Cosine,
    };
    assert_eq!(key.table_name(), "embeddings_ollama_qwen3-embedding_4096");
  }

  #[test]
  fn chunk_identity_ignores_span() {
    let c1 = Chunk {
      id: Uuid::now_v7(),
      file_id: Uuid::now_v7(),
      symbol: "greet".to_string(),
      start_line: 1,
      end_line: 2,
      kind: ChunkType::Function,
      code: "def greet(): pass".to_string(),
      content_hash: compute_content_hash("def greet(): pass"),
      language: Language::Python,
    };
    let mut c2 = c1.clone();
    c2.start_line = 5;
    c2.end_line = 6;
    assert_eq!(c1.identity(), c2.identity());
  }
}
