use sourcelens_core::Language;
use thiserror::Error;

/// Failure modes for a language extractor, per spec.md §4.2. Both are
/// recoverable at the pipeline level: `UnsupportedLanguage` means the
/// coordinator should treat the file as having zero chunks;
/// `ParseError` is a soft error the coordinator logs and continues past.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParserError {
  #[error("no extractor registered for language {0:?}")]
  UnsupportedLanguage(Language),
  #[error("parse error at lines {start}-{end}: {message}")]
  ParseError { start: u32, end: u32, message: String },
}
