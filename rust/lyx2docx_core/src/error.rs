use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while loading, rewriting or writing back an intermediate document.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Syntax error reported by the XML reader (undeclared entities included).
    #[error("XML syntax error at byte {position}: {message}")]
    XmlSyntax { message: String, position: u64 },

    #[error("mismatched end tag: expected </{expected}>, found </{found}>")]
    MismatchedEndTag { expected: String, found: String },

    #[error("unexpected end tag </{0}> with no open element")]
    UnexpectedEndTag(String),

    #[error("unexpected end of input: <{0}> is never closed")]
    UnclosedElement(String),

    #[error("empty XML document: no root element found")]
    EmptyDocument,

    #[error("multiple root elements")]
    MultipleRoots,

    #[error("text content outside the root element")]
    TextOutsideRoot,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
