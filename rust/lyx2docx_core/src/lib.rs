//! Rewrites at the heart of the LyX → DOCX conversion: LaTeX cleanup before
//! tex4ht, hypertext cleanup before pandoc, and chronological citation order.

pub mod citations;
pub mod dom;
pub mod entities;
pub mod error;
pub mod latex;
pub mod sanitize;

pub use dom::{Document, Element, Node};
pub use error::{Error, Result};
pub use sanitize::{sanitize, sanitize_file, sanitize_str, Pass};
