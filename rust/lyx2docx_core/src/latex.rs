//! Text rewrites on the LyX-exported LaTeX before tex4ht sees it.
//!
//! LaTeX is not parsed here; these are targeted pattern substitutions.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

/// Packages tex4ht chokes on: `hyperref` and those built on it.
pub const INCOMPATIBLE_PACKAGES: [&str; 2] = ["hyperref", "breakurl"];

lazy_static! {
    // Group 1 is whatever LyX puts between the two commands, typically
    // `\phantomsection\addcontentsline{toc}{section}{\refname}`.
    static ref BIBLIOGRAPHY_PREAMBLE: Regex =
        Regex::new(r"(?s)\\bibliographystyle\{.+?\}(.+?)\\bibliography\{")
            .expect("bibliography preamble pattern compiles");
}

/// Remove every `\usepackage[options]{package}` line for `package`.
pub fn remove_package(source: &str, package: &str) -> String {
    let pattern = format!(
        r"(?s)\\usepackage(\[[^\]]+?\])?\s*?\{{{}\}}",
        regex::escape(package)
    );
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(source, "").into_owned(),
        Err(err) => {
            warn!(package, %err, "could not build package pattern");
            source.to_string()
        }
    }
}

/// Drop the commands between `\bibliographystyle{..}` and `\bibliography{`.
/// Only the first occurrence is touched.
pub fn strip_bibliography_preamble(source: &str) -> String {
    let Some(inner) = BIBLIOGRAPHY_PREAMBLE
        .captures(source)
        .and_then(|caps| caps.get(1))
    else {
        return source.to_string();
    };
    debug!(removed = inner.as_str(), "stripping bibliography preamble");
    let mut out = String::with_capacity(source.len() - inner.len());
    out.push_str(&source[..inner.start()]);
    out.push_str(&source[inner.end()..]);
    out
}

/// Everything the exported LaTeX needs before `htlatex` runs.
pub fn prepare_for_tex4ht(source: &str) -> String {
    let mut s = source.to_string();
    for package in INCOMPATIBLE_PACKAGES {
        s = remove_package(&s, package);
    }
    strip_bibliography_preamble(&s)
}
