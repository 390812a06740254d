//! Chronological ordering of author-year citation groups.
//!
//! Supports citations of the form `(Author names, Year; Author names, Year)`.
//! Each parenthesized span is rewritten so its entries run by year, then by
//! name. Years are compared as strings, so `2010a` follows `2010` and a
//! three-digit year sorts after `1999`.

use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

lazy_static! {
    // Shortest `(...)` span, across newlines. Nested parentheses are not
    // balanced: the first `)` closes the group.
    static ref CITATION_GROUP: Regex =
        Regex::new(r"(?s)\((.+?)\)").expect("citation group pattern compiles");
}

const AMP_ENTITY: &str = "&amp;";
// Must never occur in real input.
const AMP_PLACEHOLDER: &str = "&&";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub year: String,
}

impl Entry {
    /// Split on the last comma. An entry without one has no year and yields
    /// `None`; callers drop it.
    pub fn parse(raw: &str) -> Option<Entry> {
        let (name, year) = raw.trim().rsplit_once(',')?;
        Some(Entry {
            name: name.trim().to_string(),
            year: year.trim().to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CitationGroup {
    pub entries: Vec<Entry>,
}

impl CitationGroup {
    /// `None` when the span holds fewer than two `;`-separated entries.
    pub fn parse(inner: &str) -> Option<CitationGroup> {
        let raw: Vec<&str> = inner.split(';').collect();
        if raw.len() < 2 {
            return None;
        }
        Some(CitationGroup {
            entries: raw.into_iter().filter_map(Entry::parse).collect(),
        })
    }

    /// Entries bucketed by year (string order), names sorted within a year.
    pub fn chronological(&self) -> Vec<Entry> {
        let mut by_year: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for entry in &self.entries {
            by_year
                .entry(entry.year.as_str())
                .or_default()
                .push(entry.name.as_str());
        }
        by_year
            .into_iter()
            .flat_map(|(year, mut names)| {
                names.sort_unstable();
                names.into_iter().map(move |name| Entry {
                    name: name.to_string(),
                    year: year.to_string(),
                })
            })
            .collect()
    }

    pub fn render(entries: &[Entry]) -> String {
        let joined = entries
            .iter()
            .map(|e| format!("{}, {}", e.name, e.year))
            .collect::<Vec<_>>()
            .join("; ");
        format!("({joined})")
    }
}

fn mask_ampersands(s: &str) -> String {
    s.replace(AMP_ENTITY, AMP_PLACEHOLDER)
}

fn restore_ampersands(s: &str) -> String {
    s.replace(AMP_PLACEHOLDER, AMP_ENTITY)
}

fn rewrite_group(caps: &Captures<'_>) -> String {
    let span = &caps[0];
    let inner = mask_ampersands(&caps[1]);
    match CitationGroup::parse(&inner) {
        Some(group) => restore_ampersands(&CitationGroup::render(&group.chronological())),
        None => restore_ampersands(span),
    }
}

/// Rewrite every citation group in `text` into chronological order. Total over
/// any input: spans that do not look like multi-entry citations pass through.
pub fn normalize(text: &str) -> String {
    CITATION_GROUP.replace_all(text, rewrite_group).into_owned()
}

/// Read `input`, normalize its citations and write the result to `output`.
pub fn normalize_file(input: &Path, output: &Path) -> Result<()> {
    let data = fs::read_to_string(input).map_err(|e| Error::io(input, e))?;
    fs::write(output, normalize(&data)).map_err(|e| Error::io(output, e))
}
