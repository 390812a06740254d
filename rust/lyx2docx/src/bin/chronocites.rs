//! Sort the author-year citations of a UTF-8 (X)HTML file chronologically.
//!
//! Usable standalone or as `lyx2docx --filter chronocites`.

use anyhow::{Context, Result};
use lyx2docx_core::citations;
use std::env;
use std::path::Path;

fn main() -> Result<()> {
    let args = env::args().collect::<Vec<_>>();
    if args.len() < 3 {
        let program = args.first().map(String::as_str).unwrap_or("chronocites");
        println!("usage: {program} <INFILE> <OUTFILE>");
        return Ok(());
    }

    let (input, output) = (Path::new(&args[1]), Path::new(&args[2]));
    citations::normalize_file(input, output)
        .with_context(|| format!("sort citations of {}", input.display()))
}
