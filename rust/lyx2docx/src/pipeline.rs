//! LyX → LaTeX → tex4ht hypertext → sanitized hypertext → DOCX.
//!
//! Each step runs to completion before the next. The first failing step
//! aborts the conversion; intermediates are left in place in that case so the
//! failure can be inspected.

use crate::tools::{Invocation, ToolOutput, ToolRunner, Toolchain};
use anyhow::{Context, Result};
use lyx2docx_core::{latex, sanitize_file, Document};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Option string handed to `htlatex`.
pub const HTLATEX_OPTIONS: &str = "xhtml, charset=utf-8";

/// Files tex4ht, latex and bibtex leave next to the `.tex` source.
pub const INTERMEDIATE_EXTENSIONS: [&str; 14] = [
    "4ct", "4tc", "aux", "bbl", "blg", "css", "dvi", "html", "idv", "lg", "log", "tex", "tmp",
    "xref",
];

#[derive(Clone, Debug, Default)]
pub struct Options {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Reference document for pandoc's styles.
    pub reference_doc: Option<PathBuf>,
    /// Programs run as `PROG <html> <html>` after sanitizing.
    pub filters: Vec<String>,
    pub keep_intermediate: bool,
    pub toolchain: Toolchain,
}

/// Every file the conversion reads or writes, derived from the input path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Paths {
    pub work_dir: PathBuf,
    /// Where `lyx --export latex` writes.
    pub exported_tex: PathBuf,
    /// Same, with spaces in the file name replaced; tex4ht cannot cope with them.
    pub tex: PathBuf,
    pub html: PathBuf,
    pub html_utf8: PathBuf,
    pub docx: PathBuf,
    /// `work_dir/stem` with no extension, for cleanup.
    pub base: PathBuf,
}

impl Paths {
    pub fn derive(input: &Path, output: Option<&Path>) -> Paths {
        let work_dir = match input.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tex_stem = stem.replace(' ', "_");

        Paths {
            exported_tex: work_dir.join(format!("{stem}.tex")),
            tex: work_dir.join(format!("{tex_stem}.tex")),
            html: work_dir.join(format!("{tex_stem}.html")),
            html_utf8: work_dir.join(format!("{tex_stem}.utf8.html")),
            docx: output
                .map(Path::to_path_buf)
                .unwrap_or_else(|| input.with_extension("docx")),
            base: work_dir.join(&tex_stem),
            work_dir,
        }
    }

    fn tex_file_name(&self) -> OsString {
        self.tex.file_name().map(OsString::from).unwrap_or_default()
    }
}

fn call<R: ToolRunner>(runner: &R, invocation: Invocation) -> Result<ToolOutput> {
    let output = runner
        .run(&invocation)
        .with_context(|| format!("`{}` failed", invocation.program))?;
    if !output.stderr.is_empty() {
        debug!(
            program = %invocation.program,
            stderr = %String::from_utf8_lossy(&output.stderr),
            "tool wrote to stderr"
        );
    }
    Ok(output)
}

/// Run the whole conversion. Returns the path of the written document.
pub fn run<R: ToolRunner>(runner: &R, options: &Options) -> Result<PathBuf> {
    let input = std::path::absolute(&options.input)
        .with_context(|| format!("resolve {}", options.input.display()))?;
    let output = options
        .output
        .as_deref()
        .map(std::path::absolute)
        .transpose()
        .context("resolve output path")?;
    let paths = Paths::derive(&input, output.as_deref());
    let tools = &options.toolchain;

    info!(input = %input.display(), "exporting LaTeX");
    call(
        runner,
        Invocation::new(&tools.lyx)
            .arg("--export")
            .arg("latex")
            .arg(&input),
    )?;

    if paths.exported_tex != paths.tex {
        fs::rename(&paths.exported_tex, &paths.tex).with_context(|| {
            format!(
                "rename {} to {}",
                paths.exported_tex.display(),
                paths.tex.display()
            )
        })?;
    }

    rewrite_latex(&paths.tex)?;

    info!(tex = %paths.tex.display(), "typesetting");
    let tex_name = paths.tex_file_name();
    call(
        runner,
        Invocation::new(&tools.latex)
            .arg(&tex_name)
            .cwd(&paths.work_dir),
    )?;
    call(
        runner,
        Invocation::new(&tools.bibtex)
            .arg(Path::new(&tex_name).with_extension("aux"))
            .cwd(&paths.work_dir),
    )?;
    call(
        runner,
        Invocation::new(&tools.htlatex)
            .arg(&tex_name)
            .arg(HTLATEX_OPTIONS)
            .cwd(&paths.work_dir),
    )?;

    transcode_to_utf8(runner, tools, &paths)?;

    info!(html = %paths.html.display(), "sanitizing hypertext");
    let document = sanitize_file(&paths.html)
        .with_context(|| format!("sanitize {}", paths.html.display()))?;

    for filter in &options.filters {
        info!(filter = %filter, "running filter");
        call(
            runner,
            Invocation::new(filter)
                .arg(&paths.html)
                .arg(&paths.html)
                .cwd(&paths.work_dir),
        )?;
    }

    info!(output = %paths.docx.display(), "converting with pandoc");
    let mut pandoc = Invocation::new(&tools.pandoc)
        .arg("-o")
        .arg(&paths.docx)
        .arg(&paths.html)
        .cwd(&paths.work_dir);
    if let Some(template) = &options.reference_doc {
        let mut flag = OsString::from("--reference-doc=");
        flag.push(template);
        pandoc = pandoc.arg(flag);
    }
    call(runner, pandoc)?;

    remove_generated_images(&document, &paths.work_dir);
    if options.keep_intermediate {
        debug!("keeping intermediate files");
    } else {
        remove_intermediates(&paths.base);
    }

    Ok(paths.docx)
}

fn rewrite_latex(tex: &Path) -> Result<()> {
    let source =
        fs::read_to_string(tex).with_context(|| format!("read {}", tex.display()))?;
    fs::write(tex, latex::prepare_for_tex4ht(&source))
        .with_context(|| format!("write {}", tex.display()))
}

// iconv cannot write to its input, so go through a sibling file.
fn transcode_to_utf8<R: ToolRunner>(runner: &R, tools: &Toolchain, paths: &Paths) -> Result<()> {
    let output = call(
        runner,
        Invocation::new(&tools.iconv)
            .arg("-t")
            .arg("utf-8")
            .arg(&paths.html),
    )?;
    fs::write(&paths.html_utf8, &output.stdout)
        .with_context(|| format!("write {}", paths.html_utf8.display()))?;
    fs::rename(&paths.html_utf8, &paths.html)
        .with_context(|| format!("replace {}", paths.html.display()))
}

/// Delete the bitmaps tex4ht rendered for the document; pandoc has embedded
/// them by now. Only relative sources are considered.
fn remove_generated_images(document: &Document, dir: &Path) {
    for img in document.find_all("img") {
        let Some(src) = img.attr("src") else {
            continue;
        };
        if src.contains("://") || src.starts_with("data:") || Path::new(src).is_absolute() {
            continue;
        }
        let path = dir.join(src);
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed image"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), %err, "could not remove image"),
        }
    }
}

fn remove_intermediates(base: &Path) {
    for ext in INTERMEDIATE_EXTENSIONS {
        let mut name = base.as_os_str().to_owned();
        name.push(".");
        name.push(ext);
        let path = PathBuf::from(name);
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed intermediate"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), %err, "could not remove intermediate"),
        }
    }
}
