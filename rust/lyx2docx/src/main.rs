use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod pipeline;
mod tools;

use pipeline::Options;
use tools::{ProcessRunner, Toolchain};

/// Convert a LyX document to DOCX through LaTeX, tex4ht and pandoc.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// LyX document to convert.
    input: PathBuf,

    /// Output .docx path (defaults to the input path with a .docx extension).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Reference document pandoc takes its styles from.
    #[arg(long, value_name = "PATH")]
    reference_doc: Option<PathBuf>,

    /// Program run as `PROG <html> <html>` on the sanitized hypertext before
    /// pandoc. May be repeated; filters run in the order given.
    #[arg(long = "filter", value_name = "PROG")]
    filters: Vec<String>,

    /// Leave the .tex, .html and other intermediates in place.
    #[arg(long)]
    keep_intermediate: bool,

    /// Log every step and sanitizer pass.
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    toolchain: Toolchain,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "lyx2docx=debug,lyx2docx_core=debug"
    } else {
        "lyx2docx=info,lyx2docx_core=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    cli.toolchain.preflight(&cli.filters)?;

    let options = Options {
        input: cli.input,
        output: cli.output,
        reference_doc: cli.reference_doc,
        filters: cli.filters,
        keep_intermediate: cli.keep_intermediate,
        toolchain: cli.toolchain,
    };
    let docx = pipeline::run(&ProcessRunner, &options)?;
    info!(output = %docx.display(), "done");
    Ok(())
}
