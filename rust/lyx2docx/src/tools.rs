//! External programs the conversion shells out to.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("required program(s) not found on PATH: {0}")]
    NotFound(String),

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status})\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    Failed {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },
}

/// One call of an external program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    /// Working directory; inherited when `None`.
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn cwd(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs an invocation to completion. A non-zero exit is an error carrying
/// both captured streams.
pub trait ToolRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError>;
}

/// Blocking `std::process` runner. stdin is closed so an interactive
/// `latex` error prompt ends the run instead of hanging it.
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        debug!(command = %invocation, "running");
        let output = command.output().map_err(|source| ToolError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                command: invocation.to_string(),
                status: output.status.to_string(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(ToolOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Program names for every collaborator, overridable per program.
#[derive(clap::Args, Clone, Debug, PartialEq, Eq)]
pub struct Toolchain {
    /// LyX executable used for the LaTeX export.
    #[arg(long, env = "LYX2DOCX_LYX", default_value = "lyx", value_name = "PROG")]
    pub lyx: String,

    #[arg(long, env = "LYX2DOCX_LATEX", default_value = "latex", value_name = "PROG")]
    pub latex: String,

    #[arg(long, env = "LYX2DOCX_BIBTEX", default_value = "bibtex", value_name = "PROG")]
    pub bibtex: String,

    /// tex4ht driver producing the hypertext.
    #[arg(long, env = "LYX2DOCX_HTLATEX", default_value = "htlatex", value_name = "PROG")]
    pub htlatex: String,

    #[arg(long, env = "LYX2DOCX_ICONV", default_value = "iconv", value_name = "PROG")]
    pub iconv: String,

    #[arg(long, env = "LYX2DOCX_PANDOC", default_value = "pandoc", value_name = "PROG")]
    pub pandoc: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Toolchain {
            lyx: "lyx".to_string(),
            latex: "latex".to_string(),
            bibtex: "bibtex".to_string(),
            htlatex: "htlatex".to_string(),
            iconv: "iconv".to_string(),
            pandoc: "pandoc".to_string(),
        }
    }
}

impl Toolchain {
    pub fn programs(&self) -> [&str; 6] {
        [
            self.lyx.as_str(),
            self.latex.as_str(),
            self.bibtex.as_str(),
            self.htlatex.as_str(),
            self.iconv.as_str(),
            self.pandoc.as_str(),
        ]
    }

    /// Fail before any work starts if a program (or filter) cannot be found.
    pub fn preflight(&self, filters: &[String]) -> Result<(), ToolError> {
        let missing: Vec<&str> = self
            .programs()
            .into_iter()
            .chain(filters.iter().map(String::as_str))
            .filter(|program| which::which(program).is_err())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ToolError::NotFound(missing.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_display_joins_args() {
        let inv = Invocation::new("htlatex")
            .arg("paper.tex")
            .arg("xhtml, charset=utf-8");
        assert_eq!(inv.to_string(), "htlatex paper.tex xhtml, charset=utf-8");
    }

    #[test]
    fn failure_message_carries_both_streams() {
        let err = ToolError::Failed {
            command: "latex paper.tex".to_string(),
            status: "exit status: 1".to_string(),
            stdout: "! Undefined control sequence.".to_string(),
            stderr: "fatal".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("latex paper.tex"));
        assert!(msg.contains("! Undefined control sequence."));
        assert!(msg.contains("fatal"));
    }

    #[test]
    fn preflight_names_missing_programs() {
        let tools = Toolchain {
            pandoc: "definitely-not-a-real-program-4b1d".to_string(),
            ..Toolchain::default()
        };
        let err = tools
            .preflight(&["also-missing-filter-9c2e".to_string()])
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("definitely-not-a-real-program-4b1d"));
        assert!(msg.contains("also-missing-filter-9c2e"));
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_reports_non_zero_exit() {
        let err = ProcessRunner
            .run(&Invocation::new("sh").arg("-c").arg("echo out; echo err >&2; exit 3"))
            .unwrap_err();
        match err {
            ToolError::Failed { stdout, stderr, .. } => {
                assert_eq!(stdout.trim(), "out");
                assert_eq!(stderr.trim(), "err");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_captures_stdout() {
        let out = ProcessRunner
            .run(&Invocation::new("sh").arg("-c").arg("printf hi"))
            .unwrap();
        assert_eq!(out.stdout, b"hi");
    }

    #[test]
    fn process_runner_reports_missing_program() {
        let err = ProcessRunner
            .run(&Invocation::new("definitely-not-a-real-program-4b1d"))
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }
}
