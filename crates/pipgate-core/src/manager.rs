use std::{path::PathBuf, process::Command};

use crate::{error::EngineError, EngineResult};

/// Captured result of one package-manager invocation.
#[derive(Clone, Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Seam between the engine and the underlying package manager.
///
/// The engine composes argv suffixes (`install …`, `uninstall -y …`,
/// `freeze`); the shim turns them into a full command line for whichever
/// tool is in use and executes it. Running the command is the engine's only
/// side-effect primitive.
pub trait PackageManager {
    /// Prepend the manager prefix to an argv suffix.
    fn build_argv(&self, args: &[String]) -> Vec<String>;

    /// Run a composed argv, blocking until the manager exits.
    fn run(&self, argv: &[String]) -> EngineResult<CommandOutput>;
}

/// Which backing tool executes the composed commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// `python -m pip …`
    Pip,
    /// `uv pip …`, the faster drop-in.
    Uv,
}

/// Shim over the system `pip` (or `uv`) executable.
pub struct SystemManager {
    backend: Backend,
    python: PathBuf,
}

impl SystemManager {
    /// Baseline manager driven through the given interpreter.
    pub fn pip(python: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Pip,
            python: python.into(),
        }
    }

    /// The faster drop-in. `uv pip` targets the environment of the given
    /// interpreter via its own discovery; the interpreter path is kept so
    /// hosts can switch backends without reconfiguring.
    pub fn uv(python: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Uv,
            python: python.into(),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

impl PackageManager for SystemManager {
    fn build_argv(&self, args: &[String]) -> Vec<String> {
        let mut argv = match self.backend {
            Backend::Pip => vec![
                self.python.display().to_string(),
                "-m".to_string(),
                "pip".to_string(),
            ],
            Backend::Uv => vec!["uv".to_string(), "pip".to_string()],
        };

        // uv never prompts on uninstall and rejects pip's -y flag
        if self.backend == Backend::Uv && args.first().map(String::as_str) == Some("uninstall") {
            argv.extend(args.iter().filter(|arg| arg.as_str() != "-y").cloned());
        } else {
            argv.extend_from_slice(args);
        }
        argv
    }

    fn run(&self, argv: &[String]) -> EngineResult<CommandOutput> {
        let (program, rest) = argv.split_first().ok_or_else(|| EngineError::CommandFailed {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
        })?;

        let output = Command::new(program)
            .args(rest)
            .output()
            .map_err(|source| EngineError::CommandFailed {
                program: program.clone(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
