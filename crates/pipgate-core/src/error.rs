//! Error types for pipgate-core.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for the installation engine.
#[derive(Error, Diagnostic, Debug)]
pub enum EngineError {
    #[error("Invalid request spec: {0}")]
    #[diagnostic(
        code(pipgate::invalid_request_spec),
        help("Use format: name followed by an optional constraint (e.g. 'numpy', 'numpy>=1.20,<2')")
    )]
    InvalidRequestSpec(String),

    #[error("Failed to run '{program}'")]
    #[diagnostic(
        code(pipgate::command_spawn),
        help("Check that the package manager is installed and on PATH")
    )]
    CommandFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Install of '{target}' failed: {detail}")]
    #[diagnostic(
        code(pipgate::install_failed),
        help("Inspect the package manager output; a policy rule may retry without pins if configured")
    )]
    InstallFailed { target: String, detail: String },

    #[error("Uninstall of '{target}' failed: {detail}")]
    #[diagnostic(code(pipgate::uninstall_failed))]
    UninstallFailed { target: String, detail: String },
}
