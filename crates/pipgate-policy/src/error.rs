use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum PolicyError {
    #[error("JSON error: {0}")]
    #[diagnostic(
        code(pipgate_policy::json),
        help("Check the policy file syntax")
    )]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(pipgate_policy::io))]
    IoError(#[from] std::io::Error),

    #[error("Policy file '{path}' is not a JSON object")]
    #[diagnostic(
        code(pipgate_policy::not_an_object),
        help("The top level must be an object mapping package names to rules")
    )]
    NotAnObject { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, PolicyError>;
