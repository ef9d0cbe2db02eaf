pub mod document;
pub mod error;
pub mod loader;

pub use document::*;
pub use loader::{get_pip_policy, set_policy_paths, PolicyPaths};
