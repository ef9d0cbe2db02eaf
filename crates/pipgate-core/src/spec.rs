use std::sync::OnceLock;

use regex::Regex;

use crate::error::EngineError;

/// Parsed install request.
/// Supports format: `name` followed by an optional version constraint,
/// e.g. `numpy`, `numpy==1.26.0`, `pandas>=2.0,<3`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSpec {
    pub name: String,
    pub constraint: Option<String>,
}

impl RequestSpec {
    /// The requirement string handed to the package manager when no
    /// directive rewrites the request.
    pub fn as_requirement(&self) -> String {
        match &self.constraint {
            Some(constraint) => format!("{}{}", self.name, constraint),
            None => self.name.clone(),
        }
    }
}

impl TryFrom<&str> for RequestSpec {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        static SPEC_RE: OnceLock<Regex> = OnceLock::new();
        let re = SPEC_RE.get_or_init(|| {
            Regex::new(
                r"(?x)
            ^(?P<name>[A-Za-z0-9_-]+)           # distribution name
            (?P<constraint>[<>=!~].*)?$         # optional constraint, verbatim
            ",
            )
            .unwrap()
        });

        let spec = value.trim();
        if spec.is_empty() {
            return Err(EngineError::InvalidRequestSpec(
                "request spec can't be empty".into(),
            ));
        }

        let caps = re.captures(spec).ok_or_else(|| {
            EngineError::InvalidRequestSpec(format!("unrecognized request spec '{spec}'"))
        })?;

        Ok(RequestSpec {
            name: caps["name"].to_string(),
            constraint: caps.name("constraint").map(|m| m.as_str().to_string()),
        })
    }
}
