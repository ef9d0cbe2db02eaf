use std::collections::HashMap;

use pipgate_utils::string::normalize_package_name;
use tracing::debug;

/// View of the installed environment as of the last `freeze`.
///
/// Keys are normalized distribution names; lookups normalize the queried
/// name, so callers can use whatever spelling their policy or request used.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    packages: HashMap<String, String>,
}

impl Snapshot {
    /// Parse the output of the manager's `freeze` subcommand.
    ///
    /// Editable installs (`-e …`) and comments are ignored; any other line
    /// that is not `name==version` is skipped.
    pub fn from_freeze_output(text: &str) -> Self {
        let mut packages = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("-e") {
                continue;
            }
            match line.split_once("==") {
                Some((name, version))
                    if !name.is_empty()
                        && !version.is_empty()
                        && !name.contains(char::is_whitespace) =>
                {
                    packages.insert(
                        normalize_package_name(name.trim()),
                        version.trim().to_string(),
                    );
                }
                _ => debug!("skipping unrecognized freeze line: {line}"),
            }
        }
        Self { packages }
    }

    pub fn version_of(&self, package: &str) -> Option<&str> {
        self.packages
            .get(&normalize_package_name(package))
            .map(String::as_str)
    }

    pub fn contains(&self, package: &str) -> bool {
        self.packages.contains_key(&normalize_package_name(package))
    }

    pub fn insert(&mut self, package: &str, version: &str) {
        self.packages
            .insert(normalize_package_name(package), version.to_string());
    }

    pub fn remove(&mut self, package: &str) {
        self.packages.remove(&normalize_package_name(package));
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl FromIterator<(String, String)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut snapshot = Snapshot::default();
        for (package, version) in iter {
            snapshot.insert(&package, &version);
        }
        snapshot
    }
}
