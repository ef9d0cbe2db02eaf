use std::{
    fs,
    path::{Path, PathBuf},
    sync::{LazyLock, RwLock},
};

use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    document::{PackageRule, PolicyDocument},
    error::{PolicyError, Result},
};

/// Filesystem locations of the two policy documents.
///
/// The base file ships with the host application and is never written to.
/// The user file holds local overrides; it is created as a placeholder on
/// first use so operators can find where overrides go.
#[derive(Clone, Debug)]
pub struct PolicyPaths {
    pub base: PathBuf,
    pub user: PathBuf,
}

static POLICY_PATHS: LazyLock<RwLock<Option<PolicyPaths>>> = LazyLock::new(|| RwLock::new(None));
static POLICY: LazyLock<RwLock<Option<PolicyDocument>>> = LazyLock::new(|| RwLock::new(None));

/// Configure where the policy files live. Drops any cached document so the
/// next [`get_pip_policy`] call re-reads from the new locations.
pub fn set_policy_paths(paths: PolicyPaths) {
    *POLICY_PATHS.write().unwrap() = Some(paths);
    *POLICY.write().unwrap() = None;
}

/// The merged install policy, loaded on first call and cached for the rest
/// of the process.
///
/// Loading never fails: a missing or malformed file degrades to an empty
/// document for that file, logged at the severity its origin warrants.
pub fn get_pip_policy() -> PolicyDocument {
    {
        let cached = POLICY.read().unwrap();
        if let Some(document) = cached.as_ref() {
            return document.clone();
        }
    }

    let document = load_policy();
    let mut cached = POLICY.write().unwrap();
    // first writer wins if two callers raced the load; contents are identical
    cached.get_or_insert(document).clone()
}

fn load_policy() -> PolicyDocument {
    let paths = POLICY_PATHS.read().unwrap().clone();
    let Some(paths) = paths else {
        error!("policy paths are not configured; continuing with an empty policy");
        return PolicyDocument::default();
    };

    let mut document = load_base(&paths.base);
    if let Some(user) = load_user(&paths.user) {
        document.merge_overrides(user);
    }
    document
}

fn load_base(path: &Path) -> PolicyDocument {
    match fs::read_to_string(path) {
        Ok(text) => parse_document(&text, path).unwrap_or_else(|err| {
            error!("malformed base policy '{}': {err}", path.display());
            PolicyDocument::default()
        }),
        Err(err) => {
            error!("unable to read base policy '{}': {err}", path.display());
            PolicyDocument::default()
        }
    }
}

fn load_user(path: &Path) -> Option<PolicyDocument> {
    match fs::read_to_string(path) {
        Ok(text) => match parse_document(&text, path) {
            Ok(document) => Some(document),
            Err(err) => {
                warn!("malformed user policy '{}': {err}; ignoring it", path.display());
                None
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Err(err) = write_user_placeholder(path) {
                warn!("unable to create user policy '{}': {err}", path.display());
            }
            None
        }
        Err(err) => {
            warn!("unable to read user policy '{}': {err}", path.display());
            None
        }
    }
}

/// Parse one policy file.
///
/// The top level must be a JSON object. Keys starting with `//` are comment
/// entries and are skipped silently; any other entry that does not parse as
/// a [`PackageRule`] is dropped with a warning so one bad rule cannot take
/// the rest of the file down.
fn parse_document(text: &str, path: &Path) -> Result<PolicyDocument> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(entries) = value else {
        return Err(PolicyError::NotAnObject {
            path: path.to_path_buf(),
        });
    };

    let mut document = PolicyDocument::default();
    for (package, rule) in entries {
        if package.starts_with("//") {
            continue;
        }
        match serde_json::from_value::<PackageRule>(rule) {
            Ok(rule) => document.insert(package, rule),
            Err(err) => warn!(
                "ignoring malformed rule for '{package}' in '{}': {err}",
                path.display()
            ),
        }
    }
    Ok(document)
}

const USER_PLACEHOLDER: &str = r#"{
  "//": "Package rules placed here replace the bundled rule for that package wholesale."
}
"#;

fn write_user_placeholder(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, USER_PLACEHOLDER)?;
    info!("created user policy placeholder at '{}'", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::TempDir;

    use super::*;
    use crate::document::FirstMatchAction;

    fn paths_in(dir: &TempDir) -> PolicyPaths {
        PolicyPaths {
            base: dir.path().join("pip_policy.json"),
            user: dir.path().join("pip_policy.user.json"),
        }
    }

    #[test]
    #[serial]
    fn test_missing_files_degrade_to_empty() {
        let dir = TempDir::new().unwrap();
        let paths = paths_in(&dir);
        set_policy_paths(paths.clone());

        let policy = get_pip_policy();
        assert!(policy.is_empty());

        // the user placeholder was created and parses as an empty rule set
        let placeholder = fs::read_to_string(&paths.user).unwrap();
        let parsed = parse_document(&placeholder, &paths.user).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    #[serial]
    fn test_user_rule_replaces_base_rule() {
        let dir = TempDir::new().unwrap();
        let paths = paths_in(&dir);
        fs::write(
            &paths.base,
            r#"{
                "torch": { "apply_first_match": [ { "type": "skip" } ],
                           "restore": [ { "target": "torch", "version": "2.1.0" } ] },
                "numpy": { "apply_first_match": [ { "type": "force_version", "version": "1.26.4" } ] }
            }"#,
        )
        .unwrap();
        fs::write(
            &paths.user,
            r#"{ "torch": { "apply_first_match": [ { "type": "force_version", "version": "2.2.0" } ] } }"#,
        )
        .unwrap();
        set_policy_paths(paths);

        let policy = get_pip_policy();
        assert_eq!(policy.len(), 2);
        let torch = policy.get("torch").unwrap();
        assert!(torch.restore.is_empty());
        assert!(matches!(
            &torch.apply_first_match[0].action,
            FirstMatchAction::ForceVersion { version, .. } if version == "2.2.0"
        ));
    }

    #[test]
    #[serial]
    fn test_malformed_base_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let paths = paths_in(&dir);
        fs::write(&paths.base, "not json at all").unwrap();
        set_policy_paths(paths);

        assert!(get_pip_policy().is_empty());
    }

    #[test]
    #[serial]
    fn test_non_object_base_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let paths = paths_in(&dir);
        fs::write(&paths.base, "[1, 2, 3]").unwrap();
        set_policy_paths(paths);

        assert!(get_pip_policy().is_empty());
    }

    #[test]
    #[serial]
    fn test_bad_entry_does_not_poison_the_file() {
        let dir = TempDir::new().unwrap();
        let paths = paths_in(&dir);
        fs::write(
            &paths.base,
            r#"{
                "//": "bundled policy",
                "broken": "this is not a rule",
                "requests": { "apply_all_matches": [ { "type": "pin_dependencies", "pinned_packages": ["urllib3"] } ] }
            }"#,
        )
        .unwrap();
        set_policy_paths(paths);

        let policy = get_pip_policy();
        assert_eq!(policy.len(), 1);
        assert!(policy.get("requests").is_some());
        assert!(policy.get("broken").is_none());
    }

    #[test]
    #[serial]
    fn test_malformed_user_keeps_base() {
        let dir = TempDir::new().unwrap();
        let paths = paths_in(&dir);
        fs::write(
            &paths.base,
            r#"{ "torch": { "apply_first_match": [ { "type": "skip" } ] } }"#,
        )
        .unwrap();
        fs::write(&paths.user, "{ truncated").unwrap();
        set_policy_paths(paths);

        let policy = get_pip_policy();
        assert_eq!(policy.len(), 1);
        assert!(policy.get("torch").is_some());
    }

    #[test]
    #[serial]
    fn test_document_is_cached_until_paths_change() {
        let dir = TempDir::new().unwrap();
        let paths = paths_in(&dir);
        fs::write(&paths.base, r#"{ "torch": {} }"#).unwrap();
        set_policy_paths(paths.clone());

        assert_eq!(get_pip_policy().len(), 1);

        // edits after the first load are not observed
        fs::write(&paths.base, r#"{ "torch": {}, "numpy": {} }"#).unwrap();
        assert_eq!(get_pip_policy().len(), 1);

        // re-pointing the loader drops the cache
        set_policy_paths(paths);
        assert_eq!(get_pip_policy().len(), 2);
    }
}
