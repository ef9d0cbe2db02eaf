use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Merged, in-memory view of the base and user policy files.
///
/// Maps package names (case-sensitive, exactly as written in the policy
/// files and in install requests) to their rules. Packages without an
/// entry install under default behavior.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PolicyDocument {
    #[serde(flatten)]
    rules: BTreeMap<String, PackageRule>,
}

impl PolicyDocument {
    pub fn get(&self, package: &str) -> Option<&PackageRule> {
        self.rules.get(package)
    }

    pub fn insert(&mut self, package: impl Into<String>, rule: PackageRule) {
        self.rules.insert(package.into(), rule);
    }

    /// Iterate rules in document order (sorted by package name).
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PackageRule)> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Overlay the user document: each package present there replaces its
    /// entire rule. Packages unique to either side are retained.
    pub fn merge_overrides(&mut self, overrides: PolicyDocument) {
        for (package, rule) in overrides.rules {
            self.rules.insert(package, rule);
        }
    }
}

/// Rule set for one package, split into the four policy sections.
///
/// `uninstall` and `restore` run during the batch sweeps; the two `apply_*`
/// sections rewrite the install plan of a single `install` call.
/// `apply_first_match` is exclusive (first satisfied directive wins),
/// `apply_all_matches` is cumulative.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PackageRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uninstall: Vec<UninstallDirective>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_first_match: Vec<FirstMatchDirective>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_all_matches: Vec<AllMatchesDirective>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restore: Vec<RestoreDirective>,
}

/// Pre-removal directive: uninstall `target` if the condition holds and the
/// package is present.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UninstallDirective {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,

    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Exclusive install-plan modifier.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FirstMatchDirective {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,

    #[serde(flatten)]
    pub action: FirstMatchAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FirstMatchAction {
    /// Do not install the requested package at all.
    Skip,
    /// Install the requested package at exactly `version`.
    ForceVersion {
        version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra_index_url: Option<String>,
    },
    /// Install `replacement` instead of the requested package. `version`
    /// is a verbatim requirement suffix (`"==9.5.0"`, `">=2,<3"`).
    Replace {
        replacement: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra_index_url: Option<String>,
    },
}

/// Cumulative install-plan modifier.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AllMatchesDirective {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,

    #[serde(flatten)]
    pub action: AllMatchesAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllMatchesAction {
    /// Hold the listed packages at their currently installed versions by
    /// adding `name==installed_version` entries to the install command.
    PinDependencies {
        pinned_packages: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_failure: Option<OnFailure>,
    },
    /// Install additional packages alongside the requested one, verbatim.
    InstallWith { additional_packages: Vec<String> },
    /// Emit a warning; does not change the install plan.
    Warn {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        allow_continue: Option<bool>,
    },
}

/// What to do when an install that carries pins fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    Fail,
    RetryWithoutPin,
}

/// Post-install corrective: reinstall `target` at exactly `version` when the
/// environment drifted.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RestoreDirective {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,

    pub target: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_index_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Guard attached to a directive. A directive with no condition always
/// applies.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Holds when `package` (default: the package being processed) is
    /// installed, optionally at a version matching `spec`.
    Installed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        package: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spec: Option<String>,
    },
    /// Holds when every provided subfield matches the host.
    Platform {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        os: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        has_gpu: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host_app_version: Option<String>,
    },
    /// Condition type this build does not know. Never satisfied.
    #[serde(other)]
    Unknown,
}
