use std::sync::LazyLock;

use regex::Regex;

static NAME_FOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("unable to compile name fold regex"));

/// Normalize a Python distribution name for comparison.
///
/// Lowercases the name and folds any run of `-`, `_` and `.` into a single
/// hyphen, so `Scikit_Learn`, `scikit.learn` and `scikit-learn` all compare
/// equal. This is the canonical form the package index and `freeze` output
/// use.
///
/// # Examples
///
/// ```
/// use pipgate_utils::string::normalize_package_name;
/// assert_eq!(normalize_package_name("Scikit_Learn"), "scikit-learn");
/// assert_eq!(normalize_package_name("ruamel.yaml"), "ruamel-yaml");
/// ```
pub fn normalize_package_name(name: &str) -> String {
    NAME_FOLD_RE.replace_all(name, "-").to_lowercase()
}
