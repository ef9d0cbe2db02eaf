use std::str::FromStr;

use pep440_rs::{Version, VersionSpecifiers};
use pipgate_policy::Condition;
use tracing::warn;

use crate::{host::HostEnv, snapshot::Snapshot};

/// Decide whether `condition` holds for `package` given the current
/// environment. A directive without a condition always applies.
pub fn condition_holds(
    condition: Option<&Condition>,
    package: &str,
    snapshot: &Snapshot,
    host: &dyn HostEnv,
) -> bool {
    let Some(condition) = condition else {
        return true;
    };

    match condition {
        Condition::Installed {
            package: subject,
            spec,
        } => {
            let subject = subject.as_deref().unwrap_or(package);
            let Some(installed) = snapshot.version_of(subject) else {
                return false;
            };
            match spec {
                Some(spec) => version_matches(installed, spec, subject),
                None => true,
            }
        }
        Condition::Platform {
            os,
            has_gpu,
            host_app_version,
        } => {
            if let Some(os) = os {
                if !os.eq_ignore_ascii_case(&host.os_name()) {
                    return false;
                }
            }
            if let Some(wants_gpu) = has_gpu {
                if *wants_gpu != host.has_gpu() {
                    return false;
                }
            }
            if let Some(spec) = host_app_version {
                let Some(app_version) = host.app_version() else {
                    warn!("host application version probe is not wired; condition cannot match");
                    return false;
                };
                if !version_matches(&app_version, spec, "host application") {
                    return false;
                }
            }
            true
        }
        Condition::Unknown => {
            warn!("unknown condition type on rule for '{package}'; treating as unsatisfied");
            false
        }
    }
}

/// Whether `installed` satisfies the requirement-style `spec`.
/// Parsing is permissive: either side failing to parse logs a warning and
/// does not match.
fn version_matches(installed: &str, spec: &str, subject: &str) -> bool {
    let specifiers = match VersionSpecifiers::from_str(spec) {
        Ok(specifiers) => specifiers,
        Err(err) => {
            warn!("unparseable version spec '{spec}' for '{subject}': {err}");
            return false;
        }
    };
    let version = match Version::from_str(installed) {
        Ok(version) => version,
        Err(err) => {
            warn!("unparseable installed version '{installed}' for '{subject}': {err}");
            return false;
        }
    };
    specifiers.contains(&version)
}
