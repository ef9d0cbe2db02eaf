use pipgate_policy::{
    get_pip_policy, AllMatchesAction, FirstMatchAction, OnFailure, PackageRule, PolicyDocument,
};
use tracing::{debug, info, warn};

use crate::{
    error::EngineError,
    eval::condition_holds,
    host::{HostEnv, SystemHost},
    manager::{CommandOutput, PackageManager},
    snapshot::Snapshot,
    spec::RequestSpec,
    EngineResult,
};

/// Scoped installation session over one Python environment.
///
/// A batch owns the freeze snapshot for its lifetime and drives every
/// package-manager invocation through the injected shim. The typical shape
/// of a maintenance pass is:
///
/// ```text
/// let mut batch = PipBatch::new(manager);
/// batch.ensure_not_installed();
/// batch.install("some-extension-dep", None, false)?;
/// batch.ensure_installed();
/// drop(batch);
/// ```
///
/// Batches are not safe for concurrent use; run one at a time per process.
pub struct PipBatch<M> {
    manager: M,
    host: Box<dyn HostEnv>,
    snapshot: Option<Snapshot>,
    policy_override: Option<PolicyDocument>,
}

impl<M: PackageManager> PipBatch<M> {
    /// Start a batch over the given manager, probing the local system.
    pub fn new(manager: M) -> Self {
        Self::with_host(manager, Box::new(SystemHost))
    }

    /// Start a batch with custom host probes.
    pub fn with_host(manager: M, host: Box<dyn HostEnv>) -> Self {
        Self {
            manager,
            host,
            snapshot: None,
            policy_override: None,
        }
    }

    /// Evaluate against a fixed policy document instead of the process-wide
    /// one.
    pub fn with_policy(mut self, policy: PolicyDocument) -> Self {
        self.policy_override = Some(policy);
        self
    }

    /// Install a package under policy.
    ///
    /// Returns `Ok(false)` when a `skip` directive blocked the install,
    /// `Ok(true)` when the composed install command succeeded. A
    /// caller-supplied `extra_index_url` takes precedence over any
    /// directive-supplied one. With `override_policy`, the request is
    /// executed verbatim and no rule is consulted.
    pub fn install(
        &mut self,
        request_spec: &str,
        extra_index_url: Option<&str>,
        override_policy: bool,
    ) -> EngineResult<bool> {
        let request = RequestSpec::try_from(request_spec)?;

        if override_policy {
            debug!("installing '{}' with policy evaluation overridden", request.name);
            self.run_install(&[request.as_requirement()], extra_index_url)?;
            self.snapshot = None;
            return Ok(true);
        }

        let policy = self.policy();
        self.ensure_snapshot();

        let Some(rule) = policy.get(&request.name) else {
            self.run_install(&[request.as_requirement()], extra_index_url)?;
            self.snapshot = None;
            return Ok(true);
        };

        let outcome = {
            let snapshot = self.snapshot.as_ref().unwrap();
            build_plan(rule, &request, snapshot, self.host.as_ref())
        };

        let plan = match outcome {
            PlanOutcome::Skip { reason } => {
                match reason {
                    Some(reason) => info!("skipping install of '{}': {reason}", request.name),
                    None => info!("skipping install of '{}' per policy", request.name),
                }
                return Ok(false);
            }
            PlanOutcome::Proceed(plan) => plan,
        };

        let index_url = extra_index_url.or(plan.directive_index_url.as_deref());

        let mut with_pins = Vec::with_capacity(1 + plan.pins.len() + plan.extras.len());
        with_pins.push(plan.target.clone());
        with_pins.extend(plan.pins.iter().cloned());
        with_pins.extend(plan.extras.iter().cloned());

        match self.run_install(&with_pins, index_url) {
            Ok(()) => {}
            Err(err) if plan.retry_without_pin && !plan.pins.is_empty() => {
                warn!(
                    "install of '{}' failed with pinned dependencies held; retrying without pins: {err}",
                    request.name
                );
                let mut without_pins = Vec::with_capacity(1 + plan.extras.len());
                without_pins.push(plan.target.clone());
                without_pins.extend(plan.extras.iter().cloned());
                self.run_install(&without_pins, index_url)?;
            }
            Err(err) => return Err(err),
        }

        self.snapshot = None;
        for reason in &plan.reasons {
            info!("policy applied for '{}': {reason}", request.name);
        }
        Ok(true)
    }

    /// Remove every package the policy bans, across all rules.
    ///
    /// Per rule, the first uninstall directive whose condition holds
    /// concludes that rule; it removes its target only when the target is
    /// actually installed. Individual failures are logged and the sweep
    /// continues. Returns the names actually removed.
    pub fn ensure_not_installed(&mut self) -> Vec<String> {
        let policy = self.policy();
        self.ensure_snapshot();

        let mut removed = Vec::new();
        for (package, rule) in policy.iter() {
            if rule.uninstall.is_empty() {
                continue;
            }
            let snapshot = self.snapshot.as_ref().unwrap();
            let Some(directive) = rule.uninstall.iter().find(|directive| {
                condition_holds(directive.condition.as_ref(), package, snapshot, self.host.as_ref())
            }) else {
                continue;
            };

            if !snapshot.contains(&directive.target) {
                debug!("'{}' is not installed; nothing to remove", directive.target);
                continue;
            }

            match self.run_uninstall(&directive.target) {
                Ok(()) => {
                    match &directive.reason {
                        Some(reason) => info!("removed '{}': {reason}", directive.target),
                        None => info!("removed '{}'", directive.target),
                    }
                    self.snapshot.as_mut().unwrap().remove(&directive.target);
                    removed.push(directive.target.clone());
                }
                Err(err) => warn!("failed to remove '{}': {err}", directive.target),
            }
        }
        removed
    }

    /// Reinstall every package the policy wants held at a fixed version,
    /// across all rules.
    ///
    /// Per rule, the first restore directive whose condition holds fires;
    /// nothing runs when the installed version already matches. Individual
    /// failures are logged and the sweep continues. Returns the names
    /// actually (re)installed.
    pub fn ensure_installed(&mut self) -> Vec<String> {
        let policy = self.policy();
        self.ensure_snapshot();

        let mut restored = Vec::new();
        for (package, rule) in policy.iter() {
            if rule.restore.is_empty() {
                continue;
            }
            let snapshot = self.snapshot.as_ref().unwrap();
            let Some(directive) = rule.restore.iter().find(|directive| {
                condition_holds(directive.condition.as_ref(), package, snapshot, self.host.as_ref())
            }) else {
                continue;
            };

            if snapshot.version_of(&directive.target) == Some(directive.version.as_str()) {
                debug!("'{}' already at {}", directive.target, directive.version);
                continue;
            }

            let requirement = format!("{}=={}", directive.target, directive.version);
            match self.run_install(&[requirement], directive.extra_index_url.as_deref()) {
                Ok(()) => {
                    match &directive.reason {
                        Some(reason) => {
                            info!("restored '{}' to {}: {reason}", directive.target, directive.version)
                        }
                        None => info!("restored '{}' to {}", directive.target, directive.version),
                    }
                    self.snapshot
                        .as_mut()
                        .unwrap()
                        .insert(&directive.target, &directive.version);
                    restored.push(directive.target.clone());
                }
                Err(err) => warn!(
                    "failed to restore '{}' to {}: {err}",
                    directive.target, directive.version
                ),
            }
        }
        restored
    }

    /// The cached environment view, built from `freeze` on first use.
    pub fn snapshot(&mut self) -> &Snapshot {
        self.ensure_snapshot();
        self.snapshot.as_ref().unwrap()
    }

    /// Drop the cached snapshot; the next read rebuilds it.
    pub fn invalidate_snapshot(&mut self) {
        self.snapshot = None;
    }

    fn policy(&self) -> PolicyDocument {
        self.policy_override.clone().unwrap_or_else(get_pip_policy)
    }

    fn ensure_snapshot(&mut self) {
        if self.snapshot.is_none() {
            self.snapshot = Some(self.build_snapshot());
        }
    }

    fn build_snapshot(&self) -> Snapshot {
        let argv = self.manager.build_argv(&["freeze".to_string()]);
        match self.manager.run(&argv) {
            Ok(output) if output.success => Snapshot::from_freeze_output(&output.stdout),
            Ok(output) => {
                warn!(
                    "freeze failed ({}); assuming an empty environment",
                    failure_detail(&output)
                );
                Snapshot::default()
            }
            Err(err) => {
                warn!("unable to run freeze: {err}; assuming an empty environment");
                Snapshot::default()
            }
        }
    }

    fn run_install(&self, packages: &[String], extra_index_url: Option<&str>) -> EngineResult<()> {
        let mut args = Vec::with_capacity(packages.len() + 3);
        args.push("install".to_string());
        args.extend(packages.iter().cloned());
        if let Some(url) = extra_index_url {
            args.push("--extra-index-url".to_string());
            args.push(url.to_string());
        }
        let argv = self.manager.build_argv(&args);
        debug!("running {argv:?}");
        let output = self.manager.run(&argv)?;
        if output.success {
            Ok(())
        } else {
            Err(EngineError::InstallFailed {
                target: packages.join(" "),
                detail: failure_detail(&output),
            })
        }
    }

    fn run_uninstall(&self, package: &str) -> EngineResult<()> {
        let args = vec![
            "uninstall".to_string(),
            "-y".to_string(),
            package.to_string(),
        ];
        let argv = self.manager.build_argv(&args);
        debug!("running {argv:?}");
        let output = self.manager.run(&argv)?;
        if output.success {
            Ok(())
        } else {
            Err(EngineError::UninstallFailed {
                target: package.to_string(),
                detail: failure_detail(&output),
            })
        }
    }
}

/// Install command for one request after policy evaluation.
#[derive(Debug, Default)]
struct InstallPlan {
    /// Main requirement: the request itself, or whatever a first-match
    /// directive rewrote it to.
    target: String,
    /// `name==installed_version` holds from pin_dependencies directives.
    pins: Vec<String>,
    /// Verbatim additions from install_with directives.
    extras: Vec<String>,
    directive_index_url: Option<String>,
    /// Retry without pins on failure; an explicit `fail` anywhere wins.
    retry_without_pin: bool,
    reasons: Vec<String>,
}

enum PlanOutcome {
    Skip { reason: Option<String> },
    Proceed(InstallPlan),
}

fn build_plan(
    rule: &PackageRule,
    request: &RequestSpec,
    snapshot: &Snapshot,
    host: &dyn HostEnv,
) -> PlanOutcome {
    let mut plan = InstallPlan {
        target: request.as_requirement(),
        ..Default::default()
    };

    // exclusive section: the first satisfied directive takes effect
    for directive in &rule.apply_first_match {
        if !condition_holds(directive.condition.as_ref(), &request.name, snapshot, host) {
            continue;
        }
        match &directive.action {
            FirstMatchAction::Skip => {
                return PlanOutcome::Skip {
                    reason: directive.reason.clone(),
                };
            }
            FirstMatchAction::ForceVersion {
                version,
                extra_index_url,
            } => {
                plan.target = format!("{}=={}", request.name, version);
                plan.directive_index_url = extra_index_url.clone();
            }
            FirstMatchAction::Replace {
                replacement,
                version,
                extra_index_url,
            } => {
                plan.target = format!("{}{}", replacement, version.as_deref().unwrap_or(""));
                plan.directive_index_url = extra_index_url.clone();
            }
        }
        if let Some(reason) = &directive.reason {
            plan.reasons.push(reason.clone());
        }
        break;
    }

    // cumulative section: every satisfied directive applies
    let mut saw_fail = false;
    let mut saw_retry = false;
    for directive in &rule.apply_all_matches {
        if !condition_holds(directive.condition.as_ref(), &request.name, snapshot, host) {
            continue;
        }
        match &directive.action {
            AllMatchesAction::PinDependencies {
                pinned_packages,
                on_failure,
            } => {
                for package in pinned_packages {
                    match snapshot.version_of(package) {
                        Some(version) => plan.pins.push(format!("{package}=={version}")),
                        None => debug!("pin candidate '{package}' is not installed; nothing to hold"),
                    }
                }
                match on_failure {
                    Some(OnFailure::Fail) => saw_fail = true,
                    Some(OnFailure::RetryWithoutPin) => saw_retry = true,
                    None => {}
                }
            }
            AllMatchesAction::InstallWith {
                additional_packages,
            } => {
                plan.extras.extend(additional_packages.iter().cloned());
            }
            AllMatchesAction::Warn {
                message,
                allow_continue,
            } => {
                // allow_continue is advisory; interactive holds belong to the frontend
                let _ = allow_continue;
                warn!("{message}");
            }
        }
        if let Some(reason) = &directive.reason {
            plan.reasons.push(reason.clone());
        }
    }
    plan.retry_without_pin = saw_retry && !saw_fail;

    PlanOutcome::Proceed(plan)
}

fn failure_detail(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        match output.status_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    } else {
        stderr.lines().last().unwrap_or(stderr).to_string()
    }
}
