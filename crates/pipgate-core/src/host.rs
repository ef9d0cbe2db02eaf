use pipgate_utils::system;

/// Capability probes for the machine and the embedding application.
///
/// Platform conditions in the policy are evaluated against these answers.
pub trait HostEnv {
    /// Lowercase OS name in policy spelling (`linux`, `darwin`, `windows`).
    fn os_name(&self) -> String;

    /// Whether a supported GPU is available.
    fn has_gpu(&self) -> bool;

    /// Version of the embedding application, if the host wires it up.
    fn app_version(&self) -> Option<String>;
}

/// Probes backed by the local system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemHost;

impl HostEnv for SystemHost {
    fn os_name(&self) -> String {
        system::os_name().to_string()
    }

    fn has_gpu(&self) -> bool {
        system::has_nvidia_gpu()
    }

    // Not wired up yet; conditions on the app version evaluate false until
    // a host supplies its own HostEnv.
    fn app_version(&self) -> Option<String> {
        None
    }
}
