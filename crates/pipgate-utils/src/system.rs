use std::{
    process::{Command, Stdio},
    sync::OnceLock,
};

use tracing::debug;

/// Lowercase operating system name as install policies spell it
/// (`linux`, `darwin`, `windows`).
pub fn os_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

static HAS_GPU: OnceLock<bool> = OnceLock::new();

/// Whether an NVIDIA GPU is visible to the driver stack.
///
/// Probes `nvidia-smi` once and caches the answer for the lifetime of the
/// process. A missing binary or a nonzero exit both count as "no GPU".
pub fn has_nvidia_gpu() -> bool {
    *HAS_GPU.get_or_init(|| {
        let found = Command::new("nvidia-smi")
            .arg("-L")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false);
        debug!("nvidia gpu probe: {found}");
        found
    })
}
