use crate::error::ProbeError;
use crate::toolchain::Toolchain;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const UNKNOWN_VERSION: &str = "Unknown version";
pub const UNKNOWN_PLATFORM: &str = "Unknown OS/Arch";

/// What an install tree's executable reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedVersion {
    pub version: String,
    pub platform: String,
}

impl ProbedVersion {
    /// The sentinel returned when the executable runs but its output is unrecognized.
    pub fn unknown() -> Self {
        Self {
            version: UNKNOWN_VERSION.to_string(),
            platform: UNKNOWN_PLATFORM.to_string(),
        }
    }

    pub fn is_known(&self) -> bool {
        self.version != UNKNOWN_VERSION
    }

    /// True only for a real version equal to `requested`; the sentinel never matches.
    pub fn is_version(&self, requested: &str) -> bool {
        self.is_known() && self.version == requested
    }
}

pub fn executable_path(toolchain: &dyn Toolchain, install_dir: &Path) -> PathBuf {
    install_dir.join("bin").join(toolchain.executable())
}

/// Runs the tree's executable and parses its version line.
#[tracing::instrument(skip_all, fields(install_dir = %install_dir.display()))]
pub fn probe(toolchain: &dyn Toolchain, install_dir: &Path) -> Result<ProbedVersion, ProbeError> {
    let exe = executable_path(toolchain, install_dir);
    if !is_executable(&exe) {
        return Err(ProbeError::NotInstalled { path: exe });
    }

    let args = toolchain.version_args();
    let command = format!("{} {}", exe.display(), args.join(" "));
    let output = Command::new(&exe)
        .args(args)
        .output()
        .map_err(|e| ProbeError::InvocationFailed {
            command: command.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ProbeError::InvocationFailed {
            command,
            reason: format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let probed = parse_version_output(toolchain.version_pattern(), &stdout);
    tracing::debug!(version = %probed.version, platform = %probed.platform, "Probed install tree");
    Ok(probed)
}

/// Extracts `(version, os/arch)` from the executable's output, or the sentinel.
pub fn parse_version_output(pattern: &str, output: &str) -> ProbedVersion {
    let Ok(re) = Regex::new(pattern) else {
        tracing::warn!(pattern, "Invalid version pattern");
        return ProbedVersion::unknown();
    };
    match re.captures(output) {
        Some(caps) if caps.len() >= 3 => ProbedVersion {
            version: caps[1].to_string(),
            platform: caps[2].to_string(),
        },
        _ => {
            tracing::debug!(output = %output.trim(), "Version output did not match the expected pattern");
            ProbedVersion::unknown()
        }
    }
}

/// True if `path` is a directory with at least one entry.
pub fn dir_not_empty(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_fake_tree;
    use crate::toolchain::go::Go;
    use tempfile::tempdir;

    #[test]
    fn test_parse_version_output() {
        let probed = parse_version_output(Go.version_pattern(), "go version go1.21.5 linux/amd64\n");
        assert_eq!(probed.version, "1.21.5");
        assert_eq!(probed.platform, "linux/amd64");
        assert!(probed.is_version("1.21.5"));
        assert!(!probed.is_version("1.21.6"));
    }

    #[test]
    fn test_unmatched_output_yields_sentinel() {
        let probed = parse_version_output(Go.version_pattern(), "go version devel +abc123 Tue");
        assert_eq!(probed, ProbedVersion::unknown());
        assert!(!probed.is_known());
        assert!(!probed.is_version(UNKNOWN_VERSION));
        assert!(!probed.is_version("1.22.0"));
    }

    #[test]
    fn test_missing_executable_is_not_installed() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let err = probe(&Go, dir.path()).unwrap_err();
        assert!(matches!(err, ProbeError::NotInstalled { .. }));
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_non_executable_file_is_not_installed() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("bin"))?;
        fs::write(dir.path().join("bin/go"), "not a program")?;
        let err = probe(&Go, dir.path()).unwrap_err();
        assert!(matches!(err, ProbeError::NotInstalled { .. }));
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_probe_runs_the_executable() -> anyhow::Result<()> {
        let dir = tempdir()?;
        write_fake_tree(dir.path(), "1.21.5")?;
        let probed = probe(&Go, dir.path())?;
        assert_eq!(probed.version, "1.21.5");
        assert_eq!(probed.platform, "linux/amd64");
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_failing_executable_is_an_invocation_error() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir()?;
        let exe = dir.path().join("bin/go");
        fs::create_dir_all(dir.path().join("bin"))?;
        fs::write(&exe, "#!/bin/sh\necho boom >&2\nexit 3\n")?;
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755))?;

        let err = probe(&Go, dir.path()).unwrap_err();
        assert!(matches!(err, ProbeError::InvocationFailed { .. }), "got {err:?}");
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_garbled_output_probes_as_sentinel() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir()?;
        let exe = dir.path().join("bin/go");
        fs::create_dir_all(dir.path().join("bin"))?;
        fs::write(&exe, "#!/bin/sh\necho something else entirely\n")?;
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755))?;

        let probed = probe(&Go, dir.path())?;
        assert_eq!(probed, ProbedVersion::unknown());
        Ok(())
    }

    #[test]
    fn test_dir_not_empty() -> anyhow::Result<()> {
        let dir = tempdir()?;
        assert!(!dir_not_empty(&dir.path().join("missing")));
        assert!(!dir_not_empty(dir.path()));
        fs::write(dir.path().join("file"), "x")?;
        assert!(dir_not_empty(dir.path()));
        Ok(())
    }
}
