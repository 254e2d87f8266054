use crate::error::{AppResult, UserError};
use std::env;

// --- Module Declarations ---
pub mod go;

// --- Toolchain Trait ---
/// Describes the one distribution this tool manages: how its archives are
/// named, what its install tree looks like, and how it reports its version.
pub trait Toolchain: Send + Sync {
    fn name(&self) -> &'static str;

    /// Executable inside `<tree>/bin` that answers the version query.
    fn executable(&self) -> &'static str;

    /// The folder every entry of a release archive is nested under.
    fn archive_root(&self) -> &'static str;

    /// Page listing every published release archive.
    fn listing_url(&self) -> &'static str;

    fn root_env_var(&self) -> &'static str;
    fn workspace_env_var(&self) -> &'static str;

    /// Regex with two capture groups: the semantic version and the `os/arch` tag.
    fn version_pattern(&self) -> &'static str;

    /// Maps a Rust `(OS, ARCH)` pair to the platform tag used in archive names.
    fn platform_tag(&self, os: &str, arch: &str) -> Option<String>;

    fn version_args(&self) -> &'static [&'static str] {
        &["version"]
    }

    /// Name of the active tree directory under the install root.
    fn active_dir_name(&self) -> &'static str {
        self.archive_root()
    }

    /// Name of the per-user workspace directory under the home directory.
    fn workspace_dir_name(&self) -> &'static str {
        self.archive_root()
    }

    fn archived_dir_prefix(&self) -> String {
        format!("{}-", self.archive_root())
    }

    fn archive_file_name(&self, version: &str, platform: &str) -> String {
        format!("{}{}.{}.tar.gz", self.archive_root(), version, platform)
    }

    /// Regex matching archive file names for `platform`, capturing the version.
    fn archive_file_pattern(&self, platform: &str) -> String {
        format!(
            r"{}(\d+\.\d+\.\d+)\.{}\.tar\.gz",
            regex::escape(self.archive_root()),
            regex::escape(platform)
        )
    }
}

/// Resolves the platform tag for the machine we are running on.
pub fn detect_platform(toolchain: &dyn Toolchain) -> AppResult<String> {
    let (os, arch) = (env::consts::OS, env::consts::ARCH);
    let tag = toolchain
        .platform_tag(os, arch)
        .ok_or_else(|| UserError::UnsupportedPlatform {
            name: toolchain.name().to_string(),
            os: os.to_string(),
            arch: arch.to_string(),
        })?;
    tracing::debug!(platform = %tag, "Detected platform");
    Ok(tag)
}

/// Orders `MAJOR.MINOR.PATCH` strings numerically; anything unparsable sorts first.
pub fn version_key(version: &str) -> (u64, u64, u64) {
    let mut parts = version.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

#[cfg(test)]
mod tests {
    use super::go::Go;
    use super::*;
    use regex::Regex;

    #[test]
    fn test_archive_names_follow_release_convention() {
        assert_eq!(
            Go.archive_file_name("1.22.0", "linux-amd64"),
            "go1.22.0.linux-amd64.tar.gz"
        );
        assert_eq!(Go.archived_dir_prefix(), "go-");
    }

    #[test]
    fn test_archive_pattern_is_anchored_to_platform() -> AppResult<()> {
        let re = Regex::new(&Go.archive_file_pattern("linux-amd64"))?;
        let caps = re
            .captures("<a href=\"/dl/go1.22.0.linux-amd64.tar.gz\">")
            .expect("pattern should match");
        assert_eq!(&caps[1], "1.22.0");
        assert!(!re.is_match("go1.22.0.linux-arm64.tar.gz"));
        assert!(!re.is_match("go1.22.0.linux-amd64.msi"));
        Ok(())
    }

    #[test]
    fn test_version_key_orders_numerically() {
        assert!(version_key("1.10.0") > version_key("1.9.7"));
        assert!(version_key("1.22.0") > version_key("1.21.13"));
        assert_eq!(version_key("garbage"), (0, 0, 0));
    }
}
