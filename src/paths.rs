use crate::error::{PolicyError, UserError};
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Where system-wide installs live.
pub const SYSTEM_ROOT: &str = "/usr/local";

const WRITE_CHECK_FILE: &str = ".tmp-check";

/// Which install root a command operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    System,
    User,
    Explicit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    System,
    User,
    Custom,
}

impl fmt::Display for InstallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallKind::System => write!(f, "Global"),
            InstallKind::User => write!(f, "User"),
            InstallKind::Custom => write!(f, "Custom"),
        }
    }
}

#[tracing::instrument]
pub fn resolve_root(selector: &TargetSelector) -> Result<PathBuf, PolicyError> {
    let root = match selector {
        TargetSelector::System => PathBuf::from(SYSTEM_ROOT),
        TargetSelector::User => dirs::home_dir().ok_or(PolicyError::NoHomeDirectory)?,
        TargetSelector::Explicit(path) => {
            if path.trim().is_empty() {
                return Err(PolicyError::EmptySelector);
            }
            PathBuf::from(shellexpand::tilde(path).to_string())
        }
    };
    tracing::info!(root = %root.display(), "Resolved install root");
    Ok(root)
}

/// Best-effort check: creates and removes a marker file in `path`.
pub fn is_writable(path: &Path) -> bool {
    let marker = path.join(WRITE_CHECK_FILE);
    match File::create(&marker) {
        Ok(_) => {
            if let Err(e) = fs::remove_file(&marker) {
                tracing::warn!(path = %marker.display(), error = %e, "Failed to remove write-check file");
            }
            true
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Path is not writable");
            false
        }
    }
}

/// Rejects a root that is not an existing, writable directory. Never creates it.
pub fn check_install_root(root: &Path) -> Result<(), UserError> {
    if !root.is_dir() || !is_writable(root) {
        return Err(UserError::InstallRootNotWritable {
            path: root.to_path_buf(),
        });
    }
    Ok(())
}

pub fn install_kind(root: &Path) -> InstallKind {
    if root == Path::new(SYSTEM_ROOT) {
        InstallKind::System
    } else if dirs::home_dir().is_some_and(|home| home == root) {
        InstallKind::User
    } else {
        InstallKind::Custom
    }
}
