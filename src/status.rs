use crate::config::{InstallLayout, ToolchainEnvironment};
use crate::error::{AppResult, ProbeError};
use crate::paths::{InstallKind, install_kind, is_writable};
use crate::probe::{ProbedVersion, executable_path, probe};
use crate::toolchain::{Toolchain, version_key};
use anyhow::Context;
use std::fs;
use std::io;
use std::path::Path;

/// Everything `status` reports about one install root.
#[derive(Debug)]
pub struct StatusReport {
    pub exists: bool,
    pub probed: Result<ProbedVersion, ProbeError>,
    pub writable: bool,
    pub kind: InstallKind,
    pub environment: ToolchainEnvironment,
    pub root_var_ok: bool,
    pub workspace_var_ok: bool,
    /// The executable found through `PATH` is the active tree's.
    pub on_path: bool,
}

#[tracing::instrument(skip_all, fields(root = %layout.root().display()))]
pub fn collect_status(layout: &InstallLayout, toolchain: &dyn Toolchain) -> AppResult<StatusReport> {
    let active = layout.active_dir();
    let environment = ToolchainEnvironment::expected(toolchain, layout)?;
    let on_path = match which::which(toolchain.executable()) {
        Ok(found) => same_file(&found, &executable_path(toolchain, active)),
        Err(e) => {
            tracing::debug!(error = %e, "Executable not found in PATH");
            false
        }
    };

    Ok(StatusReport {
        exists: active.is_dir(),
        probed: probe(toolchain, active),
        writable: is_writable(active),
        kind: install_kind(layout.root()),
        root_var_ok: environment.root_is_current(),
        workspace_var_ok: environment.workspace_is_current(),
        environment,
        on_path,
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// The active version plus every archived tree, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVersions {
    pub active: Option<ProbedVersion>,
    pub archived: Vec<String>,
}

#[tracing::instrument(skip_all, fields(root = %layout.root().display()))]
pub fn list_versions(layout: &InstallLayout, toolchain: &dyn Toolchain) -> AppResult<LocalVersions> {
    let active = probe(toolchain, layout.active_dir())
        .ok()
        .filter(ProbedVersion::is_known);

    tracing::debug!("Scanning install root for archived trees");
    let entries = match fs::read_dir(layout.root()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(LocalVersions {
                active,
                archived: Vec::new(),
            });
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", layout.root().display()));
        }
    };

    let mut archived = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(version) = name.to_str().and_then(|n| layout.archived_version(n)) {
            tracing::trace!(%version, path = %entry.path().display(), "Found archived tree");
            archived.push(version.to_string());
        }
    }
    archived.sort_by_key(|version| version_key(version));

    Ok(LocalVersions { active, archived })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_fake_tree;
    use crate::toolchain::go::Go;
    use tempfile::tempdir;

    #[test]
    fn test_list_sorts_archived_versions_numerically() -> anyhow::Result<()> {
        let root = tempdir()?;
        for name in ["go-1.9.7", "go-1.21.5", "go-1.10.0", "gopls", "go-"] {
            fs::create_dir_all(root.path().join(name))?;
        }
        fs::write(root.path().join("go-1.8.0"), "not a directory")?;

        let layout = InstallLayout::new(root.path().to_path_buf(), &Go);
        let versions = list_versions(&layout, &Go)?;

        assert_eq!(versions.active, None);
        assert_eq!(versions.archived, vec!["1.9.7", "1.10.0", "1.21.5"]);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_list_reports_active_version() -> anyhow::Result<()> {
        let root = tempdir()?;
        let layout = InstallLayout::new(root.path().to_path_buf(), &Go);
        write_fake_tree(layout.active_dir(), "1.22.0")?;

        let versions = list_versions(&layout, &Go)?;
        assert_eq!(versions.active.map(|p| p.version).as_deref(), Some("1.22.0"));
        assert!(versions.archived.is_empty());
        Ok(())
    }

    #[test]
    fn test_list_of_missing_root_is_empty() -> anyhow::Result<()> {
        let root = tempdir()?;
        let layout = InstallLayout::new(root.path().join("nowhere"), &Go);
        let versions = list_versions(&layout, &Go)?;
        assert_eq!(
            versions,
            LocalVersions {
                active: None,
                archived: Vec::new()
            }
        );
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_status_of_installed_tree() -> anyhow::Result<()> {
        let root = tempdir()?;
        let layout = InstallLayout::new(root.path().to_path_buf(), &Go);
        write_fake_tree(layout.active_dir(), "1.21.5")?;

        let report = collect_status(&layout, &Go)?;

        assert!(report.exists);
        assert!(report.writable);
        assert_eq!(report.kind, InstallKind::Custom);
        assert_eq!(report.probed?.version, "1.21.5");
        assert_eq!(report.environment.root, layout.active_dir());
        Ok(())
    }

    #[test]
    fn test_status_of_empty_root() -> anyhow::Result<()> {
        let root = tempdir()?;
        let layout = InstallLayout::new(root.path().to_path_buf(), &Go);

        let report = collect_status(&layout, &Go)?;

        assert!(!report.exists);
        assert!(!report.writable);
        assert!(!report.on_path);
        assert!(matches!(report.probed, Err(ProbeError::NotInstalled { .. })));
        Ok(())
    }

    #[test]
    fn test_same_file_resolves_paths() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("go");
        fs::write(&file, "")?;
        assert!(same_file(&file, &dir.path().join(".").join("go")));
        assert!(!same_file(&file, &dir.path().join("missing")));
        Ok(())
    }
}
