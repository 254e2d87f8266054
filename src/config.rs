use crate::catalog::Catalog;
use crate::error::PolicyError;
use crate::toolchain::Toolchain;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const LOCK_FILE_NAME: &str = ".govm.lock";

/// Where the active and archived trees live under one install root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
    active_dir: PathBuf,
    archived_prefix: String,
    staging_prefix: String,
}

impl InstallLayout {
    pub fn new(root: PathBuf, toolchain: &dyn Toolchain) -> Self {
        let active_dir = root.join(toolchain.active_dir_name());
        Self {
            root,
            active_dir,
            archived_prefix: toolchain.archived_dir_prefix(),
            staging_prefix: format!(".{}-staging-", toolchain.archive_root()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn active_dir(&self) -> &Path {
        &self.active_dir
    }

    pub fn archived_dir(&self, version: &str) -> PathBuf {
        self.root.join(format!("{}{}", self.archived_prefix, version))
    }

    /// Version encoded in an archived directory name, if `name` is one.
    pub fn archived_version<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_prefix(self.archived_prefix.as_str())
            .filter(|version| !version.is_empty())
    }

    pub fn staging_prefix(&self) -> &str {
        &self.staging_prefix
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }
}

/// Everything one command invocation needs, built once in `main` and passed down.
pub struct InstallContext {
    pub layout: InstallLayout,
    pub toolchain: Arc<dyn Toolchain>,
    pub catalog: Catalog,
    /// Where downloaded archives are written before extraction.
    pub scratch_dir: PathBuf,
}

impl InstallContext {
    pub fn new(root: PathBuf, catalog: Catalog, scratch_dir: PathBuf) -> Self {
        let toolchain = catalog.toolchain();
        Self {
            layout: InstallLayout::new(root, toolchain.as_ref()),
            toolchain,
            catalog,
            scratch_dir,
        }
    }
}

/// The variables pointing the shell at the active tree and the user workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainEnvironment {
    pub root_var: &'static str,
    pub root: PathBuf,
    pub workspace_var: &'static str,
    pub workspace: PathBuf,
}

impl ToolchainEnvironment {
    pub fn expected(toolchain: &dyn Toolchain, layout: &InstallLayout) -> Result<Self, PolicyError> {
        let home = dirs::home_dir().ok_or(PolicyError::NoHomeDirectory)?;
        Ok(Self {
            root_var: toolchain.root_env_var(),
            root: layout.active_dir().to_path_buf(),
            workspace_var: toolchain.workspace_env_var(),
            workspace: home.join(toolchain.workspace_dir_name()),
        })
    }

    pub fn root_is_current(&self) -> bool {
        env_matches(self.root_var, &self.root)
    }

    pub fn workspace_is_current(&self) -> bool {
        env_matches(self.workspace_var, &self.workspace)
    }

    /// Sets both variables for this process and its children only.
    pub fn apply(&self) {
        tracing::debug!(
            root_var = self.root_var,
            root = %self.root.display(),
            workspace_var = self.workspace_var,
            workspace = %self.workspace.display(),
            "Applying environment variables"
        );
        // SAFETY: the runtime is single-threaded and all network and filesystem
        // work for this invocation has finished, so nothing reads the
        // environment concurrently.
        unsafe {
            env::set_var(self.root_var, &self.root);
            env::set_var(self.workspace_var, &self.workspace);
        }
    }
}

fn env_matches(name: &str, expected: &Path) -> bool {
    env::var_os(name).is_some_and(|value| Path::new(&value) == expected)
}
