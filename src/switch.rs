use crate::config::InstallContext;
use crate::error::{AppResult, SwitchError, UserError};
use crate::orchestrator::{ActiveState, inspect_active, install_into};
use anyhow::Context;
use indicatif::ProgressBar;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

type RenameFn<'a> = Box<dyn Fn(&Path, &Path) -> io::Result<()> + 'a>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    AlreadyActive {
        version: String,
    },
    Switched {
        from: Option<String>,
        to: String,
        backup: Option<PathBuf>,
        downloaded: bool,
    },
}

/// Promotes archived trees into the active slot.
pub struct SwitchEngine<'a> {
    ctx: &'a InstallContext,
    rename: RenameFn<'a>,
}

impl<'a> SwitchEngine<'a> {
    pub fn new(ctx: &'a InstallContext) -> Self {
        Self {
            ctx,
            rename: Box::new(|from: &Path, to: &Path| fs::rename(from, to)),
        }
    }

    #[cfg(test)]
    pub fn with_rename(
        ctx: &'a InstallContext,
        rename: impl Fn(&Path, &Path) -> io::Result<()> + 'a,
    ) -> Self {
        Self {
            ctx,
            rename: Box::new(rename),
        }
    }

    /// Makes `version` the active tree, downloading it first if it isn't cached.
    #[tracing::instrument(skip(self, pb), fields(root = %self.ctx.layout.root().display()))]
    pub async fn switch_to(&self, version: &str, pb: &ProgressBar) -> AppResult<SwitchOutcome> {
        let state = inspect_active(self.ctx);
        match &state {
            ActiveState::Present(current) if current.is_version(version) => {
                tracing::info!(%version, "Already using requested version");
                return Ok(SwitchOutcome::AlreadyActive {
                    version: version.to_string(),
                });
            }
            ActiveState::Unrecognized => {
                return Err(UserError::ActiveTreeUnrecognized {
                    path: self.ctx.layout.active_dir().to_path_buf(),
                }
                .into());
            }
            _ => {}
        }

        let archived = self.ctx.layout.archived_dir(version);
        let downloaded = if archived.is_dir() {
            false
        } else {
            tracing::info!(%version, "Version not found locally, downloading");
            self.ctx.catalog.ensure_available(version).await?;
            install_into(self.ctx, version, &archived, pb).await?;
            true
        };

        self.promote(&state, version, downloaded)
    }

    /// Backs up whatever is active, then renames `<root>/<prefix>-<version>` into the active slot.
    pub(crate) fn promote(
        &self,
        state: &ActiveState,
        version: &str,
        downloaded: bool,
    ) -> AppResult<SwitchOutcome> {
        let layout = &self.ctx.layout;
        let (from, backup) = match state {
            ActiveState::Empty => {
                clear_empty_slot(layout.active_dir())?;
                (None, None)
            }
            ActiveState::Present(current) => {
                let backup = self.backup_active(&current.version)?;
                (Some(current.version.clone()), Some(backup))
            }
            ActiveState::Unrecognized => {
                return Err(UserError::ActiveTreeUnrecognized {
                    path: layout.active_dir().to_path_buf(),
                }
                .into());
            }
        };

        self.rename_dir(&layout.archived_dir(version), layout.active_dir())?;
        tracing::info!(from = ?from, to = %version, "Switched active version");

        Ok(SwitchOutcome::Switched {
            from,
            to: version.to_string(),
            backup,
            downloaded,
        })
    }

    /// Moves the active tree to `<root>/<prefix>-<current version>`, replacing an older backup.
    pub(crate) fn backup_active(&self, current_version: &str) -> AppResult<PathBuf> {
        let layout = &self.ctx.layout;
        let backup = layout.archived_dir(current_version);
        if fs::symlink_metadata(&backup).is_ok() {
            tracing::debug!(path = %backup.display(), "Removing previous backup");
            fs::remove_dir_all(&backup)
                .with_context(|| format!("Error removing old backup {}", backup.display()))?;
        }
        self.rename_dir(layout.active_dir(), &backup)?;
        tracing::info!(backup = %backup.display(), "Backed up active version");
        Ok(backup)
    }

    pub(crate) fn rename_dir(&self, from: &Path, to: &Path) -> Result<(), SwitchError> {
        tracing::debug!(from = %from.display(), to = %to.display(), "Renaming directory");
        (self.rename)(from, to).map_err(|source| SwitchError::RenameFailed {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
    }
}

/// Removes the active slot if it is an empty directory so a rename can take its place.
pub(crate) fn clear_empty_slot(active: &Path) -> AppResult<()> {
    if active.is_dir() {
        fs::remove_dir(active)
            .with_context(|| format!("Failed to remove empty directory {}", active.display()))?;
    }
    Ok(())
}
