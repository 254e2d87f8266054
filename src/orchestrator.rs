use crate::archive::extract_tar_gz;
use crate::config::InstallContext;
use crate::download::{download_archive, spinner_style};
use crate::error::{AppResult, ExtractError, UserError};
use crate::probe::{ProbedVersion, dir_not_empty, probe};
use crate::switch::{SwitchEngine, SwitchOutcome, clear_empty_slot};
use anyhow::Context;
use console::style;
use indicatif::ProgressBar;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// What currently occupies the active slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveState {
    Empty,
    Present(ProbedVersion),
    /// Non-empty, but nothing in it reports a version we recognize.
    Unrecognized,
}

pub fn inspect_active(ctx: &InstallContext) -> ActiveState {
    let active = ctx.layout.active_dir();
    if !dir_not_empty(active) {
        tracing::debug!(path = %active.display(), "Active slot is empty");
        return ActiveState::Empty;
    }
    match probe(ctx.toolchain.as_ref(), active) {
        Ok(probed) if probed.is_known() => {
            tracing::debug!(version = %probed.version, platform = %probed.platform, "Found active version");
            ActiveState::Present(probed)
        }
        Ok(_) => {
            tracing::debug!(path = %active.display(), "Active tree reports an unrecognized version");
            ActiveState::Unrecognized
        }
        Err(e) => {
            tracing::debug!(path = %active.display(), error = %e, "Active tree could not be probed");
            ActiveState::Unrecognized
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPlan {
    FreshInstall,
    AlreadyInstalled,
    Reinstall,
    SwitchCached,
    InstallThenSwitch,
    ReplaceUnrecognized,
    RefuseUnrecognized,
}

impl InstallPlan {
    pub fn needs_download(self) -> bool {
        matches!(
            self,
            Self::FreshInstall | Self::Reinstall | Self::InstallThenSwitch | Self::ReplaceUnrecognized
        )
    }
}

/// Decides what to do from the active slot, the requested version, and whether
/// an archived tree for it is already on disk.
pub fn plan_install(state: &ActiveState, requested: &str, cached: bool, force: bool) -> InstallPlan {
    match state {
        ActiveState::Empty => InstallPlan::FreshInstall,
        ActiveState::Present(active) if active.is_version(requested) => {
            if force {
                InstallPlan::Reinstall
            } else {
                InstallPlan::AlreadyInstalled
            }
        }
        ActiveState::Present(_) if cached => InstallPlan::SwitchCached,
        ActiveState::Present(_) => InstallPlan::InstallThenSwitch,
        ActiveState::Unrecognized if force => InstallPlan::ReplaceUnrecognized,
        ActiveState::Unrecognized => InstallPlan::RefuseUnrecognized,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallRequest {
    /// `None` installs the latest published version.
    pub version: Option<String>,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    AlreadyInstalled { version: String },
    Installed { version: String },
    Reinstalled { version: String, backup: PathBuf },
    Switched(SwitchOutcome),
}

#[tracing::instrument(skip(ctx, pb), fields(root = %ctx.layout.root().display()))]
pub async fn install(
    ctx: &InstallContext,
    request: &InstallRequest,
    pb: &ProgressBar,
) -> AppResult<InstallOutcome> {
    let version = match &request.version {
        Some(version) => version.clone(),
        None => ctx.catalog.resolve(None).await?,
    };

    let state = inspect_active(ctx);
    let cached = ctx.layout.archived_dir(&version).is_dir();
    let plan = plan_install(&state, &version, cached, request.force);
    tracing::info!(%version, ?plan, cached, "Planned installation");

    if plan.needs_download() && request.version.is_some() {
        ctx.catalog.resolve(Some(&version)).await?;
    }

    let active = ctx.layout.active_dir();
    let engine = SwitchEngine::new(ctx);
    match plan {
        InstallPlan::RefuseUnrecognized => Err(UserError::ActiveTreeUnrecognized {
            path: active.to_path_buf(),
        }
        .into()),
        InstallPlan::AlreadyInstalled => Ok(InstallOutcome::AlreadyInstalled { version }),
        InstallPlan::FreshInstall => {
            let staged = stage_version(ctx, &version, pb).await?;
            clear_empty_slot(active)?;
            promote_staged(&engine, staged, active)?;
            Ok(InstallOutcome::Installed { version })
        }
        InstallPlan::ReplaceUnrecognized => {
            let staged = stage_version(ctx, &version, pb).await?;
            tracing::warn!(path = %active.display(), "Replacing unrecognized active tree");
            remove_path(active)?;
            promote_staged(&engine, staged, active)?;
            Ok(InstallOutcome::Installed { version })
        }
        InstallPlan::Reinstall => {
            let staged = stage_version(ctx, &version, pb).await?;
            let backup = engine.backup_active(&version)?;
            promote_staged(&engine, staged, active)?;
            Ok(InstallOutcome::Reinstalled { version, backup })
        }
        InstallPlan::SwitchCached => Ok(InstallOutcome::Switched(
            engine.promote(&state, &version, false)?,
        )),
        InstallPlan::InstallThenSwitch => {
            install_into(ctx, &version, &ctx.layout.archived_dir(&version), pb).await?;
            Ok(InstallOutcome::Switched(engine.promote(&state, &version, true)?))
        }
    }
}

/// Installs the latest published version.
pub async fn update(ctx: &InstallContext, pb: &ProgressBar) -> AppResult<InstallOutcome> {
    install(ctx, &InstallRequest::default(), pb).await
}

/// Downloads `version` and extracts it to `dest`, which must not exist yet.
pub async fn install_into(
    ctx: &InstallContext,
    version: &str,
    dest: &Path,
    pb: &ProgressBar,
) -> AppResult<()> {
    let staged = stage_version(ctx, version, pb).await?;
    promote_staged(&SwitchEngine::new(ctx), staged, dest)
}

/// Downloads `version` and extracts it into a fresh staging directory inside the
/// install root. The staging directory is removed if it is dropped unpromoted.
async fn stage_version(ctx: &InstallContext, version: &str, pb: &ProgressBar) -> AppResult<TempDir> {
    let file_name = ctx.catalog.archive_file_name(version);
    let artifact = download_archive(
        ctx.catalog.client(),
        &ctx.catalog.archive_url(version),
        &file_name,
        &ctx.scratch_dir,
        pb,
    )
    .await?;

    let root = ctx.layout.root();
    let staging = tempfile::Builder::new()
        .prefix(ctx.layout.staging_prefix())
        .tempdir_in(root)
        .with_context(|| format!("Failed to create staging directory in {}", root.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staging.path(), fs::Permissions::from_mode(0o755)).with_context(|| {
            format!("Failed to set permissions on {}", staging.path().display())
        })?;
    }

    pb.set_style(spinner_style()?);
    pb.set_message(format!("Extracting {}...", style(&file_name).bold()));
    // The blocking task owns both temp dirs, so an interrupted command still
    // removes them once extraction stops.
    let archive_root = ctx.toolchain.archive_root();
    let (staging, summary) = tokio::task::spawn_blocking(move || {
        let summary = extract_tar_gz(artifact.path(), staging.path(), Some(archive_root))?;
        drop(artifact);
        Ok::<_, ExtractError>((staging, summary))
    })
    .await
    .context("Task for extracting the release archive panicked")??;
    tracing::info!(
        %version,
        directories = summary.directories,
        files = summary.files,
        symlinks = summary.symlinks,
        "Extracted release archive"
    );
    Ok(staging)
}

fn promote_staged(engine: &SwitchEngine<'_>, staged: TempDir, dest: &Path) -> AppResult<()> {
    engine.rename_dir(staged.path(), dest)?;
    let kept = staged.keep();
    tracing::debug!(from = %kept.display(), to = %dest.display(), "Promoted staged tree");
    Ok(())
}

fn remove_path(path: &Path) -> AppResult<()> {
    let metadata = fs::symlink_metadata(path)
        .with_context(|| format!("Failed to inspect {}", path.display()))?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
    .with_context(|| format!("Failed to remove {}", path.display()))
}
