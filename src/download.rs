use crate::error::{AppResult, UserError};
use anyhow::Context;
use console::style;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A downloaded archive in its own scratch directory. Dropping it deletes both.
#[derive(Debug)]
pub struct DownloadArtifact {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl DownloadArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DownloadArtifact {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let dir_path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => tracing::trace!(path = %dir_path.display(), "Removed download scratch directory"),
                Err(e) => tracing::warn!(path = %dir_path.display(), error = %e, "Failed to remove download scratch directory"),
            }
        }
    }
}

pub fn spinner_style() -> AppResult<ProgressStyle> {
    Ok(ProgressStyle::with_template("{spinner:.green} {msg}")?)
}

/// Streams `url` into `<scratch_dir>/<private dir>/<file_name>`, showing progress,
/// and rejects an empty response.
#[tracing::instrument(skip(client, pb, scratch_dir))]
pub async fn download_archive(
    client: &reqwest::Client,
    url: &str,
    file_name: &str,
    scratch_dir: &Path,
    pb: &ProgressBar,
) -> AppResult<DownloadArtifact> {
    let dir = tempfile::Builder::new()
        .prefix("govm-download-")
        .tempdir_in(scratch_dir)
        .with_context(|| format!("No write permission in temp directory: {}", scratch_dir.display()))?;
    let path = dir.path().join(file_name);
    let artifact = DownloadArtifact {
        dir: Some(dir),
        path,
    };

    let download_failed = |source: reqwest::Error| UserError::DownloadFailed {
        url: url.to_string(),
        source,
    };
    let response = client
        .get(url)
        .send()
        .await
        .map_err(download_failed)?
        .error_for_status()
        .map_err(download_failed)?;
    let total_size = response.content_length().unwrap_or(0);

    let download_style = ProgressStyle::with_template(
        "{spinner:.green} {msg}\n{wide_bar:.cyan/blue} {bytes}/{total_bytes} ({eta})",
    )?
    .progress_chars("#>-");
    pb.set_style(download_style);
    pb.set_position(0);
    pb.set_length(total_size);
    pb.set_message(format!("Downloading {}", style(file_name).cyan()));
    tracing::info!(url, path = %artifact.path().display(), "Downloading archive");

    let mut file = File::create(artifact.path())
        .with_context(|| format!("Failed to create {}", artifact.path().display()))?;
    let mut stream = response.bytes_stream();
    while let Some(item) = stream.next().await {
        let chunk = item.map_err(download_failed)?;
        file.write_all(&chunk)
            .with_context(|| format!("Failed to write {}", artifact.path().display()))?;
        pb.inc(chunk.len() as u64);
    }
    file.flush()?;
    drop(file);

    verify_non_empty(artifact.path())?;
    Ok(artifact)
}

/// Fails unless `path` exists and has at least one byte.
pub fn verify_non_empty(path: &Path) -> AppResult<()> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("Error checking downloaded file {}", path.display()))?;
    if metadata.len() == 0 {
        return Err(UserError::EmptyDownload {
            path: path.to_path_buf(),
        }
        .into());
    }
    tracing::debug!(bytes = metadata.len(), "Verified downloaded file");
    Ok(())
}
