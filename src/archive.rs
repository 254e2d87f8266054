use crate::error::ExtractError;
use flate2::read::GzDecoder;
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt, symlink};

/// Counts of what an extraction put on disk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub directories: usize,
    pub files: usize,
    pub symlinks: usize,
}

impl ExtractSummary {
    pub fn total(&self) -> usize {
        self.directories + self.files + self.symlinks
    }
}

/// Streams a `.tar.gz` archive into `dest_dir`.
///
/// When `strip_root` names the archive's top-level folder, that leading
/// component is dropped so the contents land directly in `dest_dir`. Entries
/// that would resolve outside `dest_dir` are rejected. Nothing is rolled back
/// on failure: whatever was written before the error stays on disk.
#[tracing::instrument(skip_all, fields(archive = %archive_path.display(), dest = %dest_dir.display(), strip_root = ?strip_root))]
pub fn extract_tar_gz(
    archive_path: &Path,
    dest_dir: &Path,
    strip_root: Option<&str>,
) -> Result<ExtractSummary, ExtractError> {
    let corrupt = |reason: String| ExtractError::CorruptArchive {
        archive: archive_path.to_path_buf(),
        reason,
    };

    let file = File::open(archive_path).map_err(|source| ExtractError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    fs::create_dir_all(dest_dir).map_err(io_error(dest_dir))?;

    let mut archive = Archive::new(GzDecoder::new(file));
    let mut summary = ExtractSummary::default();

    for entry_result in archive.entries().map_err(|e| corrupt(e.to_string()))? {
        let mut entry = entry_result.map_err(|e| corrupt(e.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|e| corrupt(e.to_string()))?
            .into_owned();
        let entry_type = entry.header().entry_type();

        if entry_type == EntryType::XGlobalHeader {
            tracing::trace!(entry_path = %entry_path.display(), "Skipping pax global header");
            continue;
        }

        let relative = relative_destination(&entry_path, strip_root)?;
        reject_symlinked_components(dest_dir, &relative, &entry_path)?;
        let outpath = dest_dir.join(&relative);
        let mode = entry.header().mode().map_err(|e| corrupt(e.to_string()))? & 0o7777;
        tracing::trace!(entry_path = %entry_path.display(), ?entry_type, "Unpacking archive entry");

        match entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&outpath).map_err(io_error(&outpath))?;
                set_mode(&outpath, mode)?;
                summary.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                let expected = entry.header().size().map_err(|e| corrupt(e.to_string()))?;
                if let Some(parent) = outpath.parent() {
                    fs::create_dir_all(parent).map_err(io_error(parent))?;
                }
                let written = write_entry(&mut entry, &outpath, mode)
                    .map_err(|e| e.into_extract_error(archive_path, &outpath))?;
                if written != expected {
                    return Err(corrupt(format!(
                        "'{}' is truncated: expected {} bytes, got {}",
                        entry_path.display(),
                        expected,
                        written
                    )));
                }
                set_mode(&outpath, mode)?;
                summary.files += 1;
            }
            EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .map_err(|e| corrupt(e.to_string()))?
                    .ok_or_else(|| {
                        corrupt(format!("symlink '{}' has no target", entry_path.display()))
                    })?
                    .into_owned();
                if let Some(parent) = outpath.parent() {
                    fs::create_dir_all(parent).map_err(io_error(parent))?;
                }
                create_symlink(&target, &outpath)?;
                summary.symlinks += 1;
            }
            other => {
                return Err(ExtractError::UnsupportedEntryType {
                    entry: entry_path,
                    entry_type: format!("{other:?}"),
                });
            }
        }
    }

    if summary.total() == 0 {
        return Err(corrupt("the archive contains no entries".to_string()));
    }

    tracing::debug!(
        directories = summary.directories,
        files = summary.files,
        symlinks = summary.symlinks,
        "Archive extracted"
    );
    Ok(summary)
}

/// Maps an archive entry name onto a path relative to the destination.
fn relative_destination(entry_path: &Path, strip_root: Option<&str>) -> Result<PathBuf, ExtractError> {
    let mut parts: Vec<&OsStr> = Vec::new();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafePath {
                    entry: entry_path.to_path_buf(),
                });
            }
        }
    }

    if let Some(root) = strip_root {
        if parts.first().is_some_and(|first| *first == OsStr::new(root)) {
            parts.remove(0);
        }
    }

    Ok(parts.into_iter().collect())
}

/// Refuses to write through a symlink that an earlier entry created.
fn reject_symlinked_components(
    dest_dir: &Path,
    relative: &Path,
    entry_path: &Path,
) -> Result<(), ExtractError> {
    let mut current = dest_dir.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                return Err(ExtractError::UnsafePath {
                    entry: entry_path.to_path_buf(),
                });
            }
            Ok(_) => {}
            // Nothing exists from here on down.
            Err(_) => break,
        }
    }
    Ok(())
}

enum WriteFailure {
    Read(io::Error),
    Write(io::Error),
}

impl WriteFailure {
    fn into_extract_error(self, archive: &Path, outpath: &Path) -> ExtractError {
        match self {
            WriteFailure::Read(e) => ExtractError::CorruptArchive {
                archive: archive.to_path_buf(),
                reason: format!("failed to read '{}': {}", outpath.display(), e),
            },
            WriteFailure::Write(source) => ExtractError::Io {
                path: outpath.to_path_buf(),
                source,
            },
        }
    }
}

/// Copies one entry's bytes into `outpath`, returning how many were written.
fn write_entry<R: Read>(reader: &mut R, outpath: &Path, mode: u32) -> Result<u64, WriteFailure> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    let mut outfile = options.open(outpath).map_err(WriteFailure::Write)?;
    let mut buffer = [0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        let bytes_read = reader.read(&mut buffer).map_err(WriteFailure::Read)?;
        if bytes_read == 0 {
            break;
        }
        outfile
            .write_all(&buffer[..bytes_read])
            .map_err(WriteFailure::Write)?;
        written += bytes_read as u64;
    }
    outfile.flush().map_err(WriteFailure::Write)?;
    Ok(written)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), ExtractError> {
    // Applied explicitly so the umask doesn't mask the archived bits.
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(io_error(path))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), ExtractError> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> Result<(), ExtractError> {
    symlink(target, link).map_err(|source| ExtractError::SymlinkUnsupported {
        link: link.to_path_buf(),
        target: target.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn create_symlink(target: &Path, link: &Path) -> Result<(), ExtractError> {
    Err(ExtractError::SymlinkUnsupported {
        link: link.to_path_buf(),
        target: target.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Unsupported, "symlinks are not supported here"),
    })
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ExtractError + '_ {
    move |source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}
