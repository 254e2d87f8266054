// /src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// A type alias for `Result<T, anyhow::Error>` to be used throughout the application.
pub type AppResult<T> = anyhow::Result<T>;

/// Errors that are intended to be displayed directly to the user.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Failed to download from '{url}'. Please check your network connection.\n  Reason: {source}")]
    DownloadFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("The downloaded file '{}' is empty.", path.display())]
    EmptyDownload { path: PathBuf },

    #[error("Your platform ({os} {arch}) is not supported for '{name}'.")]
    UnsupportedPlatform {
        name: String,
        os: String,
        arch: String,
    },

    #[error("Requested version {version} is not available. Latest version is {latest}.")]
    VersionNotAvailable { version: String, latest: String },

    #[error("The install path '{}' is not valid or not writable.", path.display())]
    InstallRootNotWritable { path: PathBuf },

    #[error(
        "'{}' contains something that is not a recognizable toolchain. Use --force to replace it.",
        path.display()
    )]
    ActiveTreeUnrecognized { path: PathBuf },

    #[error("Another invocation is modifying '{}'. Try again once it has finished.", path.display())]
    LockHeld { path: PathBuf },
}

/// Failures while materializing a tar+gzip archive on disk.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("The archive '{}' is corrupted or in an unexpected format: {reason}", archive.display())]
    CorruptArchive { archive: PathBuf, reason: String },

    #[error("Unsupported entry type {entry_type} for '{}' in the archive.", entry.display())]
    UnsupportedEntryType { entry: PathBuf, entry_type: String },

    #[error("Could not create symlink '{}' -> '{}'.\n  Reason: {source}", link.display(), target.display())]
    SymlinkUnsupported {
        link: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to extract '{}': it resolves outside the destination directory.", entry.display())]
    UnsafePath { entry: PathBuf },

    #[error("Failed to write '{}'.\n  Reason: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("No executable found at '{}'.", path.display())]
    NotInstalled { path: PathBuf },

    #[error("The external command '{command}' failed to execute.\n  Reason: {reason}")]
    InvocationFailed { command: String, reason: String },
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Could not determine the user's home directory.")]
    NoHomeDirectory,

    #[error("The custom install path must not be empty.")]
    EmptySelector,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to fetch the release listing from '{url}'. Please check your network connection.\n  Reason: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("No {platform} release archive was found in the listing.")]
    NoVersionFound { platform: String },
}

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("Failed to move '{}' to '{}'.\n  Reason: {source}", from.display(), to.display())]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
