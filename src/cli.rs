use crate::paths::TargetSelector;
use clap::{Args, Parser, Subcommand};

/// Installs, updates, and switches between Go toolchain releases.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging. Use -v for info, -vv for debug, -vvv for trace.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install a release, switching to it if another version is active.
    Install {
        /// Version to install, e.g. 1.22.0. Defaults to the latest release.
        #[arg(long, value_parser = parse_version)]
        version: Option<String>,

        /// Reinstall even if the version is already active.
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show the state of the active installation.
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List the active and archived versions on disk.
    List {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print the latest published version.
    Latest,
    /// Install the latest release.
    Update {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Make an installed or downloadable version the active one.
    Switch {
        #[arg(value_parser = parse_version)]
        version: String,

        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Install under /usr/local (the default).
    #[arg(long, conflicts_with_all = ["user", "custom_path"])]
    pub global: bool,

    /// Install under your home directory.
    #[arg(long, conflicts_with = "custom_path")]
    pub user: bool,

    /// Install under this directory.
    #[arg(long, value_name = "PATH")]
    pub custom_path: Option<String>,
}

impl TargetArgs {
    pub fn selector(&self) -> TargetSelector {
        if let Some(path) = &self.custom_path {
            TargetSelector::Explicit(path.clone())
        } else if self.user {
            TargetSelector::User
        } else {
            TargetSelector::System
        }
    }
}

/// Accepts `1.22.0`, `go1.22.0`, or `v1.22.0`.
fn parse_version(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let version = trimmed
        .strip_prefix("go")
        .or_else(|| trimmed.strip_prefix('v'))
        .unwrap_or(trimmed);
    let parts: Vec<&str> = version.split('.').collect();
    let valid = parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if valid {
        Ok(version.to_string())
    } else {
        Err(format!("'{raw}' is not a MAJOR.MINOR.PATCH version"))
    }
}
