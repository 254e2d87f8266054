mod archive;
mod catalog;
mod cli;
mod config;
mod download;
mod error;
mod lock;
mod orchestrator;
mod paths;
mod probe;
mod status;
mod switch;
#[cfg(test)]
mod test_support;
mod toolchain;

use crate::{
    catalog::{Catalog, build_client},
    cli::{Cli, Command, TargetArgs},
    config::{InstallContext, InstallLayout, ToolchainEnvironment},
    download::spinner_style,
    error::AppResult,
    lock::{InstallLock, LOCK_TIMEOUT},
    orchestrator::{InstallOutcome, InstallRequest},
    paths::{check_install_root, is_writable, resolve_root},
    status::{StatusReport, collect_status, list_versions},
    switch::{SwitchEngine, SwitchOutcome},
    toolchain::{Toolchain, detect_platform, go::Go},
};
use anyhow::Context;
use clap::Parser;
use console::{StyledObject, style};
use indicatif::{ProgressBar, ProgressDrawTarget};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Must return rather than exit: dropping the runtime waits for an
    // interrupted extraction to remove its staging directory.
    if let Err(e) = run().await {
        eprintln!("\n{} {:#}", style("Error:").red().bold(), e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run() -> AppResult<()> {
    let cli = Cli::parse();

    // Conditionally initialize the tracing subscriber based on the verbose flag.
    if cli.verbose > 0 {
        let filter = match cli.verbose {
            1 => "info",
            2 => "info,govm=debug",
            3 => "debug,govm=trace",
            _ => "trace",
        };
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_ansi(console::user_attended())
            .with_writer(std::io::stderr)
            .init();
    }

    // Dropping the command future on Ctrl-C removes any scratch download and staging directory.
    tokio::select! {
        result = dispatch(cli.command) => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            anyhow::bail!("Interrupted; partial downloads and extractions were removed")
        }
    }
}

async fn dispatch(command: Command) -> AppResult<()> {
    match command {
        Command::Latest => {
            let catalog = build_catalog()?;
            println!("{}", catalog.latest().await?);
        }
        Command::Status { target } => {
            let layout = InstallLayout::new(resolve_root(&target.selector())?, &Go);
            let report = collect_status(&layout, &Go)?;
            print_status(&layout, &report);
        }
        Command::List { target } => {
            let layout = InstallLayout::new(resolve_root(&target.selector())?, &Go);
            let versions = list_versions(&layout, &Go)?;
            match &versions.active {
                Some(active) => println!(
                    "{} {} ({})",
                    style("*").green().bold(),
                    style(&active.version).bold(),
                    active.platform
                ),
                None => println!("{}", style("No active version").dim()),
            }
            for version in &versions.archived {
                println!("  {version}");
            }
        }
        Command::Install {
            version,
            force,
            target,
        } => {
            let (ctx, _lock) = prepare(&target).await?;
            let pb = progress_bar()?;
            let outcome = orchestrator::install(&ctx, &InstallRequest { version, force }, &pb).await;
            pb.finish_and_clear();
            report_install(&ctx, outcome?)?;
        }
        Command::Update { target } => {
            let (ctx, _lock) = prepare(&target).await?;
            let pb = progress_bar()?;
            let outcome = orchestrator::update(&ctx, &pb).await;
            pb.finish_and_clear();
            report_install(&ctx, outcome?)?;
        }
        Command::Switch { version, target } => {
            let (ctx, _lock) = prepare(&target).await?;
            let pb = progress_bar()?;
            let outcome = SwitchEngine::new(&ctx).switch_to(&version, &pb).await;
            pb.finish_and_clear();
            report_switch(&ctx, outcome?)?;
        }
    }
    Ok(())
}

fn build_catalog() -> AppResult<Catalog> {
    let platform = detect_platform(&Go)?;
    Ok(Catalog::new(build_client()?, Arc::new(Go), Go.listing_url(), platform))
}

/// Resolves and checks the install root, then takes the install lock for the
/// rest of the command.
async fn prepare(target: &TargetArgs) -> AppResult<(InstallContext, InstallLock)> {
    let root = resolve_root(&target.selector())?;
    check_install_root(&root)?;
    let scratch_dir = env::temp_dir();
    if !is_writable(&scratch_dir) {
        anyhow::bail!("No write permission in temp directory: {}", scratch_dir.display());
    }
    println!(
        "{} Install path is set to {}",
        style("✓").green(),
        style(root.display()).cyan()
    );

    let catalog = build_catalog()?;
    tracing::debug!(platform = catalog.platform(), "Using release catalog");
    let ctx = InstallContext::new(root, catalog, scratch_dir);
    let lock = InstallLock::acquire(&ctx.layout.lock_file(), LOCK_TIMEOUT).await?;
    Ok((ctx, lock))
}

fn progress_bar() -> AppResult<ProgressBar> {
    let draw_target = if console::user_attended() {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let pb = ProgressBar::with_draw_target(None, draw_target);
    pb.set_style(spinner_style()?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Checking installed version...");
    Ok(pb)
}

fn report_install(ctx: &InstallContext, outcome: InstallOutcome) -> AppResult<()> {
    match outcome {
        InstallOutcome::AlreadyInstalled { version } => {
            println!(
                "{} Go {} is already installed and active.",
                style("✓").green(),
                style(version).bold()
            );
            Ok(())
        }
        InstallOutcome::Installed { version } => {
            println!("{} Installed Go {}.", style("✓").green(), style(version).bold());
            apply_environment(ctx)
        }
        InstallOutcome::Reinstalled { version, backup } => {
            println!(
                "{} Reinstalled Go {} (previous tree kept at {}).",
                style("✓").green(),
                style(version).bold(),
                backup.display()
            );
            apply_environment(ctx)
        }
        InstallOutcome::Switched(switched) => report_switch(ctx, switched),
    }
}

fn report_switch(ctx: &InstallContext, outcome: SwitchOutcome) -> AppResult<()> {
    match outcome {
        SwitchOutcome::AlreadyActive { version } => {
            println!(
                "{} Already using Go {}.",
                style("✓").green(),
                style(version).bold()
            );
            Ok(())
        }
        SwitchOutcome::Switched {
            from,
            to,
            backup,
            downloaded,
        } => {
            if downloaded {
                println!("{} Downloaded Go {}.", style("✓").green(), style(&to).bold());
            }
            if let (Some(from), Some(backup)) = (from, backup) {
                println!(
                    "{} Backed up Go {} to {}.",
                    style("✓").green(),
                    from,
                    backup.display()
                );
            }
            println!("{} Switched to Go {}.", style("✓").green(), style(to).bold());
            apply_environment(ctx)
        }
    }
}

fn apply_environment(ctx: &InstallContext) -> AppResult<()> {
    let environment = ToolchainEnvironment::expected(ctx.toolchain.as_ref(), &ctx.layout)?;
    environment.apply();
    println!("Environment variables set for this session:");
    println!("  {}={}", environment.root_var, environment.root.display());
    println!("  {}={}", environment.workspace_var, environment.workspace.display());
    Ok(())
}

fn mark(ok: bool) -> StyledObject<&'static str> {
    if ok { style("✓").green() } else { style("✗").red() }
}

fn print_status(layout: &InstallLayout, report: &StatusReport) {
    println!(
        "Go installation at {}",
        style(layout.active_dir().display()).cyan()
    );
    println!("  {} Installed", mark(report.exists));
    match &report.probed {
        Ok(probed) => println!(
            "  {} Version: {} ({})",
            mark(probed.is_known()),
            probed.version,
            probed.platform
        ),
        Err(e) => println!("  {} Version: {}", mark(false), e),
    }
    println!("  {} Writable", mark(report.writable));
    println!("  {} Install type: {}", style("•").dim(), report.kind);
    let environment = &report.environment;
    println!(
        "  {} {} set to {}",
        mark(report.root_var_ok),
        environment.root_var,
        environment.root.display()
    );
    println!(
        "  {} {} set to {}",
        mark(report.workspace_var_ok),
        environment.workspace_var,
        environment.workspace.display()
    );
    println!("  {} {} in PATH", mark(report.on_path), Go.executable());
}
