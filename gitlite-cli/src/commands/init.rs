use super::{finish, unexpected, Context};
use anyhow::Result;
use colored::Colorize;
use gitlite_core::fs_store::Layout;
use gitlite_server::{Orchestrator, TaskOutput};
use std::path::PathBuf;

pub async fn run(ctx: &Context, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| ctx.repo.clone());
    let existed = Layout::new(&path).is_initialized();
    let config = ctx.config(&path)?;

    let (orchestrator, _) = Orchestrator::init(path, config).await?;
    let status = finish(orchestrator.status()).await?;
    let TaskOutput::Status(report) = status else {
        return Err(unexpected(status));
    };

    let verb = if existed { "Reinitialized" } else { "Initialized" };
    println!(
        "{} {} gitlite repository in {}",
        "✓".green().bold(),
        verb,
        report.repository.path.display()
    );
    if report.repository.id.is_none() {
        println!(
            "  {}",
            "Relational store unavailable; running filesystem-only".yellow()
        );
    }

    Ok(())
}
