use super::{finish, format_size, unexpected, Context};
use anyhow::Result;
use colored::Colorize;
use gitlite_core::models::format_timestamp;
use gitlite_core::StoreMode;
use gitlite_server::TaskOutput;

const MAX_LISTED: usize = 20;

pub async fn run(ctx: &Context) -> Result<()> {
    let (orchestrator, _) = ctx.open()?;

    let output = finish(orchestrator.status()).await?;
    let TaskOutput::Status(report) = output else {
        return Err(unexpected(output));
    };

    println!("{}", "Repository Status".bold().cyan());
    println!("  {}: {}", "Name".bold(), report.repository.name);
    println!("  {}: {}", "Root".bold(), report.repository.path.display());
    println!(
        "  {}: {}",
        "HEAD".bold(),
        report.head.as_deref().unwrap_or("(no commits)").yellow()
    );
    println!("  {}: {}", "Commits".bold(), report.commit_count);
    let mode = match report.store_mode {
        StoreMode::Dual => "filesystem + relational".green(),
        StoreMode::FilesystemOnly => "filesystem only".yellow(),
    };
    println!("  {}: {}", "Store".bold(), mode);
    println!();

    if report.staged.is_empty() {
        println!("{}", "Nothing staged".green());
        println!("Run {} to stage files", "gitlite add <path>".cyan());
        return Ok(());
    }

    println!(
        "{} {}",
        "Staged files:".bold(),
        format!("({})", report.staged.len()).yellow()
    );
    println!();

    for entry in report.staged.iter().take(MAX_LISTED) {
        let marker = if report.modified_since_staged.contains(&entry.path) {
            "~".yellow()
        } else {
            "+".green()
        };
        println!(
            "  {} {} {}",
            marker,
            entry.path,
            format!(
                "({}, {})",
                format_size(entry.size),
                format_timestamp(&entry.last_modified)
            )
            .dimmed()
        );
    }

    if report.staged.len() > MAX_LISTED {
        println!();
        println!(
            "  {} and {} more...",
            "...".dimmed(),
            (report.staged.len() - MAX_LISTED).to_string().yellow()
        );
    }

    if !report.modified_since_staged.is_empty() {
        println!();
        println!(
            "{} changed since staging; run {} again to pick up the changes",
            format!("{} file(s)", report.modified_since_staged.len()).yellow(),
            "gitlite add".cyan()
        );
    }

    println!();
    println!("Run {} to commit these files", "gitlite commit -m \"message\"".cyan());

    Ok(())
}
