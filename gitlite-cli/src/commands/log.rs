use super::{finish, unexpected, Context};
use anyhow::Result;
use colored::Colorize;
use gitlite_core::models::format_timestamp;
use gitlite_server::TaskOutput;

pub async fn run(ctx: &Context, limit: Option<usize>) -> Result<()> {
    let (orchestrator, _) = ctx.open()?;

    let output = finish(orchestrator.log()).await?;
    let TaskOutput::Log(commits) = output else {
        return Err(unexpected(output));
    };

    if commits.is_empty() {
        println!("{}", "No commits yet".yellow());
        return Ok(());
    }

    println!("{}", "Commit History".bold().cyan());
    println!();

    let to_show = limit.unwrap_or(commits.len()).min(commits.len());

    for commit in commits.iter().take(to_show) {
        println!("{} {}", "commit".yellow().bold(), commit.id().yellow());
        println!("{}: {}", "Author".bold(), commit.author());
        println!("{}: {}", "Date".bold(), format_timestamp(&commit.timestamp()));
        println!();
        println!("    {}", commit.message());
        println!("    {}", commit.summary().dimmed());
        println!();
        println!("    {} file(s)", commit.file_count().to_string().cyan());

        for path in commit.files().iter().take(5) {
            println!("      • {}", path.dimmed());
        }
        if commit.file_count() > 5 {
            println!(
                "      {} and {} more...",
                "...".dimmed(),
                (commit.file_count() - 5).to_string().dimmed()
            );
        }

        println!();
    }

    if commits.len() > to_show {
        println!(
            "{}",
            format!("... and {} more commits", commits.len() - to_show).dimmed()
        );
        println!("Use {} to see more", "--limit N".cyan());
    }

    Ok(())
}
