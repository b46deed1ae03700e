use super::{finish, unexpected, Context};
use anyhow::{Context as _, Result};
use colored::Colorize;
use dialoguer::Input;
use gitlite_core::models::format_timestamp;
use gitlite_server::TaskOutput;
use std::io::IsTerminal;

pub async fn run(ctx: &Context, message: Option<String>, summary: Option<String>) -> Result<()> {
    let message = match message {
        Some(message) => message,
        None if std::io::stdin().is_terminal() => Input::<String>::new()
            .with_prompt("Commit message")
            .interact_text()
            .context("failed to read commit message")?,
        None => anyhow::bail!("a commit message is required (-m <MESSAGE>)"),
    };

    let (orchestrator, _) = ctx.open()?;

    println!("{}", "Creating commit...".bold());
    let output = finish(orchestrator.commit(message, summary)).await?;
    let TaskOutput::Committed(commit) = output else {
        return Err(unexpected(output));
    };

    println!("{}", "✓ Commit created successfully!".green().bold());
    println!("  {}: {}", "Commit ID".bold(), commit.id().yellow());
    println!("  {}: {}", "Message".bold(), commit.message());
    println!("  {}: {}", "Summary".bold(), commit.summary());
    println!("  {}: {}", "Author".bold(), commit.author());
    println!("  {}: {}", "Date".bold(), format_timestamp(&commit.timestamp()));
    println!("  {}: {}", "Files".bold(), commit.file_count());

    Ok(())
}
