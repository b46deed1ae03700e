use super::{finish, unexpected, Context};
use anyhow::Result;
use colored::Colorize;
use gitlite_server::{TaskEventKind, TaskOutput};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

pub async fn run(ctx: &Context, root: Option<PathBuf>, exclude: Vec<String>) -> Result<()> {
    let (orchestrator, mut events) = ctx.open()?;
    let exclude = if exclude.is_empty() { None } else { Some(exclude) };

    let handle = orchestrator.add_all(root, exclude);
    let task_id = handle.id();

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );

    let progress_bar = bar.clone();
    let progress = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if event.task_id != task_id {
                continue;
            }
            match event.kind {
                TaskEventKind::Progress { message, percent } => {
                    progress_bar.set_position(u64::from(percent));
                    progress_bar.set_message(message);
                }
                _ => break,
            }
        }
    });

    let token = handle.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let result = finish(handle).await;
    interrupt.abort();
    let _ = progress.await;
    bar.finish_and_clear();

    let output = result?;
    let TaskOutput::StagedAll(report) = output else {
        return Err(unexpected(output));
    };

    if report.cancelled {
        println!("{}", "Cancelled; files staged so far are kept".yellow().bold());
    }
    println!("  {}: {}", "Processed".bold(), report.processed);
    println!(
        "  {}: {}",
        "Added".bold(),
        report.added_count().to_string().green()
    );
    println!("  {}: {}", "Already staged".bold(), report.already_staged);
    if !report.skipped.is_empty() {
        println!(
            "  {}: {}",
            "Skipped".bold(),
            report.skipped_count().to_string().red()
        );
        for path in &report.skipped {
            println!("    {} {}", "!".red(), path);
        }
    }

    Ok(())
}
