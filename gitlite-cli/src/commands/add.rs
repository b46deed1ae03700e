use super::{finish, unexpected, Context};
use anyhow::Result;
use colored::Colorize;
use gitlite_server::TaskOutput;
use std::path::PathBuf;

pub async fn run(ctx: &Context, paths: Vec<PathBuf>) -> Result<()> {
    let (orchestrator, _) = ctx.open()?;

    let output = finish(orchestrator.add(paths)).await?;
    let TaskOutput::Staged(outcomes) = output else {
        return Err(unexpected(output));
    };

    for outcome in outcomes {
        if outcome.newly_staged {
            println!("{} {}", "staged".green(), outcome.entry.path);
        } else {
            println!("{} {}", "already staged".dimmed(), outcome.entry.path);
        }
    }

    Ok(())
}
