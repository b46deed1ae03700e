use super::{finish, unexpected, Context};
use anyhow::Result;
use colored::Colorize;
use gitlite_core::CommitDiff;
use gitlite_server::TaskOutput;

pub async fn run(ctx: &Context, from: String, to: String, detailed: bool, unified: bool) -> Result<()> {
    let (orchestrator, _) = ctx.open()?;

    if unified {
        let output = finish(orchestrator.unified_diff(from, to)).await?;
        let TaskOutput::Patch(patch) = output else {
            return Err(unexpected(output));
        };
        print_patch(&patch);
        return Ok(());
    }

    let output = finish(orchestrator.diff(from, to, detailed)).await?;
    let TaskOutput::Diff(diff) = output else {
        return Err(unexpected(output));
    };
    print_diff(&diff);

    Ok(())
}

fn print_diff(diff: &CommitDiff) {
    println!(
        "{}",
        format!("Diff {}..{}", diff.from, diff.to).bold().cyan()
    );
    println!(
        "  {} added, {} removed, {} common",
        diff.added.len().to_string().green(),
        diff.removed.len().to_string().red(),
        diff.common.len()
    );

    if diff.is_empty() {
        println!();
        println!("{}", "No differences".green());
    }

    if !diff.added.is_empty() {
        println!();
        println!("{}", "Added files:".bold());
        for path in &diff.added {
            println!("  {} {}", "+".green(), path);
        }
    }
    if !diff.removed.is_empty() {
        println!();
        println!("{}", "Removed files:".bold());
        for path in &diff.removed {
            println!("  {} {}", "-".red(), path);
        }
    }
    if !diff.common.is_empty() {
        println!();
        println!("{}", "Common files:".bold());
        for path in &diff.common {
            println!("    {}", path.dimmed());
        }
    }

    for file in &diff.files {
        println!();
        println!("{}", "━".repeat(80).bright_black());
        println!("{} {}", "MOD".yellow(), file.path.white().bold());
        if file.binary {
            println!("  {}", "[binary content differs]".dimmed());
            continue;
        }
        for line in &file.removed_lines {
            println!("{}", format!("- {}", line).red());
        }
        for line in &file.added_lines {
            println!("{}", format!("+ {}", line).green());
        }
    }
}

fn print_patch(patch: &str) {
    if patch.is_empty() {
        println!("{}", "No differences".green());
        return;
    }

    for line in patch.lines() {
        let styled = if line.starts_with("+++") || line.starts_with("---") {
            line.bold()
        } else if line.starts_with('+') {
            line.green()
        } else if line.starts_with('-') {
            line.red()
        } else if line.starts_with("@@") {
            line.cyan()
        } else {
            line.normal()
        };
        println!("{}", styled);
    }
}
