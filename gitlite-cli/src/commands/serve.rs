use super::Context;
use anyhow::Result;
use colored::Colorize;
use gitlite_server::GitliteServer;
use std::net::SocketAddr;

pub async fn run(ctx: &Context, port: u16) -> Result<()> {
    let config = ctx.config(&ctx.repo)?;

    println!("{}", "Starting gitlite server...".bold().cyan());
    println!("   {}: {}", "Repository".bold(), ctx.repo.display());
    if config.database.enabled {
        println!(
            "   {}: {}",
            "Database".bold(),
            config.database_path(&ctx.repo).display()
        );
    } else {
        println!("   {}: {}", "Database".bold(), "disabled".yellow());
    }

    let server = GitliteServer::open(&ctx.repo, config)?;

    println!(
        "   {}: {}",
        "API Server".bold(),
        format!("http://localhost:{}", port).green()
    );
    println!();
    println!("{}", "Press Ctrl+C to stop".dimmed());
    println!();

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    server.serve(addr).await?;

    Ok(())
}
