//! Servers command handler.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::presentation::{print_separator, truncate_string};

/// Show per-server state and tool counts.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let statuses = ctx.manager().statuses().await;

    if statuses.is_empty() {
        println!("No servers configured.");
        return Ok(());
    }

    println!("{:<20} {:<6} State", "Server", "Tools");
    print_separator(80);
    for status in &statuses {
        println!(
            "{:<20} {:<6} {}",
            truncate_string(&status.id, 19),
            status.tool_count,
            status.state
        );
    }

    for skipped in &ctx.startup.skipped {
        println!("skipped {}: {}", skipped.server_id, skipped.message);
    }

    Ok(())
}
