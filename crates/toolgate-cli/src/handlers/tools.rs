//! Tools command handler.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::presentation::{print_separator, truncate_string};

/// List every reachable tool, local built-ins first.
pub fn execute(ctx: &CliContext, json: bool) -> Result<()> {
    let tools = ctx.gateway().tools();

    if json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    if tools.is_empty() {
        println!("No tools available.");
        return Ok(());
    }

    println!("{:<32} {:<22} {:<12} Description", "Name", "Risk", "Owner");
    print_separator(100);
    for listed in &tools {
        println!(
            "{:<32} {:<22} {:<12} {}",
            truncate_string(&listed.tool.name, 31),
            listed.risk.as_str(),
            truncate_string(&listed.tool.owner, 11),
            truncate_string(&listed.tool.description, 40)
        );
    }

    let collisions = ctx.gateway().collisions();
    if !collisions.is_empty() {
        println!();
        for collision in collisions {
            println!(
                "note: '{}' is offered by {} and published as {}",
                collision.name,
                collision.owners.join(", "),
                collision.qualified_names.join(", ")
            );
        }
    }

    Ok(())
}
