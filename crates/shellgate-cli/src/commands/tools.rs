//! Tools command - list tool definitions.

use shellgate_tools::ToolRegistry;

use crate::theme::Theme;

/// Print every tool's name and description, or the full definitions as JSON.
pub(crate) fn run(registry: &ToolRegistry, json: bool) -> anyhow::Result<()> {
    let defs = registry.all_definitions();
    if json {
        println!("{}", serde_json::to_string_pretty(&defs)?);
        return Ok(());
    }

    println!("\n{}", Theme::header("Tools"));
    println!("{}", Theme::separator());
    for def in defs {
        println!("  {:<26} {}", def.name, Theme::dimmed(def.description));
    }
    println!();
    Ok(())
}
