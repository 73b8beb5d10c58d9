//! Call command - run one tool and print the result.

use serde_json::Value;

use shellgate_tools::{ToolContext, ToolRegistry};

/// Run `tool` with `arguments` (a JSON object).
pub(crate) async fn run(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    tool: &str,
    arguments: &str,
    json: bool,
) -> anyhow::Result<()> {
    let args: Value = serde_json::from_str(arguments)
        .map_err(|e| anyhow::anyhow!("arguments must be a JSON object: {e}"))?;
    let result = registry.call(tool, args, ctx).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !result.is_error {
        println!("{}", result.text_content());
    }

    if result.is_error {
        anyhow::bail!("{}", result.text_content());
    }
    Ok(())
}
