//! Serve command - the line-delimited tool-call loop.

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use shellgate_tools::{ToolContext, ToolRegistry, ToolResult};

/// One tool call request.
#[derive(Debug, Deserialize)]
struct ToolCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Serve tool calls on stdin/stdout until stdin closes.
pub(crate) async fn run(registry: &ToolRegistry, ctx: &ToolContext) -> anyhow::Result<()> {
    let sweeper = ctx.sessions.spawn_sweeper();
    info!("serving tool calls on stdin");
    ctx.store.events().diagnostic("server started");

    let result = serve(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        registry,
        ctx,
    )
    .await;

    sweeper.abort();
    ctx.store.events().diagnostic("server stopped");
    result
}

/// Answer each request line with one result line, in order.
async fn serve<R, W>(
    input: R,
    mut output: W,
    registry: &ToolRegistry,
    ctx: &ToolContext,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let result = match serde_json::from_str::<ToolCall>(&line) {
            Ok(call) => {
                debug!(tool = %call.name, "tool call");
                registry.call(&call.name, call.arguments, ctx).await
            },
            Err(e) => ToolResult::error(format!("Error: invalid request: {e}")),
        };

        let mut encoded = serde_json::to_vec(&result)?;
        encoded.push(b'\n');
        output.write_all(&encoded).await?;
        output.flush().await?;
    }
    Ok(())
}
