//! Blocked command - inspect and edit the command blocklist.

use shellgate_policy::CommandGate;

use crate::theme::Theme;

/// Print the blocklist.
pub(crate) fn list(commands: &CommandGate) -> anyhow::Result<()> {
    let blocked = commands.list_blocked();
    if blocked.is_empty() {
        println!("{}", Theme::info("No commands are blocked"));
        return Ok(());
    }

    println!("\n{}", Theme::header("Blocked Commands"));
    println!("{}", Theme::separator());
    for command in blocked {
        println!("  {command}");
    }
    println!();
    Ok(())
}

/// Block a command.
pub(crate) fn add(commands: &CommandGate, command: &str) -> anyhow::Result<()> {
    if commands.block(command)?.is_changed() {
        println!("{}", Theme::success(&format!("Blocked {command}")));
    } else {
        println!("{}", Theme::info(&format!("{command} was already blocked")));
    }
    Ok(())
}

/// Unblock a command.
pub(crate) fn remove(commands: &CommandGate, command: &str) -> anyhow::Result<()> {
    if commands.unblock(command)?.is_changed() {
        println!("{}", Theme::success(&format!("Unblocked {command}")));
    } else {
        println!("{}", Theme::info(&format!("{command} was not blocked")));
    }
    Ok(())
}
