//! Dirs command - show the effective allowed directories.

use shellgate_policy::PathGate;

use crate::theme::Theme;

/// Print each allowed directory with its permission level.
pub(crate) fn run(paths: &PathGate) -> anyhow::Result<()> {
    let directories = paths.allowed_directories();

    println!("\n{}", Theme::header("Allowed Directories"));
    println!("{}", Theme::separator());
    for dir in directories {
        println!(
            "  {:<12} {}",
            Theme::permission(dir.permission),
            dir.path.display()
        );
    }
    if let Some(path) = paths.store().path() {
        println!("\n{}", Theme::dimmed(&format!("policy file: {}", path.display())));
    }
    println!();
    Ok(())
}
