//! CLI theme and styling.

use colored::Colorize;

/// CLI theme configuration.
pub(crate) struct Theme;

impl Theme {
    /// Format a header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format an info message.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    /// Format a dimmed message.
    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    /// Format a separator line.
    pub(crate) fn separator() -> String {
        "━".repeat(50).dimmed().to_string()
    }

    /// Colour a permission level by how much it grants.
    pub(crate) fn permission(level: shellgate_policy::PermissionLevel) -> String {
        use shellgate_policy::PermissionLevel;
        let text = level.to_string();
        match level {
            PermissionLevel::ReadOnly => text.green().to_string(),
            PermissionLevel::ReadWrite => text.yellow().to_string(),
            PermissionLevel::FullAccess => text.red().to_string(),
        }
    }
}
