//! Terminal output formatting utilities.

use colored::Colorize;
use gitward_core::SyncReport;

/// Print a success message.
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message (stderr).
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a warning message (stderr).
pub fn warn(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Print an info message.
pub fn info(msg: &str) {
    println!("{} {}", "→".blue(), msg);
}

/// Print a detail line without prefix.
pub fn detail(msg: &str) {
    println!("{msg}");
}

/// One line summarizing a pass over one entity class.
///
/// `None` means the repository's connector does not support the class.
#[must_use]
pub fn sync_line(class: &str, report: Option<&SyncReport>) -> String {
    let Some(report) = report else {
        return format!("  {class:<14}{}", "not supported".dimmed());
    };

    let mut parts = vec![
        format!("{} created", report.created),
        format!("{} pushed", report.pushed),
        format!("{} updated", report.updated),
        format!("{} unchanged", report.unchanged),
    ];
    if !report.failed.is_empty() {
        parts.push(
            format!("{} failed ({})", report.failed.len(), report.failed.join(", "))
                .red()
                .to_string(),
        );
    }

    format!("  {class:<14}{}", parts.join(", "))
}
