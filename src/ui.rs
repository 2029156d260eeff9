use awskit::ExecutionResult;
use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Execution Results
// ============================================================================

/// Print a call's output, keeping stdout clean for piping.
///
/// Diagnostics go to stderr: the truncation notice, then for failures the
/// category, the original error text and a remediation hint.
pub fn result(result: &ExecutionResult, quiet: bool) {
    print!("{}", result.stdout);

    if result.output_truncated {
        warn("Output exceeded the capture limit and was truncated");
    }

    match result.diagnostic() {
        Some(diagnostic) => {
            let (summary, hint) = match diagnostic.split_once("\nhint: ") {
                Some((summary, hint)) => (summary, Some(hint)),
                None => (diagnostic.as_str(), None),
            };
            error(summary);
            if let Some(hint) = hint {
                eprintln!("  {} {}", "hint:".cyan(), hint);
            }
        }
        None if !quiet && result.retries > 0 => {
            log::info!(
                "Succeeded after {} retries in {:.1}s",
                result.retries,
                result.elapsed.as_secs_f64()
            );
        }
        None => {}
    }
}

// ============================================================================
// Size Formatting
// ============================================================================

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

// ============================================================================
// Tests
// ============================================================================
