//! Statistics reporting.

use console::style;

use crate::download::{GlobalState, ItemReport};

/// Print one line per failed item.
pub fn print_failures(reports: &[ItemReport]) {
    for report in reports {
        if let Err(e) = &report.result {
            println!(
                "  {} #{} {}: {}",
                style("FAILED").red().bold(),
                report.position,
                report.title,
                e
            );
        }
    }
}

/// Print statistics across all items of the run.
pub fn print_global_stats(state: &GlobalState) {
    println!();
    println!("{}", style("═".repeat(50)).dim());
    println!("{}", style("Statistics:").bold());
    println!("  Downloaded: {}", state.downloaded);
    println!("  Skipped:    {} (already present)", state.skipped);
    if state.delegated > 0 {
        println!("  Delegated:  {}", state.delegated);
    }
    if state.failed > 0 {
        println!("  Failed:     {}", style(state.failed).red());
    }
    if state.cancelled > 0 {
        println!("  Cancelled:  {}", style(state.cancelled).yellow());
    }
    println!("  Bytes:      {}", indicatif::HumanBytes(state.bytes));
    println!("{}", style("═".repeat(50)).dim());
}

/// Print a summary line for quick viewing.
pub fn print_summary(state: &GlobalState) {
    println!(
        "Done: {} downloaded, {} skipped, {} failed",
        style(state.downloaded).green(),
        style(state.skipped).yellow(),
        style(state.failed).red()
    );
}
