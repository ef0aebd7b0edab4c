//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use serde::Serialize;

use surgibill_core::{OperationResult, Rule};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print a successful write in the JSON envelope used by write commands
pub fn print_ok_json<T: Serialize>(data: T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&OperationResult::ok(data))?);
    Ok(())
}

/// Print one rule as a vertical key/value table
pub fn print_rule(rule: &Rule) {
    let mut table = create_table();
    table.add_row(vec!["ID".to_string(), rule.id.to_string()]);
    table.add_row(vec!["Kind".to_string(), rule.kind().to_string()]);
    table.add_row(vec!["Business unit".to_string(), rule.business_unit.clone()]);
    table.add_row(vec!["Hospital".to_string(), rule.hospital.to_string()]);
    if let Some(doctor) = rule.doctor() {
        table.add_row(vec!["Doctor".to_string(), doctor.to_string()]);
    }
    table.add_row(vec!["Pattern".to_string(), rule.dimensions.describe()]);
    table.add_row(vec!["Value".to_string(), rule.value.describe()]);
    table.add_row(vec!["Priority".to_string(), rule.priority().to_string()]);
    table.add_row(vec![
        "Valid".to_string(),
        format!("{} to {} (exclusive)", rule.validity.from(), rule.validity.to()),
    ]);
    table.add_row(vec![
        "Active".to_string(),
        if rule.is_active { "yes" } else { "no" }.to_string(),
    ]);
    table.add_row(vec![
        "Updated".to_string(),
        format!(
            "{} by {}",
            rule.updated_at.format("%Y-%m-%d %H:%M:%S"),
            rule.updated_by.as_deref().unwrap_or("-")
        ),
    ]);
    println!("{}", table);
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
