//! Status command - show rule and reference data summary

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;

use surgibill_core::services::LoggingService;

use super::get_context;
use crate::output;

pub fn run(json: bool, logger: &Option<Arc<LoggingService>>) -> Result<()> {
    let ctx = get_context(logger)?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Rule Set Status".bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Rules".to_string(), status.total_rules.to_string()]);
    table.add_row(vec!["Active rules".to_string(), status.active_rules.to_string()]);
    for count in &status.rules {
        table.add_row(vec![
            format!("  {}", count.kind),
            format!("{} ({} active)", count.total, count.active),
        ]);
    }
    table.add_row(vec!["References".to_string(), status.total_references.to_string()]);
    for count in &status.references {
        table.add_row(vec![format!("  {}", count.kind), count.count.to_string()]);
    }
    println!("{}", table);
    println!();

    if let Some(bu) = &ctx.config.business_unit {
        println!("Business unit: {}", bu);
    }
    println!(
        "{}",
        format!(
            "Database: {} ({})",
            status.database_path,
            output::format_size(status.database_size)
        )
        .dimmed()
    );

    Ok(())
}
